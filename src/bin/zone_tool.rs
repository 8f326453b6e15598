//! zone_tool - create and inspect safe zone files.
//!
//! Points are normalized image coordinates (0,0 top-left, 1,1 bottom-right).

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use aicam::logging::init_logging;
use aicam::zone::{SafeZone, ZonePoint, MIN_ZONE_POINTS};

#[derive(Parser, Debug)]
#[command(name = "zone_tool", version, about = "Create and inspect safe zone files")]
struct Args {
    /// Debug logging (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: ZoneCommand,
}

#[derive(Subcommand, Debug)]
enum ZoneCommand {
    /// Write a zone file from a list of points.
    Save {
        /// Output path.
        #[arg(long, env = "ZONE_CONFIG", default_value = "zone_config.json")]
        output: PathBuf,

        /// Zone name (defaults to "Safe Zone <timestamp>").
        #[arg(long)]
        name: Option<String>,

        /// Polygon vertex as X,Y; repeat for each point in order.
        #[arg(long = "point", value_name = "X,Y", value_parser = parse_point, required = true)]
        points: Vec<ZonePoint>,
    },
    /// Print a zone file's name and points.
    Show {
        #[arg(env = "ZONE_CONFIG", default_value = "zone_config.json")]
        path: PathBuf,
    },
    /// Report whether a point lies inside the zone.
    Test {
        #[arg(long, env = "ZONE_CONFIG", default_value = "zone_config.json")]
        zone: PathBuf,

        /// Point to test as X,Y.
        #[arg(value_parser = parse_point)]
        point: ZonePoint,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        ZoneCommand::Save {
            output,
            name,
            points,
        } => {
            if points.len() < MIN_ZONE_POINTS {
                return Err(anyhow!(
                    "a zone needs at least {} points, got {}",
                    MIN_ZONE_POINTS,
                    points.len()
                ));
            }
            let now = Local::now();
            let name = name.unwrap_or_else(|| {
                format!("Safe Zone {}", now.format("%Y-%m-%d %H:%M:%S"))
            });
            let zone = SafeZone::new(name, points)?;
            zone.save(
                &output,
                Some(now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
            )?;
            println!(
                "saved '{}' ({} points) to {}",
                zone.name(),
                zone.points().len(),
                output.display()
            );
        }
        ZoneCommand::Show { path } => {
            let zone = SafeZone::load(&path)?;
            println!("{}: '{}'", path.display(), zone.name());
            for (i, point) in zone.points().iter().enumerate() {
                println!("  {:>2}: ({:.3}, {:.3})", i + 1, point.x, point.y);
            }
        }
        ZoneCommand::Test { zone, point } => {
            let zone = SafeZone::load(&zone)?;
            let verdict = if zone.contains(point.x, point.y) {
                "inside"
            } else {
                "outside (violation)"
            };
            println!("({:.3}, {:.3}) is {} '{}'", point.x, point.y, verdict, zone.name());
        }
    }
    Ok(())
}

fn parse_point(value: &str) -> Result<ZonePoint, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{value}'"))?;
    let x: f32 = x
        .trim()
        .parse()
        .map_err(|_| format!("invalid x coordinate '{}'", x.trim()))?;
    let y: f32 = y
        .trim()
        .parse()
        .map_err(|_| format!("invalid y coordinate '{}'", y.trim()))?;
    Ok(ZonePoint { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_is_accepted_around_subcommands() {
        let before = Args::try_parse_from(["zone_tool", "-v", "show", "zone.json"]).unwrap();
        assert!(before.verbose);
        let after = Args::try_parse_from(["zone_tool", "show", "zone.json", "--verbose"]).unwrap();
        assert!(after.verbose);
        let quiet = Args::try_parse_from(["zone_tool", "show", "zone.json"]).unwrap();
        assert!(!quiet.verbose);
    }
}
