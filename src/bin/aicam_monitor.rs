//! aicam_monitor - watch a camera stream and act on detected objects.
//!
//! Startup failures (missing config, credential, model or ffmpeg) exit non-zero before
//! the loop starts. Once running, stream loss and per-frame failures are only logged;
//! the process runs until Ctrl-C / SIGTERM.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use aicam::actions::{notifier_for, ActionDispatcher, ScriptAlerter, SnapshotWriter};
use aicam::config::{MonitorConfig, SourceKind, DEFAULT_CONFIG_PATH};
use aicam::credentials::{resolve_credentials, Credentials, KeychainStore};
use aicam::detect::build_detector;
use aicam::ingest::probe::{
    authenticated_url, executable_available, masked_url, probe_geometry, FALLBACK_GEOMETRY,
};
use aicam::ingest::{FfmpegConfig, FfmpegSource, FrameSource, SyntheticSource};
use aicam::logging::init_logging;
use aicam::{spawn_ingest, CooldownGate, Monitor, SafeZone, ShutdownSignal};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "aicam_monitor",
    version,
    about = "Watch an RTSP camera and notify on detected objects"
)]
struct Args {
    /// Path to the key=value configuration file.
    #[arg(long, env = "AICAM_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run the startup checks and exit without monitoring.
    #[arg(long)]
    check: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    /// Debug logging (RUST_LOG still wins).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let ui = ui::Ui::from_flag(&args.ui, std::io::stderr().is_terminal());

    let config = {
        let stage = ui.stage("Load configuration");
        let config = MonitorConfig::load(&args.config)?;
        stage.detail(args.config.display().to_string());
        config
    };

    let credentials = {
        let _stage = ui.stage("Resolve camera credentials");
        resolve_credentials(
            config.stream.username.as_deref(),
            config.stream.password.as_deref(),
            &config.stream.keychain_service,
            &KeychainStore,
        )?
    };

    let source = {
        let stage = ui.stage("Prepare frame source");
        let source = build_source(&config, credentials.as_ref(), &stage)?;
        stage.detail(source.describe());
        source
    };

    let detector = {
        let stage = ui.stage("Load detector");
        let mut detector = build_detector(&config.detection)?;
        detector.warm_up()?;
        stage.detail(detector.name());
        detector
    };

    let zone = match &config.zone.zone_config {
        Some(path) => {
            let stage = ui.stage("Load safe zone");
            let zone = SafeZone::load(path)?;
            stage.detail(format!("'{}', {} points", zone.name(), zone.points().len()));
            Some(zone)
        }
        None => None,
    };

    let dispatcher = {
        let stage = ui.stage("Prepare actions");
        build_dispatcher(&config, zone.is_some(), &stage)
    };
    let policy = config.policy()?;

    if args.check {
        log::info!("startup checks passed");
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_signal.trigger();
    })
    .expect("error setting Ctrl-C handler");

    let gate = CooldownGate::new(config.actions.cooldown, config.actions.cooldown_scope);
    let mut monitor = Monitor::new(detector, policy, gate, dispatcher);
    if let Some(zone) = zone {
        monitor = monitor.with_zone(zone);
    }

    let ingest = spawn_ingest(source, config.stream.reconnect_delay, shutdown.clone());
    monitor.run(&ingest, &shutdown);
    log::info!("shutdown signal received, stopping frame source...");
    ingest.stop();
    Ok(())
}

fn build_source(
    config: &MonitorConfig,
    credentials: Option<&Credentials>,
    stage: &ui::StageGuard,
) -> Result<Box<dyn FrameSource>> {
    let stream = &config.stream;
    match stream.source {
        SourceKind::Socket => socket_source(config),
        SourceKind::Ffmpeg => {
            let url = stream
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("RTSP_FEED_URL is required"))?;
            if url.starts_with("stub://") {
                let (width, height) = stream.geometry.unwrap_or(FALLBACK_GEOMETRY);
                return Ok(Box::new(
                    SyntheticSource::new(url, width, height).with_frame_rate(stream.frame_rate),
                ));
            }
            if !executable_available("ffmpeg") {
                bail!("ffmpeg not found on PATH (install it with `brew install ffmpeg`)");
            }

            let url = authenticated_url(url, credentials)?;
            let display_url = masked_url(&url);
            let (width, height) = match stream.geometry {
                Some(geometry) => geometry,
                None => match probe_geometry(&url, stream.probe_timeout) {
                    Ok(geometry) => geometry,
                    Err(e) => {
                        log::warn!(
                            "could not probe {}: {:#}; scaling to {}x{}",
                            display_url,
                            e,
                            FALLBACK_GEOMETRY.0,
                            FALLBACK_GEOMETRY.1
                        );
                        stage.warn("stream probe failed, using fallback geometry");
                        FALLBACK_GEOMETRY
                    }
                },
            };

            Ok(Box::new(FfmpegSource::new(FfmpegConfig {
                url,
                display_url,
                width,
                height,
                frame_rate: stream.frame_rate,
                pixel_format: stream.pixel_format,
            })?))
        }
    }
}

#[cfg(unix)]
fn socket_source(config: &MonitorConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(aicam::ingest::SocketSource::new(
        &config.stream.socket_path,
    )))
}

#[cfg(not(unix))]
fn socket_source(_config: &MonitorConfig) -> Result<Box<dyn FrameSource>> {
    bail!("FRAME_SOURCE=socket needs Unix domain sockets")
}

fn build_dispatcher(
    config: &MonitorConfig,
    zone_enabled: bool,
    stage: &ui::StageGuard,
) -> ActionDispatcher {
    let actions = &config.actions;
    let notifier = notifier_for(actions.notifier);
    let mut details = vec![format!("notifier {}", notifier.name())];
    let mut dispatcher = ActionDispatcher::new(notifier);

    if actions.snapshot_on_detection {
        let writer = SnapshotWriter::new(&actions.snapshot_directory);
        details.push(format!("snapshots in {}", writer.directory().display()));
        dispatcher = dispatcher.with_snapshots(writer);
    }

    if !actions.alert_recipients.is_empty() {
        if !zone_enabled {
            log::warn!("ALERT_RECIPIENT_n set without ZONE_CONFIG; alerts are only sent for zone violations");
        }
        let alerter = ScriptAlerter::new(&actions.alert_script);
        if !alerter.script().is_file() {
            log::warn!(
                "alert script {} not found; zone alerts will fail",
                alerter.script().display()
            );
            stage.warn("alert script missing");
        }
        details.push(format!("{} alert recipients", actions.alert_recipients.len()));
        dispatcher = dispatcher.with_alerter(Box::new(alerter), actions.alert_recipients.clone());
    }

    stage.detail(details.join(", "));
    dispatcher
}
