//! JPEG snapshots of alerting frames.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::detect::ObjectClass;
use crate::frame::Frame;

pub const SNAPSHOT_QUALITY: u8 = 85;

#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    directory: PathBuf,
    quality: u8,
}

impl SnapshotWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            quality: SNAPSHOT_QUALITY,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `frame` as `<timestamp>_<class>.jpg`, never overwriting an earlier snapshot.
    pub fn write(&self, frame: &Frame, class: ObjectClass) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory).with_context(|| {
            format!(
                "failed to create snapshot directory {}",
                self.directory.display()
            )
        })?;
        let path = self.unused_path(&snapshot_stem(Local::now(), class));
        let file = File::create(&path)
            .with_context(|| format!("failed to create snapshot {}", path.display()))?;
        encode_jpeg(frame, self.quality, file)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        Ok(path)
    }

    fn unused_path(&self, stem: &str) -> PathBuf {
        let first = self.directory.join(format!("{stem}.jpg"));
        if !first.exists() {
            return first;
        }
        (2u32..)
            .map(|n| self.directory.join(format!("{stem}-{n}.jpg")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }
}

/// Encode through a buffer and flush it, so late write errors are not lost on drop.
fn encode_jpeg<W: Write>(frame: &Frame, quality: u8, out: W) -> Result<()> {
    let mut writer = BufWriter::new(out);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode(
            frame.pixels(),
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .context("jpeg encode failed")?;
    writer.flush().context("flush failed")?;
    Ok(())
}

/// `2026-03-14T09-26-53_person`: colons are not portable in file names.
pub fn snapshot_stem(timestamp: DateTime<Local>, class: ObjectClass) -> String {
    format!("{}_{}", timestamp.format("%Y-%m-%dT%H-%M-%S"), class.slug())
}
