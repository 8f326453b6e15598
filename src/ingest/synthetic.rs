//! Synthetic source for `stub://` URLs and tests.

use anyhow::{bail, Result};
use std::time::Duration;

use super::{FrameSource, SourceStats};
use crate::frame::{EncodedFrame, PixelFormat};

pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    interval: Duration,
    /// Frames served per connection before the source "dies".
    fail_after: Option<u64>,
    connected: bool,
    frames_this_connection: u64,
    stats: SourceStats,
}

impl SyntheticSource {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            interval: Duration::ZERO,
            fail_after: None,
            connected: false,
            frames_this_connection: 0,
            stats: SourceStats::default(),
        }
    }

    /// Pace frames like a live stream at `frame_rate` fps.
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.interval = if frame_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(1000 / u64::from(frame_rate))
        };
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Drop the connection after `frames` frames on every connection.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let len = PixelFormat::Rgb24
            .frame_len(self.width, self.height)
            .unwrap_or_default();
        let shift = self.stats.frames_captured;
        (0..len)
            .map(|i| ((i as u64 + shift) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("synthetic {} ({}x{})", self.url, self.width, self.height)
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.frames_this_connection = 0;
        self.stats.connects += 1;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<EncodedFrame> {
        if !self.connected {
            bail!("synthetic source is not connected");
        }
        if let Some(limit) = self.fail_after {
            if self.frames_this_connection >= limit {
                self.connected = false;
                bail!("synthetic source dropped after {} frames", limit);
            }
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        let data = self.generate_pixels();
        self.frames_this_connection += 1;
        self.stats.frames_captured += 1;
        Ok(EncodedFrame::Raw {
            data,
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
        })
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
