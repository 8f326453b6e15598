//! Decoder-subprocess frame source.
//!
//! `ffmpeg` pulls the stream, drops audio, resamples to the requested frame rate and
//! scales to a fixed geometry, then writes raw frames of a known size to stdout.

use anyhow::{anyhow, Context, Result};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use super::{FrameSource, Interrupter, SourceStats};
use crate::frame::{EncodedFrame, PixelFormat};

#[derive(Clone, Debug)]
pub struct FfmpegConfig {
    /// Stream URL, credentials included. Never logged.
    pub url: String,
    /// Credential-free form of `url`.
    pub display_url: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
}

impl FfmpegConfig {
    /// Arguments passed to `ffmpeg`.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if self.url.starts_with("rtsp://") || self.url.starts_with("rtsps://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        args.extend([
            "-i".to_string(),
            self.url.clone(),
            "-an".to_string(),
            "-vf".to_string(),
            format!(
                "fps={},scale={}:{}",
                self.frame_rate, self.width, self.height
            ),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.ffmpeg_name().to_string(),
            "-".to_string(),
        ]);
        args
    }
}

pub struct FfmpegSource {
    config: FfmpegConfig,
    frame_len: usize,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
    stats: SourceStats,
}

impl FfmpegSource {
    pub fn new(config: FfmpegConfig) -> Result<Self> {
        let frame_len = config
            .pixel_format
            .frame_len(config.width, config.height)
            .filter(|len| *len > 0)
            .ok_or_else(|| {
                anyhow!(
                    "invalid decoder geometry {}x{} ({})",
                    config.width,
                    config.height,
                    config.pixel_format
                )
            })?;
        if config.pixel_format == PixelFormat::Nv12
            && (config.width % 2 != 0 || config.height % 2 != 0)
        {
            return Err(anyhow!(
                "nv12 output needs even dimensions, got {}x{}",
                config.width,
                config.height
            ));
        }
        Ok(Self {
            config,
            frame_len,
            child: Arc::new(Mutex::new(None)),
            stdout: None,
            stats: SourceStats::default(),
        })
    }

    fn exit_status(&self) -> Option<String> {
        let mut guard = self.child.lock().ok()?;
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            _ => None,
        }
    }
}

impl FrameSource for FfmpegSource {
    fn describe(&self) -> String {
        format!(
            "ffmpeg {} ({}x{} {} @ {} fps)",
            self.config.display_url,
            self.config.width,
            self.config.height,
            self.config.pixel_format,
            self.config.frame_rate
        )
    }

    fn connect(&mut self) -> Result<()> {
        self.disconnect();
        let mut child = Command::new("ffmpeg")
            .args(self.config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to start ffmpeg")?;
        self.stdout = Some(
            child
                .stdout
                .take()
                .ok_or_else(|| anyhow!("ffmpeg stdout was not captured"))?,
        );
        *self
            .child
            .lock()
            .map_err(|_| anyhow!("ffmpeg child lock poisoned"))? = Some(child);
        self.stats.connects += 1;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<EncodedFrame> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg is not running"))?;
        let mut data = vec![0u8; self.frame_len];
        if let Err(e) = stdout.read_exact(&mut data) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                let status = self
                    .exit_status()
                    .unwrap_or_else(|| "unknown status".to_string());
                return Err(anyhow!("ffmpeg output ended ({})", status));
            }
            return Err(e).context("failed to read frame from ffmpeg");
        }
        self.stats.frames_captured += 1;
        Ok(EncodedFrame::Raw {
            data,
            width: self.config.width,
            height: self.config.height,
            format: self.config.pixel_format,
        })
    }

    fn disconnect(&mut self) {
        self.stdout = None;
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let child = Arc::clone(&self.child);
        Some(Arc::new(move || {
            if let Ok(mut guard) = child.lock() {
                if let Some(child) = guard.as_mut() {
                    let _ = child.kill();
                }
            }
        }))
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.disconnect();
    }
}
