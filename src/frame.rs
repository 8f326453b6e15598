//! Frame types flowing through the pipeline.
//!
//! - `EncodedFrame`: what a frame source hands over, still undecoded (JPEG or a raw
//!   fixed-geometry buffer straight from the decoder subprocess).
//! - `Frame`: a normalized, packed RGB8 image. It has a single producer (the
//!   normalizer) and a single synchronous consumer per cycle (the detector), and is
//!   dropped as soon as the cycle's actions have run.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Pixel layout of a raw decoder buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Nv12,
}

impl PixelFormat {
    /// Name understood by `ffmpeg -pix_fmt`.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Nv12 => "nv12",
        }
    }

    /// Size in bytes of one frame of this format, or `None` on overflow.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl FromStr for PixelFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgb24" | "rgb" => Ok(PixelFormat::Rgb24),
            "bgr24" | "bgr" => Ok(PixelFormat::Bgr24),
            "nv12" => Ok(PixelFormat::Nv12),
            other => Err(anyhow!(
                "unsupported pixel format '{}'; expected rgb24, bgr24 or nv12",
                other
            )),
        }
    }
}

/// An undecoded frame as produced by a `FrameSource`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodedFrame {
    /// A complete JPEG image; geometry comes from its header.
    Jpeg(Vec<u8>),
    /// A raw decoder buffer whose geometry was established up front.
    Raw {
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

impl EncodedFrame {
    pub fn byte_len(&self) -> usize {
        match self {
            EncodedFrame::Jpeg(bytes) => bytes.len(),
            EncodedFrame::Raw { data, .. } => data.len(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EncodedFrame::Jpeg(_) => "jpeg",
            EncodedFrame::Raw { format, .. } => format.ffmpeg_name(),
        }
    }
}

/// Normalized RGB8 frame.
///
/// Deliberately not `Clone`: a frame lives for exactly one pipeline cycle.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Wrap packed RGB8 pixels, validating the buffer length against the geometry.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = PixelFormat::Rgb24
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    /// A mid-gray frame, used to warm detector backends up.
    pub fn blank(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize) * 3;
        Self {
            data: vec![114u8; len],
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
