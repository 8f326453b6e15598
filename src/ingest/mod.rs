//! Frame ingestion sources.
//!
//! This module provides different sources for undecoded frames:
//! - a decoder subprocess (`ffmpeg`) pulling an RTSP stream
//! - a local Unix socket carrying length-prefixed JPEG frames (see `frame_grabber`)
//! - a synthetic source for `stub://` URLs (testing)
//!
//! Sources only produce `EncodedFrame`s. The reconnecting worker in `worker` runs a
//! source on its own thread and hands frames to the processing loop; it never touches
//! detection logic.

pub mod codec;
mod ffmpeg;
pub mod mjpeg;
mod normalize;
pub mod probe;
#[cfg(unix)]
mod socket;
mod synthetic;
mod worker;

use anyhow::Result;
use std::sync::Arc;

use crate::frame::EncodedFrame;

pub use ffmpeg::{FfmpegConfig, FfmpegSource};
pub use normalize::{normalize, DecodeError};
#[cfg(unix)]
pub use socket::SocketSource;
pub use synthetic::SyntheticSource;
pub use worker::{spawn_ingest, IngestHandle, SourceState};

/// Aborts a blocking `next_frame` from another thread.
pub type Interrupter = Arc<dyn Fn() + Send + Sync>;

/// Strategy interface over the ways frames reach the pipeline.
pub trait FrameSource: Send {
    /// Human-readable, credential-free description for logs.
    fn describe(&self) -> String;

    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame. An error means the source is lost and must be
    /// reconnected.
    fn next_frame(&mut self) -> Result<EncodedFrame>;

    fn disconnect(&mut self);

    /// Hook that unblocks a pending `next_frame`, if the source supports one.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<EncodedFrame> {
        (**self).next_frame()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn interrupter(&self) -> Option<Interrupter> {
        (**self).interrupter()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Counters for a frame source, cumulative across reconnects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub connects: u64,
}
