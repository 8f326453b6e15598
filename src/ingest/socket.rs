//! Unix-socket frame source: reads `[u32 LE length][JPEG]` messages written by
//! `frame_grabber`.

use anyhow::{anyhow, Context, Result};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::codec::read_frame;
use super::{FrameSource, Interrupter, SourceStats};
use crate::frame::EncodedFrame;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SocketSource {
    path: PathBuf,
    read_timeout: Duration,
    stream: Option<UnixStream>,
    /// Clone of `stream` that the interrupter shuts down.
    control: Arc<Mutex<Option<UnixStream>>>,
    stats: SourceStats,
}

impl SocketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            stream: None,
            control: Arc::new(Mutex::new(None)),
            stats: SourceStats::default(),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl FrameSource for SocketSource {
    fn describe(&self) -> String {
        format!("socket {}", self.path.display())
    }

    fn connect(&mut self) -> Result<()> {
        self.disconnect();
        let stream = UnixStream::connect(&self.path)
            .with_context(|| format!("failed to connect to {}", self.path.display()))?;
        stream
            .set_read_timeout(Some(self.read_timeout))
            .context("failed to set socket read timeout")?;
        let control = stream.try_clone().context("failed to clone socket")?;
        *self
            .control
            .lock()
            .map_err(|_| anyhow!("socket control lock poisoned"))? = Some(control);
        self.stream = Some(stream);
        self.stats.connects += 1;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<EncodedFrame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("socket is not connected"))?;
        match read_frame(stream).context("failed to read frame from socket")? {
            Some(jpeg) => {
                self.stats.frames_captured += 1;
                Ok(EncodedFrame::Jpeg(jpeg))
            }
            None => Err(anyhow!("frame server closed the connection")),
        }
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Ok(mut guard) = self.control.lock() {
            guard.take();
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let control = Arc::clone(&self.control);
        Some(Arc::new(move || {
            if let Ok(guard) = control.lock() {
                if let Some(stream) = guard.as_ref() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
            }
        }))
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
