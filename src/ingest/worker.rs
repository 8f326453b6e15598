//! Reconnecting ingest worker.
//!
//! Runs a `FrameSource` on its own thread and only enqueues frames. Source failures are
//! never fatal: the worker disconnects, waits the backoff and reconnects until shutdown.
//! The source counts as connected once the first frame of a session arrives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{FrameSource, Interrupter, SourceStats};
use crate::frame::EncodedFrame;
use crate::shutdown::ShutdownSignal;

/// Frames buffered for the processing loop; newer frames are dropped while it is full.
const QUEUE_DEPTH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Waiting,
    Connected,
}

struct Shared {
    connected: AtomicBool,
    dropped: AtomicU64,
    interrupter: Mutex<Option<Interrupter>>,
}

pub struct IngestHandle {
    receiver: Receiver<EncodedFrame>,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    thread: Option<JoinHandle<SourceStats>>,
}

/// Start the worker thread for `source`.
pub fn spawn_ingest<S>(source: S, backoff: Duration, shutdown: ShutdownSignal) -> IngestHandle
where
    S: FrameSource + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(QUEUE_DEPTH);
    let shared = Arc::new(Shared {
        connected: AtomicBool::new(false),
        dropped: AtomicU64::new(0),
        interrupter: Mutex::new(None),
    });
    let worker_shared = Arc::clone(&shared);
    let worker_shutdown = shutdown.clone();
    let thread = std::thread::Builder::new()
        .name("aicam-ingest".to_string())
        .spawn(move || run_worker(source, sender, backoff, worker_shared, worker_shutdown));

    let thread = match thread {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("failed to start ingest thread: {}", e);
            None
        }
    };

    IngestHandle {
        receiver,
        shared,
        shutdown,
        thread,
    }
}

impl IngestHandle {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<EncodedFrame, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn state(&self) -> SourceState {
        if self.shared.connected.load(Ordering::SeqCst) {
            SourceState::Connected
        } else {
            SourceState::Waiting
        }
    }

    /// Frames discarded because the processing loop was busy.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Trigger shutdown, abort any blocking read and join the worker.
    pub fn stop(mut self) -> Option<SourceStats> {
        self.shutdown_worker()
    }

    fn shutdown_worker(&mut self) -> Option<SourceStats> {
        self.shutdown.trigger();
        if let Ok(guard) = self.shared.interrupter.lock() {
            if let Some(interrupt) = guard.as_ref() {
                interrupt();
            }
        }
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                log::error!("ingest thread panicked");
                None
            }
        }
    }
}

impl Drop for IngestHandle {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

fn set_interrupter(shared: &Shared, interrupter: Option<Interrupter>) {
    if let Ok(mut guard) = shared.interrupter.lock() {
        *guard = interrupter;
    }
}

fn run_worker<S: FrameSource>(
    mut source: S,
    sender: SyncSender<EncodedFrame>,
    backoff: Duration,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
) -> SourceStats {
    let description = source.describe();
    log::info!("ingest: waiting for {}", description);

    'reconnect: while !shutdown.is_triggered() {
        match source.connect() {
            Ok(()) => {
                set_interrupter(&shared, source.interrupter());
                log::debug!("ingest: session opened for {}", description);

                loop {
                    if shutdown.is_triggered() {
                        break;
                    }
                    let frame = source.next_frame();
                    if frame.is_ok() && !shared.connected.swap(true, Ordering::SeqCst) {
                        log::info!("ingest: connected to {}", description);
                    }
                    match frame {
                        Ok(frame) => match sender.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                let dropped = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                                log::debug!("ingest: consumer busy, dropped frame ({} total)", dropped);
                            }
                            Err(TrySendError::Disconnected(_)) => {
                                log::debug!("ingest: consumer gone, stopping");
                                break 'reconnect;
                            }
                        },
                        Err(e) => {
                            if !shutdown.is_triggered() {
                                let what = if shared.connected.load(Ordering::SeqCst) {
                                    "lost"
                                } else {
                                    "no frames from"
                                };
                                log::warn!("ingest: {} {}: {:#}", what, description, e);
                            }
                            break;
                        }
                    }
                }

                set_interrupter(&shared, None);
                source.disconnect();
                shared.connected.store(false, Ordering::SeqCst);
                if shutdown.is_triggered() {
                    break;
                }
                log::info!(
                    "ingest: waiting for {} (retry in {}s)",
                    description,
                    backoff.as_secs_f32()
                );
            }
            Err(e) => {
                log::warn!(
                    "ingest: cannot connect to {}: {:#} (retry in {}s)",
                    description,
                    e,
                    backoff.as_secs_f32()
                );
            }
        }

        if !shutdown.sleep(backoff) {
            break;
        }
    }

    set_interrupter(&shared, None);
    source.disconnect();
    shared.connected.store(false, Ordering::SeqCst);
    let stats = source.stats();
    log::info!(
        "ingest: stopped after {} frames, {} connects",
        stats.frames_captured,
        stats.connects
    );
    stats
}
