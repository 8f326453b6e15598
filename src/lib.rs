//! aicam - RTSP camera monitor
//!
//! Watches a camera stream, runs object detection on each frame and raises
//! notifications, snapshots and alerts for configured object classes.
//!
//! # Pipeline
//!
//! Frame Source -> Normalizer -> Detector -> Filter/Policy -> Cooldown Gate -> Action Dispatcher
//!
//! The frame source runs on a worker thread (`ingest::spawn_ingest`) and reconnects
//! forever on failure. Everything after it runs serially in `monitor::Monitor`, which
//! owns the only cross-frame state, the cooldown map.
//!
//! # Module Structure
//!
//! - `config`: `MonitorConfig` from `config.env` plus environment overrides
//! - `credentials`: camera password lookup (macOS Keychain)
//! - `frame`: `EncodedFrame` (undecoded) and `Frame` (normalized RGB8)
//! - `ingest`: frame sources, socket codec, geometry probe, normalizer, worker
//! - `detect`: `Detector` trait, detection types, stub and tract backends
//! - `filter`, `zone`, `cooldown`: per-frame policy and action gating
//! - `actions`: snapshots, notifications, alert scripts
//! - `monitor`: the processing loop

pub mod actions;
pub mod config;
pub mod cooldown;
pub mod credentials;
pub mod detect;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod monitor;
pub mod shutdown;
pub mod zone;

pub use actions::{ActionDispatcher, Alert, DispatchReport, Notification, Notifier};
pub use config::MonitorConfig;
pub use cooldown::{CooldownGate, CooldownKey, CooldownScope};
pub use detect::{BoundingBox, BoxOrigin, Detection, Detector, ObjectClass};
pub use filter::{DetectionPolicy, FrameVerdict, ZoneMode};
pub use frame::{EncodedFrame, Frame, PixelFormat};
pub use ingest::{spawn_ingest, FrameSource, IngestHandle, SourceState};
pub use monitor::{FrameOutcome, Monitor, MonitorStats};
pub use shutdown::ShutdownSignal;
pub use zone::{SafeZone, ZonePoint};
