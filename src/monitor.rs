//! The serial per-frame pipeline: normalize, detect, evaluate policy, gate, dispatch.
//!
//! `Monitor` is the only owner of the cooldown gate and runs on a single thread, so
//! no two frames are ever gated concurrently.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use crate::actions::{ActionDispatcher, Alert};
use crate::cooldown::{CooldownGate, CooldownKey, CooldownScope};
use crate::detect::{Detection, Detector};
use crate::filter::{DetectionPolicy, FrameVerdict};
use crate::frame::{EncodedFrame, Frame};
use crate::ingest::{normalize, IngestHandle, SourceState};
use crate::shutdown::ShutdownSignal;
use crate::zone::SafeZone;

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    DecodeFailed,
    DetectFailed,
    Processed {
        /// Alerts handed to the dispatcher.
        dispatched: usize,
        /// Detections or violations held back by the cooldown gate.
        suppressed: usize,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames: u64,
    pub decode_failures: u64,
    pub detect_failures: u64,
    pub detections: u64,
    pub alerts: u64,
    pub suppressed: u64,
}

pub struct Monitor {
    detector: Box<dyn Detector>,
    policy: DetectionPolicy,
    zone: Option<SafeZone>,
    gate: CooldownGate,
    dispatcher: ActionDispatcher,
    heartbeat: Duration,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(
        detector: Box<dyn Detector>,
        policy: DetectionPolicy,
        gate: CooldownGate,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            detector,
            policy,
            zone: None,
            gate,
            dispatcher,
            heartbeat: DEFAULT_HEARTBEAT,
            stats: MonitorStats::default(),
        }
    }

    pub fn with_zone(mut self, zone: SafeZone) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Run one frame through the pipeline. Failures are logged and reflected in the
    /// outcome; nothing here is fatal.
    pub fn process(&mut self, encoded: EncodedFrame, now: Instant) -> FrameOutcome {
        self.stats.frames += 1;

        let frame = match normalize(&encoded) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.decode_failures += 1;
                log::warn!(
                    "dropping {} frame ({} bytes): {}",
                    encoded.kind(),
                    encoded.byte_len(),
                    e
                );
                return FrameOutcome::DecodeFailed;
            }
        };
        drop(encoded);

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                self.stats.detect_failures += 1;
                log::warn!("detector {} failed: {:#}", self.detector.name(), e);
                return FrameOutcome::DetectFailed;
            }
        };
        self.stats.detections += detections.len() as u64;
        log::debug!(
            "{} raw detections in {}ms",
            detections.len(),
            frame.captured_at().elapsed().as_millis()
        );

        let mut dispatched = 0;
        let mut suppressed = 0;
        match self.policy.evaluate(detections, self.zone.as_ref()) {
            FrameVerdict::Quiet => {}
            FrameVerdict::Movement(movement) => {
                self.handle_movement(movement, &frame, now, &mut dispatched, &mut suppressed);
            }
            FrameVerdict::Violation { offender, movement } => {
                if self.gate.try_acquire(CooldownKey::ZoneViolation, now) {
                    let zone_name = self
                        .zone
                        .as_ref()
                        .map(|zone| zone.name().to_string())
                        .unwrap_or_default();
                    log::warn!("zone violation in '{}': {}", zone_name, offender.summary());
                    let alert = Alert::ZoneViolation {
                        zone_name,
                        detection: offender,
                    };
                    self.dispatcher.dispatch(&alert, &frame);
                    dispatched += 1;
                } else {
                    log::debug!("zone violation suppressed by cooldown");
                    suppressed += 1;
                }
                self.handle_movement(movement, &frame, now, &mut dispatched, &mut suppressed);
            }
        }

        self.stats.alerts += dispatched as u64;
        self.stats.suppressed += suppressed as u64;
        FrameOutcome::Processed {
            dispatched,
            suppressed,
        }
    }

    fn handle_movement(
        &mut self,
        mut movement: Vec<Detection>,
        frame: &Frame,
        now: Instant,
        dispatched: &mut usize,
        suppressed: &mut usize,
    ) {
        if movement.is_empty() {
            return;
        }
        movement.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        // Further detections of a class that cleared earlier in this frame ride along.
        // Under a global scope the first class takes the only key for the frame.
        let mut cleared_classes = HashSet::new();
        let mut cleared = Vec::new();
        for detection in movement {
            let key = self.gate.key_for(detection.class);
            if cleared_classes.contains(&detection.class) || self.gate.try_acquire(key, now) {
                cleared_classes.insert(detection.class);
                cleared.push(detection);
            } else {
                log::debug!(
                    "{} suppressed, {}s of cooldown left",
                    detection.summary(),
                    self.gate.remaining(key, now).as_secs()
                );
                *suppressed += 1;
            }
        }
        if cleared.is_empty() {
            return;
        }

        for detection in &cleared {
            log::info!("{}", detection.summary());
        }
        let alert = Alert::Movement {
            detections: cleared,
        };
        self.dispatcher.dispatch(&alert, frame);
        *dispatched += 1;
    }

    /// Pull frames from the ingest worker until shutdown, logging a heartbeat that shows
    /// whether the source is connected.
    pub fn run(&mut self, ingest: &IngestHandle, shutdown: &ShutdownSignal) -> MonitorStats {
        let scope = match self.gate.scope() {
            CooldownScope::PerClass => "per class",
            CooldownScope::Global => "global",
        };
        log::info!(
            "monitoring with {} (threshold {:.2}, cooldown {}s {})",
            self.detector.name(),
            self.policy.threshold(),
            self.gate.window().as_secs(),
            scope
        );
        let mut last_heartbeat = Instant::now();
        let mut frames_at_heartbeat = 0;

        while !shutdown.is_triggered() {
            match ingest.recv_timeout(POLL_INTERVAL) {
                Ok(encoded) => {
                    self.process(encoded, Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if !shutdown.is_triggered() {
                        log::error!("ingest worker exited unexpectedly");
                    }
                    break;
                }
            }

            if last_heartbeat.elapsed() >= self.heartbeat {
                let state = match ingest.state() {
                    SourceState::Connected => "connected",
                    SourceState::Waiting => "waiting for stream",
                };
                log::info!(
                    "heartbeat: {}, {} frames since last heartbeat, {} alerts, {} suppressed, {} dropped",
                    state,
                    self.stats.frames - frames_at_heartbeat,
                    self.stats.alerts,
                    self.stats.suppressed,
                    ingest.dropped_frames()
                );
                frames_at_heartbeat = self.stats.frames;
                last_heartbeat = Instant::now();
            }
        }

        log::info!(
            "monitor stopped: {} frames, {} alerts, {} decode failures",
            self.stats.frames,
            self.stats.alerts,
            self.stats.decode_failures
        );
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::LogNotifier;
    use crate::detect::{BoundingBox, ObjectClass, StubBackend};
    use crate::frame::PixelFormat;

    fn raw_frame() -> EncodedFrame {
        EncodedFrame::Raw {
            data: vec![0; 4 * 4 * 3],
            width: 4,
            height: 4,
            format: PixelFormat::Rgb24,
        }
    }

    fn monitor(detector: StubBackend, scope: CooldownScope) -> Monitor {
        Monitor::new(
            Box::new(detector),
            DetectionPolicy::new(0.5, []).unwrap(),
            CooldownGate::new(Duration::from_secs(300), scope),
            ActionDispatcher::new(Box::new(LogNotifier)),
        )
    }

    fn det(class: ObjectClass, confidence: f32) -> Detection {
        Detection::new(class, confidence, BoundingBox::new(0.4, 0.4, 0.2, 0.2))
    }

    #[test]
    fn undecodable_frames_are_dropped() {
        let mut m = monitor(StubBackend::new(), CooldownScope::PerClass);
        let outcome = m.process(EncodedFrame::Jpeg(vec![1, 2, 3]), Instant::now());
        assert_eq!(outcome, FrameOutcome::DecodeFailed);
        assert_eq!(m.stats().decode_failures, 1);
    }

    #[test]
    fn same_class_twice_in_one_frame_is_one_action() {
        let detector = StubBackend::new()
            .push_frame(vec![det(ObjectClass::Person, 0.9), det(ObjectClass::Person, 0.8)]);
        let mut m = monitor(detector, CooldownScope::PerClass);
        assert_eq!(
            m.process(raw_frame(), Instant::now()),
            FrameOutcome::Processed {
                dispatched: 1,
                suppressed: 0
            }
        );
    }

    #[test]
    fn per_class_scope_reports_every_cleared_class_together() {
        let detector = StubBackend::new()
            .push_frame(vec![det(ObjectClass::Car, 0.6), det(ObjectClass::Person, 0.9)]);
        let mut m = monitor(detector, CooldownScope::PerClass);
        assert_eq!(
            m.process(raw_frame(), Instant::now()),
            FrameOutcome::Processed {
                dispatched: 1,
                suppressed: 0
            }
        );
    }

    #[test]
    fn global_scope_lets_only_the_strongest_class_through() {
        let detector = StubBackend::new()
            .push_frame(vec![det(ObjectClass::Car, 0.6), det(ObjectClass::Person, 0.9)]);
        let mut m = monitor(detector, CooldownScope::Global);
        assert_eq!(
            m.process(raw_frame(), Instant::now()),
            FrameOutcome::Processed {
                dispatched: 1,
                suppressed: 1
            }
        );
    }
}
