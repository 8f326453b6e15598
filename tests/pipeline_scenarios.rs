use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use aicam::actions::{Alerter, SnapshotWriter};
use aicam::detect::StubBackend;
use aicam::{
    ActionDispatcher, BoundingBox, CooldownGate, CooldownScope, Detection, DetectionPolicy,
    EncodedFrame, FrameOutcome, Monitor, Notification, Notifier, ObjectClass, PixelFormat,
    SafeZone, ZoneMode, ZonePoint,
};

const COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Clone, Default)]
struct Recorder {
    notifications: Arc<Mutex<Vec<Notification>>>,
    alerts: Arc<Mutex<Vec<(String, String)>>>,
}

impl Recorder {
    fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

impl Alerter for Recorder {
    fn send(&self, recipient: &str, message: &str) -> Result<()> {
        self.alerts
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

fn raw_frame() -> EncodedFrame {
    EncodedFrame::Raw {
        data: vec![90; 8 * 8 * 3],
        width: 8,
        height: 8,
        format: PixelFormat::Rgb24,
    }
}

fn centered(class: ObjectClass, confidence: f32, cx: f32, cy: f32) -> Detection {
    let (w, h) = (0.1, 0.1);
    let x = (cx - w / 2.0).max(0.0);
    let y = (cy - h / 2.0).max(0.0);
    let w = if cx - w / 2.0 < 0.0 { 2.0 * cx } else { w };
    let h = if cy - h / 2.0 < 0.0 { 2.0 * cy } else { h };
    Detection::new(class, confidence, BoundingBox::new(x, y, w, h))
}

fn inset_zone() -> SafeZone {
    SafeZone::new(
        "yard",
        vec![
            ZonePoint { x: 0.1, y: 0.1 },
            ZonePoint { x: 0.9, y: 0.1 },
            ZonePoint { x: 0.9, y: 0.9 },
            ZonePoint { x: 0.1, y: 0.9 },
        ],
    )
    .unwrap()
}

fn monitor(
    detector: StubBackend,
    policy: DetectionPolicy,
    scope: CooldownScope,
    recorder: &Recorder,
) -> Monitor {
    let dispatcher = ActionDispatcher::new(Box::new(recorder.clone()))
        .with_alerter(Box::new(recorder.clone()), vec!["+15550001".to_string()]);
    Monitor::new(
        Box::new(detector),
        policy,
        CooldownGate::new(COOLDOWN, scope),
        dispatcher,
    )
}

#[test]
fn below_threshold_detection_is_filtered_out() {
    let recorder = Recorder::default();
    let detector = StubBackend::new().push_frame(vec![centered(ObjectClass::Person, 0.65, 0.5, 0.5)]);
    let policy = DetectionPolicy::new(0.7, [ObjectClass::Person]).unwrap();
    let mut m = monitor(detector, policy, CooldownScope::PerClass, &recorder);

    let outcome = m.process(raw_frame(), Instant::now());
    assert_eq!(
        outcome,
        FrameOutcome::Processed {
            dispatched: 0,
            suppressed: 0
        }
    );
    assert!(recorder.notifications().is_empty());
}

#[test]
fn open_allow_list_passes_and_cooldown_suppresses_repeat() {
    let recorder = Recorder::default();
    let car = centered(ObjectClass::Car, 0.9, 0.5, 0.5);
    let detector = StubBackend::new().repeating(vec![car]);
    let policy = DetectionPolicy::new(0.5, []).unwrap();
    let mut m = monitor(detector, policy, CooldownScope::PerClass, &recorder);
    let t0 = Instant::now();

    assert_eq!(
        m.process(raw_frame(), t0),
        FrameOutcome::Processed {
            dispatched: 1,
            suppressed: 0
        }
    );
    assert_eq!(
        m.process(raw_frame(), t0 + Duration::from_secs(10)),
        FrameOutcome::Processed {
            dispatched: 0,
            suppressed: 1
        }
    );
    assert_eq!(recorder.notifications().len(), 1);
    assert_eq!(
        recorder.notifications()[0].body,
        "Car detected, 90% confidence"
    );

    assert_eq!(
        m.process(raw_frame(), t0 + COOLDOWN),
        FrameOutcome::Processed {
            dispatched: 1,
            suppressed: 0
        }
    );
    assert_eq!(recorder.notifications().len(), 2);
}

#[test]
fn zone_violation_takes_the_alert_path_and_skips_movement() {
    let recorder = Recorder::default();
    let detector = StubBackend::new()
        .push_frame(vec![centered(ObjectClass::Person, 0.9, 0.5, 0.5)])
        .push_frame(vec![
            centered(ObjectClass::Dog, 0.8, 0.5, 0.5),
            centered(ObjectClass::Person, 0.9, 0.0, 0.0),
        ]);
    let policy = DetectionPolicy::new(0.5, []).unwrap();
    let mut m = monitor(detector, policy, CooldownScope::PerClass, &recorder).with_zone(inset_zone());
    let t0 = Instant::now();

    // Inside the zone: ordinary movement.
    m.process(raw_frame(), t0);
    let notes = recorder.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Motion detected");
    assert!(recorder.alerts().is_empty());

    // Corner detection: violation only, the in-zone dog is not reported.
    let outcome = m.process(raw_frame(), t0 + Duration::from_secs(1));
    assert_eq!(
        outcome,
        FrameOutcome::Processed {
            dispatched: 1,
            suppressed: 0
        }
    );
    let notes = recorder.notifications();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[1].title, "Zone violation: yard");
    let alerts = recorder.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].0, "+15550001");
    assert!(alerts[0].1.contains("Person"));
}

#[test]
fn priority_mode_reports_violation_then_movement() {
    let recorder = Recorder::default();
    let detector = StubBackend::new().push_frame(vec![
        centered(ObjectClass::Dog, 0.8, 0.5, 0.5),
        centered(ObjectClass::Person, 0.9, 0.0, 0.0),
    ]);
    let policy = DetectionPolicy::new(0.5, [])
        .unwrap()
        .with_zone_mode(ZoneMode::Priority);
    let mut m = monitor(detector, policy, CooldownScope::PerClass, &recorder).with_zone(inset_zone());

    let outcome = m.process(raw_frame(), Instant::now());
    assert_eq!(
        outcome,
        FrameOutcome::Processed {
            dispatched: 2,
            suppressed: 0
        }
    );
    let titles: Vec<String> = recorder
        .notifications()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Zone violation: yard", "Motion detected"]);
}

#[test]
fn repeated_detections_in_window_produce_one_action_per_key() {
    let recorder = Recorder::default();
    let detector = StubBackend::new().repeating(vec![
        centered(ObjectClass::Person, 0.9, 0.5, 0.5),
        centered(ObjectClass::Car, 0.8, 0.3, 0.3),
    ]);
    let policy = DetectionPolicy::new(0.5, []).unwrap();
    let mut m = monitor(detector, policy, CooldownScope::PerClass, &recorder);
    let t0 = Instant::now();

    for second in 0..30 {
        m.process(raw_frame(), t0 + Duration::from_secs(second));
    }

    // Both keys cleared together on the first frame; nothing afterwards.
    let notes = recorder.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].body, "Person detected, 90% confidence (+1 more)");
    assert_eq!(m.stats().alerts, 1);
    assert_eq!(m.stats().suppressed, 29 * 2);
}

#[test]
fn violation_cooldown_is_separate_from_movement() {
    let recorder = Recorder::default();
    let detector = StubBackend::new().repeating(vec![centered(ObjectClass::Person, 0.9, 0.0, 0.0)]);
    let policy = DetectionPolicy::new(0.5, []).unwrap();
    let mut m = monitor(detector, policy, CooldownScope::Global, &recorder).with_zone(inset_zone());
    let t0 = Instant::now();

    m.process(raw_frame(), t0);
    m.process(raw_frame(), t0 + Duration::from_secs(5));
    assert_eq!(recorder.alerts().len(), 1);
    m.process(raw_frame(), t0 + COOLDOWN);
    assert_eq!(recorder.alerts().len(), 2);
}

#[test]
fn jpeg_frames_are_snapshotted_with_the_primary_class() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();

    let pixels = vec![200u8; 16 * 12 * 3];
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode(&pixels, 16, 12, ExtendedColorType::Rgb8)
        .unwrap();

    let detector = StubBackend::new().push_frame(vec![centered(ObjectClass::Bicycle, 0.75, 0.5, 0.5)]);
    let dispatcher = ActionDispatcher::new(Box::new(recorder.clone()))
        .with_snapshots(SnapshotWriter::new(dir.path()));
    let mut m = Monitor::new(
        Box::new(detector),
        DetectionPolicy::new(0.5, []).unwrap(),
        CooldownGate::new(COOLDOWN, CooldownScope::PerClass),
        dispatcher,
    );

    m.process(EncodedFrame::Jpeg(jpeg), Instant::now());

    let notes = recorder.notifications();
    assert_eq!(notes.len(), 1);
    let attachment = notes[0].attachment.clone().expect("snapshot attached");
    assert!(attachment.starts_with(dir.path()));
    assert!(attachment
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_bicycle.jpg"));
    let saved = image::open(&attachment).unwrap();
    assert_eq!((saved.width(), saved.height()), (16, 12));
}
