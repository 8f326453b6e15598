//! Action dispatch for cooldown-cleared detections.
//!
//! Every side effect here is best effort: failures are logged and counted in the
//! `DispatchReport`, never propagated into the processing loop.

mod alert;
mod notify;
mod snapshot;

use std::path::PathBuf;

use crate::detect::Detection;
use crate::frame::Frame;

pub use alert::{Alerter, ScriptAlerter};
pub use notify::{notifier_for, CommandNotifier, LogNotifier, Notification, Notifier};
pub use snapshot::{snapshot_stem, SnapshotWriter, SNAPSHOT_QUALITY};

#[derive(Clone, Debug, PartialEq)]
pub enum Alert {
    /// Ordinary detections, highest confidence first.
    Movement { detections: Vec<Detection> },
    ZoneViolation {
        zone_name: String,
        detection: Detection,
    },
}

impl Alert {
    /// Detection that names the snapshot and leads the notification.
    pub fn primary(&self) -> Option<&Detection> {
        match self {
            Alert::Movement { detections } => detections.first(),
            Alert::ZoneViolation { detection, .. } => Some(detection),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Alert::Movement { .. } => "Motion detected".to_string(),
            Alert::ZoneViolation { zone_name, .. } => format!("Zone violation: {}", zone_name),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Alert::Movement { detections } => match detections.split_first() {
                None => String::new(),
                Some((first, [])) => first.summary(),
                Some((first, rest)) => format!("{} (+{} more)", first.summary(), rest.len()),
            },
            Alert::ZoneViolation { detection, .. } => {
                format!("{}, outside the safe zone", detection.summary())
            }
        }
    }

    /// Text handed to the alert script.
    pub fn message(&self) -> String {
        match self {
            Alert::Movement { .. } => self.body(),
            Alert::ZoneViolation {
                zone_name,
                detection,
            } => format!(
                "ALERT: {} left {} ({}% confidence)",
                detection.class.display_name(),
                zone_name,
                (detection.confidence * 100.0).round() as i32
            ),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub snapshot: Option<PathBuf>,
    pub notified: bool,
    pub alerts_sent: usize,
    pub failures: usize,
}

pub struct ActionDispatcher {
    snapshots: Option<SnapshotWriter>,
    notifier: Box<dyn Notifier>,
    alerter: Option<Box<dyn Alerter>>,
    recipients: Vec<String>,
}

impl ActionDispatcher {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self {
            snapshots: None,
            notifier,
            alerter: None,
            recipients: Vec::new(),
        }
    }

    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    /// External alerts for zone violations, one invocation per recipient.
    pub fn with_alerter(mut self, alerter: Box<dyn Alerter>, recipients: Vec<String>) -> Self {
        self.alerter = Some(alerter);
        self.recipients = recipients;
        self
    }

    pub fn dispatch(&self, alert: &Alert, frame: &Frame) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(primary) = alert.primary() else {
            return report;
        };

        if let Some(writer) = &self.snapshots {
            match writer.write(frame, primary.class) {
                Ok(path) => {
                    log::info!("snapshot saved: {}", path.display());
                    report.snapshot = Some(path);
                }
                Err(e) => {
                    log::error!("snapshot failed: {:#}", e);
                    report.failures += 1;
                }
            }
        }

        let notification = Notification {
            title: alert.title(),
            body: alert.body(),
            attachment: report.snapshot.clone(),
        };
        match self.notifier.notify(&notification) {
            Ok(()) => report.notified = true,
            Err(e) => {
                log::error!("notification via {} failed: {:#}", self.notifier.name(), e);
                report.failures += 1;
            }
        }

        if let (Alert::ZoneViolation { .. }, Some(alerter)) = (alert, &self.alerter) {
            let message = alert.message();
            for recipient in &self.recipients {
                match alerter.send(recipient, &message) {
                    Ok(()) => {
                        log::info!("alert sent to {}", recipient);
                        report.alerts_sent += 1;
                    }
                    Err(e) => {
                        log::error!("alert to {} failed: {:#}", recipient, e);
                        report.failures += 1;
                    }
                }
            }
        }

        report
    }
}
