//! Detection filter and zone policy.
//!
//! Rules, in order:
//! 1. drop the `Unknown` sentinel class
//! 2. drop confidence below the threshold (equal passes)
//! 3. drop classes outside a non-empty allow-list (empty list accepts everything)
//! 4. with a safe zone, a surviving detection whose center lies outside the zone is a
//!    violation
//!
//! Evaluation is per frame; the only cross-frame memory is the cooldown gate.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::detect::{Detection, ObjectClass};
use crate::zone::SafeZone;

/// What a zone violation does to the rest of the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ZoneMode {
    /// The violation is the only thing reported for the frame.
    #[default]
    Exclusive,
    /// The violation is reported first; in-zone movement is still reported.
    Priority,
}

impl FromStr for ZoneMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Ok(ZoneMode::Exclusive),
            "priority" => Ok(ZoneMode::Priority),
            other => Err(anyhow!(
                "invalid zone violation mode '{}'; expected 'exclusive' or 'priority'",
                other
            )),
        }
    }
}

/// Per-frame result of the policy.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameVerdict {
    Quiet,
    Movement(Vec<Detection>),
    Violation {
        offender: Detection,
        /// Empty in `ZoneMode::Exclusive`.
        movement: Vec<Detection>,
    },
}

#[derive(Clone, Debug)]
pub struct DetectionPolicy {
    threshold: f32,
    allow_list: BTreeSet<ObjectClass>,
    zone_mode: ZoneMode,
}

impl DetectionPolicy {
    pub fn new(threshold: f32, allow_list: impl IntoIterator<Item = ObjectClass>) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "detection threshold {} must be within [0, 1]",
                threshold
            ));
        }
        Ok(Self {
            threshold,
            allow_list: allow_list.into_iter().collect(),
            zone_mode: ZoneMode::default(),
        })
    }

    pub fn with_zone_mode(mut self, zone_mode: ZoneMode) -> Self {
        self.zone_mode = zone_mode;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn allow_list(&self) -> &BTreeSet<ObjectClass> {
        &self.allow_list
    }

    pub fn zone_mode(&self) -> ZoneMode {
        self.zone_mode
    }

    /// Rules 1-3 for a single detection.
    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.class != ObjectClass::Unknown
            && detection.confidence >= self.threshold
            && (self.allow_list.is_empty() || self.allow_list.contains(&detection.class))
    }

    /// Rules 1-3.
    pub fn filter(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }

    /// Rules 1-4.
    pub fn evaluate(&self, detections: Vec<Detection>, zone: Option<&SafeZone>) -> FrameVerdict {
        let survivors = self.filter(detections);
        if survivors.is_empty() {
            return FrameVerdict::Quiet;
        }

        let Some(zone) = zone else {
            return FrameVerdict::Movement(survivors);
        };

        let Some(index) = survivors.iter().position(|d| zone.is_violated_by(&d.bbox)) else {
            return FrameVerdict::Movement(survivors);
        };

        let mut survivors = survivors;
        let offender = survivors.remove(index);
        let movement = match self.zone_mode {
            ZoneMode::Exclusive => Vec::new(),
            ZoneMode::Priority => survivors
                .into_iter()
                .filter(|d| !zone.is_violated_by(&d.bbox))
                .collect(),
        };
        FrameVerdict::Violation { offender, movement }
    }
}
