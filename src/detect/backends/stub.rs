use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted backend for tests and plumbing checks.
///
/// Each call to `detect` pops the next scripted result; once the script runs out the
/// fallback result is returned for every further frame (empty unless set).
#[derive(Default)]
pub struct StubBackend {
    script: VecDeque<Vec<Detection>>,
    fallback: Vec<Detection>,
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the detections returned for the next frame.
    pub fn push_frame(mut self, detections: Vec<Detection>) -> Self {
        self.script.push_back(detections);
        self
    }

    /// Detections returned once the script is exhausted.
    pub fn repeating(mut self, detections: Vec<Detection>) -> Self {
        self.fallback = detections;
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        Ok(self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ObjectClass};

    #[test]
    fn stub_backend_replays_script_then_fallback() {
        let person = Detection::new(ObjectClass::Person, 0.9, BoundingBox::new(0.1, 0.1, 0.2, 0.2));
        let mut backend = StubBackend::new()
            .push_frame(vec![person.clone()])
            .push_frame(vec![]);
        let frame = Frame::blank(4, 4);

        assert_eq!(backend.detect(&frame).unwrap(), vec![person]);
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.frames_seen(), 3);
    }
}
