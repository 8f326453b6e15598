//! YOLOv8 output decoding, shared by model backends.
//!
//! A YOLOv8 detection head emits `[1, 4 + C, N]` (channels first) or `[1, N, 4 + C]`:
//! per anchor a center-format box in input pixels followed by C class scores.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection, ObjectClass};

const BOX_CHANNELS: usize = 4;
const MAX_DETECTIONS: usize = 100;

/// Decoding parameters.
#[derive(Clone, Copy, Debug)]
pub struct YoloDecode {
    /// Square model input edge in pixels (boxes are divided by it).
    pub input_size: u32,
    /// Candidates scoring below this never enter NMS. This is pruning, not policy:
    /// the configured detection threshold is applied later by the filter.
    pub candidate_floor: f32,
    /// Overlap above which the weaker of two boxes is suppressed.
    pub iou_threshold: f32,
}

impl Default for YoloDecode {
    fn default() -> Self {
        Self {
            input_size: 640,
            candidate_floor: 0.05,
            iou_threshold: 0.45,
        }
    }
}

/// Decode a raw output tensor given its shape.
pub fn decode_output(output: &[f32], shape: &[usize], params: &YoloDecode) -> Result<Vec<Detection>> {
    let (channels, anchors, channels_first) = match shape {
        [1, a, b] if *a > BOX_CHANNELS && (a <= b || *b <= BOX_CHANNELS) => (*a, *b, true),
        [1, a, b] if *b > BOX_CHANNELS => (*b, *a, false),
        _ => return Err(anyhow!("unexpected YOLO output shape {:?}", shape)),
    };
    if output.len() != channels * anchors {
        return Err(anyhow!(
            "YOLO output has {} values, shape {:?} needs {}",
            output.len(),
            shape,
            channels * anchors
        ));
    }

    let at = |channel: usize, anchor: usize| -> f32 {
        if channels_first {
            output[channel * anchors + anchor]
        } else {
            output[anchor * channels + channel]
        }
    };

    let size = params.input_size.max(1) as f32;
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best = (0usize, f32::NEG_INFINITY);
        for class in 0..channels - BOX_CHANNELS {
            let score = at(BOX_CHANNELS + class, anchor);
            if score > best.1 {
                best = (class, score);
            }
        }
        if !best.1.is_finite() || best.1 < params.candidate_floor {
            continue;
        }

        let cx = at(0, anchor) / size;
        let cy = at(1, anchor) / size;
        let w = at(2, anchor) / size;
        let h = at(3, anchor) / size;
        let x = (cx - w / 2.0).clamp(0.0, 1.0);
        let y = (cy - h / 2.0).clamp(0.0, 1.0);
        let bbox = BoundingBox::new(x, y, w.min(1.0 - x), h.min(1.0 - y));
        candidates.push(Detection::new(
            ObjectClass::from_index(best.0),
            best.1.clamp(0.0, 1.0),
            bbox,
        ));
    }

    Ok(non_max_suppression(candidates, params.iou_threshold))
}

/// Class-agnostic greedy NMS, strongest first.
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= MAX_DETECTIONS {
            break;
        }
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a channels-first `[1, 4 + classes, anchors]` tensor.
    fn tensor(anchors: &[([f32; 4], usize, f32)], classes: usize) -> (Vec<f32>, Vec<usize>) {
        let n = anchors.len();
        let channels = BOX_CHANNELS + classes;
        let mut data = vec![0.0f32; channels * n];
        for (i, (bbox, class, score)) in anchors.iter().enumerate() {
            for (c, v) in bbox.iter().enumerate() {
                data[c * n + i] = *v;
            }
            data[(BOX_CHANNELS + class) * n + i] = *score;
        }
        (data, vec![1, channels, n])
    }

    #[test]
    fn decodes_boxes_into_normalized_top_left_rects() {
        let (data, shape) = tensor(&[([320.0, 320.0, 64.0, 128.0], 0, 0.9)], 80);
        let detections = decode_output(&data, &shape, &YoloDecode::default()).unwrap();

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.class, ObjectClass::Person);
        assert!((d.bbox.x - 0.45).abs() < 1e-5);
        assert!((d.bbox.y - 0.4).abs() < 1e-5);
        assert!((d.bbox.w - 0.1).abs() < 1e-5);
        assert!((d.bbox.h - 0.2).abs() < 1e-5);
    }

    #[test]
    fn overlapping_boxes_are_suppressed() {
        let (data, shape) = tensor(
            &[
                ([320.0, 320.0, 100.0, 100.0], 2, 0.8),
                ([322.0, 321.0, 100.0, 100.0], 2, 0.6),
                ([100.0, 100.0, 50.0, 50.0], 16, 0.7),
            ],
            80,
        );
        let detections = decode_output(&data, &shape, &YoloDecode::default()).unwrap();

        let classes: Vec<_> = detections.iter().map(|d| d.class).collect();
        assert_eq!(classes, vec![ObjectClass::Car, ObjectClass::Dog]);
    }

    #[test]
    fn scores_below_candidate_floor_are_pruned_but_low_scores_survive() {
        let (data, shape) = tensor(
            &[
                ([100.0, 100.0, 20.0, 20.0], 0, 0.01),
                ([500.0, 500.0, 20.0, 20.0], 0, 0.2),
            ],
            80,
        );
        let detections = decode_output(&data, &shape, &YoloDecode::default()).unwrap();
        assert_eq!(detections.len(), 1);
        assert!((detections[0].confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        assert!(decode_output(&[0.0; 10], &[1, 84, 2], &YoloDecode::default()).is_err());
        assert!(decode_output(&[0.0; 4], &[4], &YoloDecode::default()).is_err());
    }
}
