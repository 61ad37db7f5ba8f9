//! YOLOv8 output decoding.
//!
//! The detection head emits a `[1, 4 + classes, candidates]` tensor: rows 0..4
//! are center-x, center-y, width and height in model-input pixels, the
//! remaining rows are per-class scores. Decoding picks the best class per
//! candidate, rescales boxes to the source frame and runs per-class NMS.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Parameters for turning raw head output into frame-space detections.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub num_classes: usize,
    /// Candidates scoring at or below this floor are discarded before NMS.
    pub min_score: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    class_index: usize,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a row-major `[channels, candidates]` output buffer.
pub fn decode_predictions(
    output: &[f32],
    channels: usize,
    candidates: usize,
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    if channels != 4 + params.num_classes {
        return Err(anyhow!(
            "model emits {} classes, label table has {}",
            channels.saturating_sub(4),
            params.num_classes
        ));
    }
    let expected = channels
        .checked_mul(candidates)
        .ok_or_else(|| anyhow!("model output dimensions overflow"))?;
    if output.len() != expected {
        return Err(anyhow!(
            "expected {} output values, received {}",
            expected,
            output.len()
        ));
    }

    let at = |row: usize, i: usize| output[row * candidates + i];
    let scale_x = params.frame_width as f32 / params.input_size as f32;
    let scale_y = params.frame_height as f32 / params.input_size as f32;

    let mut kept = Vec::new();
    for i in 0..candidates {
        let mut best_score = 0.0f32;
        let mut best_class = 0usize;
        for class_index in 0..params.num_classes {
            let score = at(4 + class_index, i);
            if score > best_score {
                best_score = score;
                best_class = class_index;
            }
        }
        if best_score <= params.min_score {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        kept.push(Candidate {
            x1: (cx - w / 2.0) * scale_x,
            y1: (cy - h / 2.0) * scale_y,
            x2: (cx + w / 2.0) * scale_x,
            y2: (cy + h / 2.0) * scale_y,
            score: best_score,
            class_index: best_class,
        });
    }

    Ok(nms(kept, params.iou_threshold)
        .into_iter()
        .map(|c| {
            let bbox = BoundingBox::new(c.x1 as i32, c.y1 as i32, c.x2 as i32, c.y2 as i32)
                .clamped(params.frame_width, params.frame_height);
            Detection::new(bbox, c.class_index, f64::from(c.score.min(1.0)))
        })
        .collect())
}

/// Per-class non-maximum suppression, highest score first.
fn nms(candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    let mut by_class: HashMap<usize, Vec<Candidate>> = HashMap::new();
    for candidate in candidates {
        by_class
            .entry(candidate.class_index)
            .or_default()
            .push(candidate);
    }

    let mut keep = Vec::new();
    for (_, mut group) in by_class {
        group.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..group.len() {
                if !suppressed[j] && group[i].iou(&group[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
        keep.extend(
            group
                .into_iter()
                .zip(suppressed)
                .filter(|(_, s)| !s)
                .map(|(c, _)| c),
        );
    }
    keep.sort_by(|a, b| b.score.total_cmp(&a.score));
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(num_classes: usize) -> DecodeParams {
        DecodeParams {
            num_classes,
            min_score: 0.25,
            iou_threshold: 0.7,
            input_size: 100,
            frame_width: 200,
            frame_height: 100,
        }
    }

    /// Build a `[4 + classes, n]` buffer from per-candidate columns.
    fn tensor(columns: &[[f32; 6]]) -> Vec<f32> {
        let n = columns.len();
        let mut out = vec![0.0; 6 * n];
        for (i, col) in columns.iter().enumerate() {
            for (row, value) in col.iter().enumerate() {
                out[row * n + i] = *value;
            }
        }
        out
    }

    #[test]
    fn decodes_best_class_and_rescales() -> Result<()> {
        let out = tensor(&[[50.0, 50.0, 20.0, 10.0, 0.1, 0.8]]);
        let dets = decode_predictions(&out, 6, 1, &params(2))?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_index, 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(80, 45, 120, 55));
        assert!((dets[0].confidence - 0.8).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn drops_candidates_below_score_floor() -> Result<()> {
        let out = tensor(&[[50.0, 50.0, 20.0, 10.0, 0.2, 0.25]]);
        assert!(decode_predictions(&out, 6, 1, &params(2))?.is_empty());
        Ok(())
    }

    #[test]
    fn suppresses_overlapping_boxes_of_same_class() -> Result<()> {
        let out = tensor(&[
            [50.0, 50.0, 20.0, 20.0, 0.9, 0.0],
            [51.0, 50.0, 20.0, 20.0, 0.6, 0.0],
            [51.0, 50.0, 20.0, 20.0, 0.0, 0.5],
        ]);
        let dets = decode_predictions(&out, 6, 3, &params(2))?;
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_index, 0);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(dets[1].class_index, 1);
        Ok(())
    }

    #[test]
    fn rejects_class_count_mismatch() {
        let out = tensor(&[[50.0, 50.0, 20.0, 10.0, 0.1, 0.8]]);
        assert!(decode_predictions(&out, 6, 1, &params(17)).is_err());
        assert!(decode_predictions(&out[..5], 6, 1, &params(2)).is_err());
    }
}
