use std::cmp::Ordering;

use crate::face::Detection;

fn area(d: &Detection) -> f32 {
    d.width.max(0.0) * d.height.max(0.0)
}

/// Intersection over union of two relative boxes.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.xmin.max(b.xmin);
    let y1 = a.ymin.max(b.ymin);
    let x2 = (a.xmin + a.width).min(b.xmin + b.width);
    let y2 = (a.ymin + a.height).min(b.ymin + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if intersection <= 0.0 {
        return 0.0;
    }
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Weighted non-maximum suppression.
///
/// Candidates are visited from the highest score down. Every remaining box
/// overlapping the current best by more than `threshold` is folded into it:
/// the merged box is the score-weighted mean of the group and keeps the best
/// score. Output is ordered by descending score.
pub fn weighted_nms(mut candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept = Vec::new();
    while !candidates.is_empty() {
        let best = candidates[0];
        let (group, rest): (Vec<Detection>, Vec<Detection>) = candidates
            .into_iter()
            .partition(|c| iou(&best, c) > threshold);
        candidates = rest;

        // best always overlaps itself unless its box is degenerate
        if group.is_empty() {
            kept.push(best);
            candidates.remove(0);
            continue;
        }

        let total: f32 = group.iter().map(|d| d.score).sum();
        if total <= 0.0 {
            kept.push(best);
            continue;
        }
        let mut merged = Detection::new(0.0, 0.0, 0.0, 0.0).with_score(best.score);
        for d in &group {
            let w = d.score / total;
            merged.xmin += d.xmin * w;
            merged.ymin += d.ymin * w;
            merged.width += d.width * w;
            merged.height += d.height * w;
        }
        kept.push(merged);
    }
    kept
}
