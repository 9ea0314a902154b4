use tracing::warn;
use vitals_core::config::DEFAULT_DISTANCE_THRESHOLD;
use vitals_core::math::radial_distance;
use vitals_core::Reading;

use crate::scorer::{AnomalyVerdict, DetectionMethod};

/// Upper edge of the mild band; distances past it are severe.
pub const SEVERE_DISTANCE: f64 = 4.0;
/// Distance at which the severe band saturates at 1.0.
pub const MAX_DISTANCE: f64 = 6.0;

fn effective_threshold(threshold: f64) -> f64 {
    if threshold.is_finite() && threshold > 0.0 {
        threshold
    } else {
        warn!(
            "Invalid distance threshold {}, using {}",
            threshold, DEFAULT_DISTANCE_THRESHOLD
        );
        DEFAULT_DISTANCE_THRESHOLD
    }
}

/// Map a radial distance onto [0, 1]:
/// normal `[0, 0.5]`, mild `(0.5, 0.75]`, severe `(0.75, 1.0]`.
pub fn distance_score(distance: f64, threshold: f64) -> f64 {
    if distance.is_nan() {
        return 1.0;
    }
    if distance <= threshold {
        (distance / threshold).min(1.0) * 0.5
    } else if distance <= SEVERE_DISTANCE {
        0.5 + (distance - threshold) / (SEVERE_DISTANCE - threshold) * 0.25
    } else {
        (0.75 + (distance - SEVERE_DISTANCE) / (MAX_DISTANCE - SEVERE_DISTANCE) * 0.25).min(1.0)
    }
}

pub fn evaluate(reading: &Reading, threshold: f64) -> AnomalyVerdict {
    let threshold = effective_threshold(threshold);
    let distance = radial_distance(reading);
    if !distance.is_finite() {
        return AnomalyVerdict {
            is_anomaly: true,
            score: 1.0,
            method: DetectionMethod::Distance,
        };
    }

    let score = distance_score(distance, threshold).clamp(0.0, 1.0);
    tracing::debug!("Radial distance {:.3} (threshold {}) -> score {:.3}", distance, threshold, score);
    AnomalyVerdict {
        is_anomaly: distance > threshold,
        score,
        method: DetectionMethod::Distance,
    }
}
