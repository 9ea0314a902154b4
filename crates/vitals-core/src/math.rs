//! Statistical helpers over readings.
//!
//! Every tracked parameter is standardized against its own resting
//! distribution, so heart rate (tens of bpm) and body temperature (tenths of
//! a degree) contribute on the same scale.

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::reading::Reading;
use crate::vital_signs::parameter_spec;

/// Z-score of `value` against the resting distribution of `name`.
/// Returns 0.0 for parameters outside the table: they are their own center.
pub fn resting_z_score(name: &str, value: f64) -> f64 {
    match parameter_spec(name) {
        Some(spec) if spec.std_rest > f64::EPSILON => (value - spec.mean_rest) / spec.std_rest,
        _ => 0.0,
    }
}

/// Standardized Euclidean distance of a reading from the resting-mean
/// center point. An empty reading has distance 0.
pub fn radial_distance(reading: &Reading) -> f64 {
    if reading.is_empty() {
        return 0.0;
    }
    let scaled: Vec<f64> = reading
        .values()
        .iter()
        .map(|(name, &value)| resting_z_score(name, value))
        .collect();
    DVector::from_vec(scaled).norm()
}

/// Check each parameter against its normal resting range.
/// Unknown parameters are reported as out of range.
pub fn validate_ranges(reading: &Reading) -> BTreeMap<String, bool> {
    reading
        .values()
        .iter()
        .map(|(name, &value)| {
            let ok = parameter_spec(name)
                .map(|spec| spec.in_resting_range(value))
                .unwrap_or(false);
            (name.clone(), ok)
        })
        .collect()
}
