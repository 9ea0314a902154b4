//! Noise around base vital-sign values.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use vitals_core::{Reading, VitalSign};

pub const DEFAULT_DATASET_SIZE: usize = 500;
pub const DEFAULT_DATASET_SEED: u64 = 42;

/// Clamp a dispersion factor into [0, 1]. NaN counts as no dispersion.
pub fn clamp_dispersion(dispersion: f64) -> f64 {
    if dispersion.is_nan() {
        0.0
    } else {
        dispersion.clamp(0.0, 1.0)
    }
}

/// Draw one reading around `base_values` with fresh randomness.
///
/// Each known parameter is sampled from `N(base, std_rest * dispersion)`.
/// Alias keys come back under their canonical name; when a map holds both an
/// alias and its canonical key, the canonical entry wins. Unknown parameters
/// are copied through unchanged.
pub fn generate(base_values: &BTreeMap<String, f64>, dispersion: f64) -> Reading {
    generate_with(&mut rand::thread_rng(), base_values, dispersion)
}

pub fn generate_with<R: Rng + ?Sized>(
    rng: &mut R,
    base_values: &BTreeMap<String, f64>,
    dispersion: f64,
) -> Reading {
    let dispersion = clamp_dispersion(dispersion);
    let values = base_values
        .iter()
        .filter_map(|(name, &base)| match VitalSign::from_name(name) {
            Some(sign) if sign.name() != name.as_str() && base_values.contains_key(sign.name()) => {
                None
            }
            Some(sign) => Some((sign.name().to_string(), perturb(rng, sign, base, dispersion))),
            None => Some((name.clone(), base)),
        })
        .collect();
    Reading::new(values)
}

fn perturb<R: Rng + ?Sized>(rng: &mut R, sign: VitalSign, base: f64, dispersion: f64) -> f64 {
    let std_dev = sign.spec().std_rest * dispersion;
    if std_dev <= 0.0 {
        return base;
    }
    match Normal::new(base, std_dev) {
        Ok(normal) => rng.sample(normal),
        Err(_) => base,
    }
}

/// `size` resting readings drawn from `N(mean_rest, std_rest)` per
/// parameter with a seeded RNG, for background sampling and model training.
pub fn generate_resting_dataset(size: usize, seed: u64) -> Vec<Reading> {
    let mut rng = StdRng::seed_from_u64(seed);
    let distributions: Vec<(VitalSign, Option<Normal>)> = VitalSign::ALL
        .iter()
        .map(|&sign| {
            let spec = sign.spec();
            (sign, Normal::new(spec.mean_rest, spec.std_rest).ok())
        })
        .collect();

    (0..size)
        .map(|_| {
            distributions
                .iter()
                .map(|(sign, normal)| {
                    let value = match normal {
                        Some(normal) => rng.sample(normal),
                        None => sign.spec().mean_rest,
                    };
                    (sign.name(), value)
                })
                .collect()
        })
        .collect()
}
