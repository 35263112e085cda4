//! Synthetic local dataset fixture.
//!
//! Every participant trains on data nobody else ever sees; for the demo
//! binaries that data is drawn here. Only the shape matters: standard-normal
//! features, a rare positive label driven by a hidden linear signal, and a
//! few injected outliers that force the positive class.
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;

use crate::core::learner::sigmoid;

/// Base rate of the positive label.
pub const DEFAULT_PREVALENCE: f64 = 0.12;

/// Fraction of samples turned into forced-positive outliers.
const OUTLIER_FRACTION: f64 = 0.02;

/// Generates `samples` rows of `features` columns with binary targets.
///
/// Deterministic in `seed`.
pub fn generate_local(
    samples: usize,
    features: usize,
    seed: u64,
    prevalence: f64,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let mut x: Vec<Vec<f64>> = (0..samples)
        .map(|_| (0..features).map(|_| rng.sample(StandardNormal)).collect())
        .collect();
    let coefficients: Vec<f64> = (0..features)
        .map(|_| 0.7 * rng.sample::<f64, _>(StandardNormal))
        .collect();

    let mut y: Vec<f64> = x
        .iter()
        .map(|row| {
            let signal: f64 = row.iter().zip(&coefficients).map(|(a, b)| a * b).sum();
            let probability = prevalence * sigmoid(signal);
            f64::from(rng.gen::<f64>() < probability)
        })
        .collect();

    if features > 0 {
        let outliers = (samples as f64 * OUTLIER_FRACTION) as usize;
        for _ in 0..outliers {
            let row = rng.gen_range(0..samples);
            let column = rng.gen_range(0..features);
            x[row][column] += rng.gen_range(3.0..6.0);
            y[row] = 1.0;
        }
    }

    (x, y)
}
