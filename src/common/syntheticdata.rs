use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

/// Seeded stream generators used by the integration tests and examples:
/// noisy multi-dimensional cosine waves and gaussian mixtures.
pub struct SyntheticStream {
    pub data: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
}

/// `num` points of `amplitude[j] * cos(2 pi (i + phase[j]) / period[j])`
/// plus uniform noise, one entry per base dimension.
pub fn multi_cosine(
    num: usize,
    period: &[usize],
    amplitude: &[f32],
    noise: f32,
    seed: u64,
    base_dimension: usize,
) -> SyntheticStream {
    assert!(period.len() == base_dimension, "need a period per dimension");
    assert!(
        amplitude.len() == base_dimension,
        "need an amplitude per dimension"
    );
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut noise_rng = ChaCha20Rng::seed_from_u64(seed + 1);
    let mut phase: Vec<usize> = Vec::new();
    for j in 0..base_dimension {
        phase.push(rng.next_u64() as usize % period[j]);
    }

    let mut data: Vec<Vec<f32>> = Vec::new();
    for i in 0..num {
        let mut element = vec![0.0; base_dimension];
        for j in 0..base_dimension {
            element[j] = amplitude[j]
                * (2.0 * PI * (i + phase[j]) as f32 / period[j] as f32).cos()
                + noise * noise_rng.gen::<f32>();
        }
        data.push(element);
    }
    SyntheticStream {
        data,
        labels: Vec::new(),
    }
}

/// A deterministic phase-zero cosine, convenient when a test wants to
/// compare an extrapolation against the exact continuation.
pub fn cosine(num: usize, period: usize, amplitude: f32, noise: f32, seed: u64) -> Vec<f32> {
    let mut noise_rng = ChaCha20Rng::seed_from_u64(seed);
    (0..num)
        .map(|i| {
            amplitude * (2.0 * PI * i as f32 / period as f32).cos()
                + noise * (noise_rng.gen::<f32>() - 0.5)
        })
        .collect()
}

/// Samples from a mixture of axis-aligned gaussians given by `mean`,
/// `scale` and mixture `weight`; labels record the chosen component.
pub fn mixture(
    num: usize,
    mean: &[Vec<f32>],
    scale: &[Vec<f32>],
    weight: &[f32],
    seed: u64,
) -> SyntheticStream {
    assert!(num > 0, "number of samples cannot be zero");
    assert!(!mean.is_empty(), "mixture cannot be empty");
    let base_dimension = mean[0].len();
    assert!(mean.len() == scale.len(), "scales and means must pair up");
    assert!(weight.len() == mean.len(), "weights and means must pair up");
    for i in 0..mean.len() {
        assert!(mean[i].len() == base_dimension, "mismatched mean dimension");
        assert!(
            scale[i].len() == base_dimension,
            "mismatched scale dimension"
        );
        assert!(weight[i] >= 0.0, "weights cannot be negative");
    }
    let sum: f32 = weight.iter().sum();

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for _ in 0..num {
        let mut i = 0;
        let mut w: f32 = sum * rng.gen::<f32>();
        while w > weight[i] {
            w -= weight[i];
            i += 1;
        }
        data.push(gaussian_vector(&mean[i], &scale[i], &mut rng));
        labels.push(i);
    }
    SyntheticStream { data, labels }
}

fn gaussian_element(mean: f32, scale: f32, rng: &mut ChaCha20Rng) -> f32 {
    let mut r: f32 = f64::sqrt(-2.0f64 * f64::ln(rng.gen::<f64>())) as f32;
    // ln can return inf for a draw of zero
    while r.is_infinite() {
        r = f64::sqrt(-2.0f64 * f64::ln(rng.gen::<f64>())) as f32;
    }
    let switch: f32 = rng.gen();
    if 0.5 < switch {
        mean + scale * r * f32::cos(2.0 * PI * rng.gen::<f32>())
    } else {
        mean + scale * r * f32::sin(2.0 * PI * rng.gen::<f32>())
    }
}

fn gaussian_vector(mean: &[f32], scale: &[f32], rng: &mut ChaCha20Rng) -> Vec<f32> {
    mean.iter()
        .zip(scale)
        .map(|(&m, &s)| gaussian_element(m, s, rng))
        .collect()
}
