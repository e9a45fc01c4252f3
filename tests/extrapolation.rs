extern crate cutforest;

use std::f32::consts::PI;

use cutforest::common::syntheticdata;
use cutforest::ForestOptions;

/// Feed a noisy cosine through an internally shingled forest and forecast
/// ahead; the forecast has to track the clean continuation to within a
/// few noise widths.
#[test]
fn cosine_extrapolation_tracks_the_wave() {
    let period = 120usize;
    let amplitude = 50.0f32;
    let noise = 3.0f32;
    let trained = 850usize;
    let horizon = 100usize;

    let values = syntheticdata::cosine(trained, period, amplitude, noise, 5);
    let mut forest = ForestOptions::new(10)
        .shingle_size(10)
        .internal_shingling(true)
        .sample_size(256)
        .number_of_trees(30)
        .time_decay(1e-4)
        .random_seed(42)
        .build()
        .unwrap();
    for &value in values.iter() {
        forest.update(&[value]).unwrap();
    }

    let forecast = forest.extrapolate(horizon).unwrap();
    assert_eq!(forecast.values.len(), horizon);

    let mut absolute_error = 0.0f64;
    for i in 0..horizon {
        let expected = amplitude * (2.0 * PI * (trained + i) as f32 / period as f32).cos();
        absolute_error += f64::abs(forecast.values[i] as f64 - expected as f64);
        assert!(forecast.lower[i] <= forecast.values[i]);
        assert!(forecast.values[i] <= forecast.upper[i]);
    }
    let mean_absolute_error = absolute_error / horizon as f64;
    assert!(
        mean_absolute_error <= 4.0 * noise as f64,
        "mean absolute error {}",
        mean_absolute_error
    );
}

#[test]
fn extrapolation_requires_internal_shingling() {
    let mut forest = ForestOptions::new(4)
        .shingle_size(2)
        .sample_size(64)
        .number_of_trees(10)
        .random_seed(1)
        .build()
        .unwrap();
    for i in 0..300 {
        let x = i as f32 / 10.0;
        forest.update(&[x.sin(), x.cos(), x.sin(), x.cos()]).unwrap();
    }
    assert!(forest.extrapolate(10).is_err());
    assert!(forest.extrapolate(0).is_err());
}

#[test]
fn warmup_extrapolation_is_neutral() {
    let mut forest = ForestOptions::new(6)
        .shingle_size(3)
        .internal_shingling(true)
        .sample_size(64)
        .number_of_trees(10)
        .output_after(50)
        .random_seed(2)
        .build()
        .unwrap();
    for i in 0..20 {
        forest.update(&[i as f32, -(i as f32)]).unwrap();
    }
    let forecast = forest.extrapolate(5).unwrap();
    assert_eq!(forecast.values, vec![0.0; 10]);
}
