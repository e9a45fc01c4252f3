extern crate cutforest;

use cutforest::common::syntheticdata;
use cutforest::forest::Forest;
use cutforest::{ForestOptions, CONFIG_BOUNDING_BOX_CACHE_FRACTION};

/// Executor and cache configuration must be unobservable: for a fixed seed
/// and update sequence, scores agree to within 1e-10 between sequential
/// and parallel execution and across bounding-box cache fractions.

fn build(parallel: bool, cache_fraction: f64, pool_size: usize) -> Box<dyn Forest> {
    ForestOptions::new(3)
        .sample_size(128)
        .number_of_trees(20)
        .time_decay(1.0 / 1280.0)
        .bounding_box_cache_fraction(cache_fraction)
        .parallel_enabled(parallel)
        .thread_pool_size(pool_size)
        .random_seed(4242)
        .build()
        .unwrap()
}

fn stream() -> Vec<Vec<f32>> {
    syntheticdata::mixture(
        2048,
        &[vec![3.0f32, 0.0, -1.0], vec![-3.0f32, 1.0, 1.0]],
        &[vec![0.5f32, 0.5, 0.5], vec![0.5f32, 0.5, 0.5]],
        &[0.6f32, 0.4],
        11,
    )
    .data
}

fn queries() -> Vec<Vec<f32>> {
    let mut answer = stream().into_iter().step_by(128).collect::<Vec<_>>();
    answer.push(vec![10.0, 10.0, 10.0]);
    answer.push(vec![0.0, 0.0, 0.0]);
    answer
}

fn executors_agree_core(cache_fraction: f64, pool_size: usize) {
    let mut sequential = build(false, cache_fraction, pool_size);
    let mut parallel = build(true, cache_fraction, pool_size);
    let mut baseline = build(false, 1.0, pool_size);
    for point in stream().iter() {
        sequential.update(point).unwrap();
        parallel.update(point).unwrap();
        baseline.update(point).unwrap();
    }
    for query in queries().iter() {
        let a = sequential.score(query).unwrap();
        let b = parallel.score(query).unwrap();
        let c = baseline.score(query).unwrap();
        assert!((a - b).abs() < 1e-10, "sequential {} parallel {}", a, b);
        assert!(
            (a - c).abs() < 1e-10,
            "fraction {} gave {}, full cache {}",
            cache_fraction,
            a,
            c
        );

        let attribution_a = sequential.attribution(query).unwrap();
        let attribution_b = parallel.attribution(query).unwrap();
        for i in 0..3 {
            assert!((attribution_a.high[i] - attribution_b.high[i]).abs() < 1e-10);
            assert!((attribution_a.low[i] - attribution_b.low[i]).abs() < 1e-10);
        }
    }
}

#[cfg(test)]
parameterized_test::create! { executors_agree, (cache_fraction, pool_size), {
    executors_agree_core(cache_fraction, pool_size);
}}

executors_agree! {
    no_cache: (0.0, 2),
    sparse_cache: (0.4, 4),
    full_cache: (1.0, 4),
}

#[test]
fn dynamic_cache_reconfiguration_preserves_results() {
    let data = stream();
    let mut steady = build(false, 1.0, 2);
    let mut reconfigured = build(false, 1.0, 2);
    for (i, point) in data.iter().enumerate() {
        if i == 700 {
            reconfigured
                .config_set(CONFIG_BOUNDING_BOX_CACHE_FRACTION, 0.2)
                .unwrap();
        }
        if i == 1400 {
            reconfigured
                .config_set(CONFIG_BOUNDING_BOX_CACHE_FRACTION, 0.8)
                .unwrap();
        }
        steady.update(point).unwrap();
        reconfigured.update(point).unwrap();
    }
    for query in queries().iter() {
        let a = steady.score(query).unwrap();
        let b = reconfigured.score(query).unwrap();
        assert!((a - b).abs() < 1e-10, "steady {} reconfigured {}", a, b);
    }
}

#[test]
fn impute_and_extrapolate_agree_across_executors() {
    let values = syntheticdata::cosine(850, 120, 50.0, 3.0, 5);
    let mut sequential = ForestOptions::new(10)
        .shingle_size(10)
        .internal_shingling(true)
        .sample_size(128)
        .number_of_trees(20)
        .random_seed(77)
        .build()
        .unwrap();
    let mut parallel = ForestOptions::new(10)
        .shingle_size(10)
        .internal_shingling(true)
        .sample_size(128)
        .number_of_trees(20)
        .parallel_enabled(true)
        .thread_pool_size(4)
        .random_seed(77)
        .build()
        .unwrap();
    for &value in values.iter() {
        sequential.update(&[value]).unwrap();
        parallel.update(&[value]).unwrap();
    }
    let a = sequential.extrapolate(20).unwrap();
    let b = parallel.extrapolate(20).unwrap();
    for i in 0..a.values.len() {
        assert!((a.values[i] - b.values[i]).abs() < 1e-10);
        assert!((a.upper[i] - b.upper[i]).abs() < 1e-10);
        assert!((a.lower[i] - b.lower[i]).abs() < 1e-10);
    }
}
