extern crate cutforest;

use cutforest::common::syntheticdata;
use cutforest::ForestOptions;

/// try cargo test --release; these tests stream a few thousand points

#[test]
fn gaussian_cluster_scoring_and_attribution() {
    let data = syntheticdata::mixture(
        2000,
        &[vec![0.0f32, 0.0]],
        &[vec![1.0f32, 1.0]],
        &[1.0f32],
        1,
    );

    let mut forest = ForestOptions::new(2)
        .sample_size(256)
        .number_of_trees(10)
        .time_decay(1.0 / 256.0)
        .random_seed(42)
        .build()
        .unwrap();

    for point in data.data.iter() {
        forest.update(point).unwrap();
    }

    let inlier = forest.score(&[0.0, 0.0]).unwrap();
    let outlier = forest.score(&[8.0, 8.0]).unwrap();
    assert!(inlier < 1.0, "cluster center scored {}", inlier);
    assert!(outlier > 1.0, "distant point scored {}", outlier);
    assert!(outlier > inlier);

    // the attribution splits the same score across dimensions; the
    // tolerance is the single-precision one since gaps are f32 values
    let attribution = forest.attribution(&[8.0, 8.0]).unwrap();
    assert!((attribution.total() - outlier).abs() < 1e-5 * f64::max(outlier, 1.0));
    let high_share = (attribution.high[0] + attribution.high[1]) / attribution.total();
    assert!(
        high_share >= 2.0 / 3.0,
        "high-direction share was {}",
        high_share
    );

    // both coordinates are unusually large, neither unusually small
    assert!(attribution.high[0] > attribution.low[0]);
    assert!(attribution.high[1] > attribution.low[1]);
}

#[test]
fn displacement_and_approximate_scores_order_points() {
    let data = syntheticdata::mixture(
        3000,
        &[vec![5.0f32, 0.0, 0.0], vec![-5.0f32, 0.0, 0.0]],
        &[vec![0.2f32, 0.2, 0.2], vec![0.2f32, 0.2, 0.2]],
        &[0.5f32, 0.5],
        17,
    );

    let mut forest = ForestOptions::new(3)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(99)
        .build()
        .unwrap();
    for point in data.data.iter() {
        forest.update(point).unwrap();
    }

    let center = forest.score(&[5.0, 0.0, 0.0]).unwrap();
    let between = forest.score(&[0.0, 0.0, 0.0]).unwrap();
    assert!(between > 1.5, "point between the modes scored {}", between);
    assert!(center < between);

    let displaced_center = forest.displacement_score(&[5.0, 0.0, 0.0]).unwrap();
    let displaced_between = forest.displacement_score(&[0.0, 0.0, 0.0]).unwrap();
    assert!(displaced_center < displaced_between);

    let approximate = forest.approximate_score(&[0.0, 0.0, 0.0]).unwrap();
    assert!(approximate > 1.0);
}

#[test]
fn neutral_results_before_output_after() {
    let mut forest = ForestOptions::new(2)
        .sample_size(64)
        .number_of_trees(5)
        .output_after(100)
        .random_seed(7)
        .build()
        .unwrap();
    for i in 0..99 {
        forest.update(&[i as f32, -(i as f32)]).unwrap();
        assert_eq!(forest.score(&[0.0, 0.0]).unwrap(), 0.0);
        let attribution = forest.attribution(&[0.0, 0.0]).unwrap();
        assert_eq!(attribution.total(), 0.0);
    }
    assert!(!forest.is_output_ready());
    forest.update(&[0.0, 0.0]).unwrap();
    assert!(forest.is_output_ready());
    assert!(forest.score(&[1000.0, 1000.0]).unwrap() > 0.0);
}

#[test]
fn signed_zero_inputs_are_indistinguishable() {
    let mut negative = ForestOptions::new(2)
        .sample_size(64)
        .number_of_trees(10)
        .random_seed(3)
        .build()
        .unwrap();
    let mut positive = ForestOptions::new(2)
        .sample_size(64)
        .number_of_trees(10)
        .random_seed(3)
        .build()
        .unwrap();
    for i in 0..500 {
        let x = (i % 17) as f32 / 3.0;
        negative.update(&[-0.0, x]).unwrap();
        positive.update(&[0.0, x]).unwrap();
    }
    for i in 0..17 {
        let query = [0.0f32, i as f32 / 3.0];
        let a = negative.score(&query).unwrap();
        let b = positive.score(&query).unwrap();
        assert_eq!(a, b);
    }
    assert_eq!(
        negative.score(&[-0.0, 1.0]).unwrap(),
        positive.score(&[0.0, 1.0]).unwrap()
    );
}
