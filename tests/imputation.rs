extern crate cutforest;

use cutforest::common::syntheticdata;
use cutforest::ForestOptions;

/// Imputation on a tightly correlated stream: the second coordinate is
/// always twice the first, so a missing second coordinate has an obvious
/// completion.
#[test]
fn imputes_the_correlated_coordinate() {
    let mut forest = ForestOptions::new(2)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(42)
        .build()
        .unwrap();
    let mut x = 0.0f32;
    for _ in 0..2000 {
        x = (x + 0.7) % 10.0;
        forest.update(&[x, 2.0 * x]).unwrap();
    }

    let completed = forest.impute_missing(&[5.0, 0.0], &[1]).unwrap();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0], 5.0);
    assert!(
        (completed[1] - 10.0).abs() < 2.0,
        "imputed {} for the pair of 5.0",
        completed[1]
    );

    // the conditional summary brackets the imputed value
    let summary = forest.conditional_field(&[1], &[5.0, 0.0], 1.0, true).unwrap();
    assert_eq!(summary.median.len(), 1);
    assert!(summary.lower[0] <= summary.median[0]);
    assert!(summary.median[0] <= summary.upper[0]);
}

#[test]
fn imputation_validates_its_arguments() {
    let mut forest = ForestOptions::new(2)
        .sample_size(64)
        .number_of_trees(5)
        .random_seed(9)
        .build()
        .unwrap();
    for i in 0..300 {
        forest.update(&[i as f32 % 5.0, i as f32 % 3.0]).unwrap();
    }
    assert!(forest.impute_missing(&[1.0, 1.0], &[]).is_err());
    assert!(forest.impute_missing(&[1.0, 1.0], &[2]).is_err());
}

#[test]
fn density_is_higher_near_the_data() {
    let data = syntheticdata::mixture(
        2000,
        &[vec![0.0f32, 0.0]],
        &[vec![0.5f32, 0.5]],
        &[1.0f32],
        3,
    );
    let mut forest = ForestOptions::new(2)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(11)
        .build()
        .unwrap();
    for point in data.data.iter() {
        forest.update(point).unwrap();
    }
    let near = forest.density(&[0.0, 0.0]).unwrap();
    let far = forest.density(&[15.0, 15.0]).unwrap();
    assert!(near > far, "density near {} far {}", near, far);
    assert!(far >= 0.0);

    let directional = forest.directional_density(&[15.0, 15.0]).unwrap();
    // the probe sits above the cluster in both coordinates
    assert!(directional.high[0] + directional.high[1] >= directional.low[0] + directional.low[1]);
}

#[test]
fn optional_bookkeeping_streams_cleanly() {
    // center-of-mass sums and sequence maps ride along with every
    // mutation; a churning stream exercises both paths end to end
    let mut forest = ForestOptions::new(2)
        .sample_size(128)
        .number_of_trees(10)
        .center_of_mass(true)
        .store_sequence_indexes(true)
        .random_seed(5)
        .build()
        .unwrap();
    let mut x = 0.0f32;
    for _ in 0..3000 {
        x = (x + 1.3) % 7.0;
        forest.update(&[x, -x]).unwrap();
    }
    assert!(forest.score(&[3.0, -3.0]).unwrap() >= 0.0);
    assert!(!forest.near_neighbors(&[3.0, -3.0], 20.0).unwrap().is_empty());
}
