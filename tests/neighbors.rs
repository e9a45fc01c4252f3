extern crate cutforest;

use cutforest::errors::ForestError;
use cutforest::ForestOptions;

/// Near-neighbor queries return sampled points in ascending distance order
/// and carry the sequence indexes under which each point was admitted.
#[test]
fn neighbors_are_sorted_and_carry_sequence_indexes() {
    let mut forest = ForestOptions::new(2)
        .sample_size(64)
        .number_of_trees(30)
        .store_sequence_indexes(true)
        .time_decay(0.0)
        .random_seed(42)
        .build()
        .unwrap();

    // two cluster points fed at known parities, one far outlier at the end
    let near = [0.1f32, 0.0];
    let nearer_by_l1 = [0.0f32, 0.05];
    for i in 0..600u64 {
        if i % 2 == 0 {
            forest.update(&near).unwrap();
        } else {
            forest.update(&nearer_by_l1).unwrap();
        }
    }
    for _ in 0..5 {
        forest.update(&[50.0, 50.0]).unwrap();
    }

    let neighbors = forest.near_neighbors(&[0.0, 0.0], 5.0).unwrap();
    assert!(
        !neighbors.is_empty() && neighbors.len() <= 2,
        "outlier must fall outside the radius"
    );
    for pair in neighbors.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }

    for neighbor in neighbors.iter() {
        assert!(
            neighbor.point == vec![0.1, 0.0] || neighbor.point == vec![0.0, 0.05],
            "unexpected neighbor {:?}",
            neighbor.point
        );
        assert!(!neighbor.sequence_indexes.is_empty());
        let mut sorted = neighbor.sequence_indexes.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, neighbor.sequence_indexes);
        let expected_parity = if neighbor.point == vec![0.1, 0.0] { 0 } else { 1 };
        for &sequence in neighbor.sequence_indexes.iter() {
            assert!(sequence < 600);
            assert_eq!(sequence % 2, expected_parity);
        }
    }

    // the outlier is its own neighborhood, admitted after the cluster
    let far = forest.near_neighbors(&[50.0, 50.0], 5.0).unwrap();
    assert_eq!(far.len(), 1);
    assert_eq!(far[0].point, vec![50.0, 50.0]);
    assert!(far[0].sequence_indexes.iter().all(|&s| s >= 600));
}

#[test]
fn neighbors_require_sequence_indexes() {
    let mut forest = ForestOptions::new(2)
        .sample_size(32)
        .number_of_trees(5)
        .random_seed(1)
        .build()
        .unwrap();
    for i in 0..200 {
        forest.update(&[i as f32 % 7.0, 0.0]).unwrap();
    }
    assert!(matches!(
        forest.near_neighbors(&[0.0, 0.0], 1.0),
        Err(ForestError::InvalidArgument { .. })
    ));
}

#[test]
fn neighbors_are_neutral_before_readiness() {
    let mut forest = ForestOptions::new(2)
        .sample_size(32)
        .number_of_trees(5)
        .store_sequence_indexes(true)
        .output_after(100)
        .random_seed(1)
        .build()
        .unwrap();
    for _ in 0..50 {
        forest.update(&[1.0, 1.0]).unwrap();
    }
    assert!(forest.near_neighbors(&[1.0, 1.0], 10.0).unwrap().is_empty());
}
