use crate::common::samplesummary::{
    SampleSummary, DEFAULT_LOWER_FRACTION, DEFAULT_UPPER_FRACTION,
};
use crate::errors::Result;
use crate::pointstore::PointStore;
use crate::util::check_argument;

fn project_positions(point: &[f32], positions: &[usize]) -> Vec<f32> {
    positions.iter().map(|&i| point[i]).collect()
}

/// Turns the per-tree conditional samples `(score, reference, distance)`
/// into a weighted summary. Samples close to the query keep full weight;
/// the long tail is down-weighted by the ratio of a centrality-controlled
/// distance threshold to the sample's distance.
pub struct FieldSummarizer {
    centrality: f64,
    project: bool,
}

impl FieldSummarizer {
    pub fn new(centrality: f64, project: bool) -> Self {
        FieldSummarizer {
            centrality,
            project,
        }
    }

    pub fn summarize_list(
        &self,
        point_store: &dyn PointStore,
        point_list_with_distance: &[(f64, usize, f64)],
        positions: &[usize],
    ) -> Result<SampleSummary> {
        check_argument(
            !point_list_with_distance.is_empty(),
            "no conditional samples to summarize",
        )?;
        let mut distance_list: Vec<f64> =
            point_list_with_distance.iter().map(|a| a.2).collect();
        distance_list.sort_by(|a, b| a.partial_cmp(b).expect("distances are finite"));

        let mut threshold = 0.0;
        if self.centrality > 0.0 {
            let mut always_include = 0;
            while always_include < point_list_with_distance.len() - 1
                && distance_list[always_include] == 0.0
            {
                always_include += 1;
            }
            let remainder = distance_list.len() - always_include;
            threshold = self.centrality
                * (distance_list[always_include + remainder / 3]
                    + distance_list[always_include + remainder / 2]);
        }
        threshold +=
            (1.0 - self.centrality) * distance_list[point_list_with_distance.len() - 1];

        let mut weighted: Vec<(Vec<f32>, f32)> = Vec::new();
        for entry in point_list_with_distance {
            let point = if !self.project || positions.is_empty() {
                point_store.copy(entry.1)?
            } else {
                project_positions(&point_store.copy(entry.1)?, positions)
            };
            let weight: f32 = if entry.2 <= threshold {
                1.0
            } else {
                (threshold / entry.2) as f32
            };
            weighted.push((point, weight));
        }

        Ok(SampleSummary::from_points(
            &weighted,
            DEFAULT_LOWER_FRACTION,
            DEFAULT_UPPER_FRACTION,
        ))
    }
}
