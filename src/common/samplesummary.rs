/// Weighted summary statistics of a collection of points: mean, weighted
/// median and percentile bounds per dimension, plus the global deviation.
/// Summaries are what the conditional-field machinery hands back to
/// imputation and extrapolation.
pub struct SampleSummary {
    pub total_weight: f32,
    pub mean: Vec<f32>,
    pub median: Vec<f32>,
    pub upper: Vec<f32>,
    pub lower: Vec<f32>,
    pub deviation: Vec<f32>,
}

pub const DEFAULT_UPPER_FRACTION: f64 = 0.9;
pub const DEFAULT_LOWER_FRACTION: f64 = 0.1;

impl SampleSummary {
    /// The neutral summary handed out before the forest is ready.
    pub fn empty(dimensions: usize) -> Self {
        SampleSummary {
            total_weight: 0.0,
            mean: vec![0.0; dimensions],
            median: vec![0.0; dimensions],
            upper: vec![0.0; dimensions],
            lower: vec![0.0; dimensions],
            deviation: vec![0.0; dimensions],
        }
    }

    /// Index of the entry where the running weight first reaches `weight`,
    /// resuming a previous scan at `start` with `initial_weight` already
    /// accumulated. Entries must be sorted by value.
    pub fn pick(
        weighted_values: &[(f32, f32)],
        weight: f64,
        start: usize,
        initial_weight: f64,
    ) -> (usize, f64) {
        let mut running = initial_weight;
        let mut index = start;
        while index + 1 < weighted_values.len()
            && (weighted_values[index].1 as f64) + running < weight
        {
            running += weighted_values[index].1 as f64;
            index += 1;
        }
        (index, running)
    }

    pub fn from_points(
        points: &[(Vec<f32>, f32)],
        lower_fraction: f64,
        upper_fraction: f64,
    ) -> Self {
        assert!(!points.is_empty(), "cannot summarize an empty list");
        assert!(lower_fraction < 0.5, "lower fraction must be below half");
        assert!(upper_fraction > 0.5, "upper fraction must be above half");
        let dimensions = points[0].0.len();
        assert!(dimensions > 0, "cannot have 0 dimensions");
        let total_weight: f64 = points.iter().map(|x| x.1 as f64).sum();
        assert!(
            total_weight > 0.0 && total_weight.is_finite(),
            "weights must be positive and finite"
        );

        let mut mean = vec![0.0f32; dimensions];
        let mut deviation = vec![0.0f32; dimensions];
        let mut sum_values = vec![0.0f64; dimensions];
        let mut sum_values_sq = vec![0.0f64; dimensions];
        for (point, weight) in points {
            assert!(point.len() == dimensions, "mismatched dimensions");
            assert!(*weight >= 0.0, "weights must be non-negative");
            for j in 0..dimensions {
                assert!(point[j].is_finite(), "cannot summarize non-finite values");
                sum_values[j] += *weight as f64 * point[j] as f64;
                sum_values_sq[j] += *weight as f64 * point[j] as f64 * point[j] as f64;
            }
        }
        for j in 0..dimensions {
            mean[j] = (sum_values[j] / total_weight) as f32;
            let t: f64 = sum_values_sq[j] / total_weight
                - sum_values[j] * sum_values[j] / (total_weight * total_weight);
            deviation[j] = f64::sqrt(if t > 0.0 { t } else { 0.0 }) as f32;
        }

        let mut median = vec![0.0f32; dimensions];
        let mut upper_vec = vec![0.0f32; dimensions];
        let mut lower_vec = vec![0.0f32; dimensions];
        let half = total_weight / 2.0;
        let lower_weight = total_weight * lower_fraction;
        let upper_weight = total_weight * upper_fraction;
        for j in 0..dimensions {
            let mut column: Vec<(f32, f32)> = points.iter().map(|x| (x.0[j], x.1)).collect();
            column.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("non-finite value"));
            let first = Self::pick(&column, lower_weight, 0, 0.0);
            lower_vec[j] = column[first.0].0;
            let second = Self::pick(&column, half, first.0, first.1);
            median[j] = column[second.0].0;
            let third = Self::pick(&column, upper_weight, second.0, second.1);
            upper_vec[j] = column[third.0].0;
        }

        SampleSummary {
            total_weight: total_weight as f32,
            mean,
            median,
            upper: upper_vec,
            lower: lower_vec,
            deviation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_uniform_weights() {
        let points: Vec<(Vec<f32>, f32)> =
            (0..101).map(|i| (vec![i as f32], 1.0f32)).collect();
        let summary = SampleSummary::from_points(&points, 0.1, 0.9);
        assert_eq!(summary.median[0], 50.0);
        assert!((summary.mean[0] - 50.0).abs() < 1e-4);
        assert!(summary.lower[0] <= 11.0);
        assert!(summary.upper[0] >= 89.0);
    }

    #[test]
    fn weights_move_the_median() {
        let points = vec![
            (vec![0.0f32], 1.0f32),
            (vec![1.0f32], 1.0f32),
            (vec![10.0f32], 10.0f32),
        ];
        let summary = SampleSummary::from_points(&points, 0.1, 0.9);
        assert_eq!(summary.median[0], 10.0);
    }

    #[test]
    fn deviation_is_zero_for_constant_points() {
        let points = vec![(vec![3.0f32, -1.0], 2.0f32), (vec![3.0f32, -1.0], 5.0f32)];
        let summary = SampleSummary::from_points(&points, 0.2, 0.8);
        assert_eq!(summary.deviation, vec![0.0, 0.0]);
        assert_eq!(summary.mean, vec![3.0, -1.0]);
    }
}
