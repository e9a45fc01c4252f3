use crate::errors::Result;
use crate::util::check_argument;

/// Axis-aligned minimum enclosing box of a set of points, kept as two
/// f32 vectors plus the precomputed sum of per-dimension ranges (in f64,
/// since the sum is what the cut probabilities divide by).
#[derive(Clone)]
pub struct BoundingBox {
    range_sum: f64,
    min_values: Vec<f32>,
    max_values: Vec<f32>,
}

impl BoundingBox {
    pub fn new(first: &[f32], second: &[f32]) -> Result<Self> {
        check_argument(first.len() == second.len(), "mismatched point lengths")?;
        let min_values: Vec<f32> = first
            .iter()
            .zip(second)
            .map(|(x, y)| if *x < *y { *x } else { *y })
            .collect();
        let max_values: Vec<f32> = first
            .iter()
            .zip(second)
            .map(|(x, y)| if *x > *y { *x } else { *y })
            .collect();
        let range_sum = min_values
            .iter()
            .zip(&max_values)
            .map(|(x, y)| (y - x) as f64)
            .sum();
        Ok(BoundingBox {
            min_values,
            max_values,
            range_sum,
        })
    }

    pub fn from_point(point: &[f32]) -> Self {
        BoundingBox {
            min_values: Vec::from(point),
            max_values: Vec::from(point),
            range_sum: 0.0,
        }
    }

    /// Extends the box by a point; returns true when the range sum did not
    /// change, i.e. the point was already inside (touching faces included).
    pub fn check_contains_and_add_point(&mut self, values: &[f32]) -> bool {
        self.add_two_arrays(values, values)
    }

    pub fn add_box(&mut self, other: &BoundingBox) {
        self.add_two_arrays(other.min_values(), other.max_values());
    }

    fn add_two_arrays(&mut self, min_values: &[f32], max_values: &[f32]) -> bool {
        let old_sum = self.range_sum;
        for (x, y) in self.min_values.iter_mut().zip(min_values) {
            *x = if *x < *y { *x } else { *y };
        }
        for (x, y) in self.max_values.iter_mut().zip(max_values) {
            *x = if *x < *y { *y } else { *x };
        }
        self.range_sum = self
            .min_values
            .iter()
            .zip(&self.max_values)
            .map(|(x, y)| (y - x) as f64)
            .sum();
        old_sum == self.range_sum
    }

    pub fn range_sum(&self) -> f64 {
        self.range_sum
    }

    pub fn min_values(&self) -> &[f32] {
        &self.min_values
    }

    pub fn max_values(&self) -> &[f32] {
        &self.max_values
    }

    /// Probability that a random cut of the box extended by `point`
    /// separates `point` from the box.
    pub fn probability_of_cut(&self, point: &[f32]) -> f64 {
        let min_sum: f32 = self
            .min_values
            .iter()
            .zip(point)
            .map(|(&x, &y)| if x - y > 0.0 { x - y } else { 0.0 })
            .sum();
        let max_sum: f32 = point
            .iter()
            .zip(&self.max_values)
            .map(|(&x, &y)| if x - y > 0.0 { x - y } else { 0.0 })
            .sum();
        let sum = max_sum + min_sum;
        if sum == 0.0 {
            return 0.0;
        } else if self.range_sum == 0.0 {
            return 1.0;
        }
        (sum as f64) / (self.range_sum + sum as f64)
    }

    /// Same as [`probability_of_cut`](Self::probability_of_cut), ignoring the
    /// dimensions flagged missing; used by the imputation traversal where the
    /// query has no opinion in those dimensions.
    pub fn probability_of_cut_with_missing(&self, point: &[f32], missing: &[bool]) -> f64 {
        let min_sum: f32 = self
            .min_values
            .iter()
            .zip(point)
            .zip(missing)
            .map(|((&x, &y), &skip)| if !skip && x - y > 0.0 { x - y } else { 0.0 })
            .sum();
        let max_sum: f32 = point
            .iter()
            .zip(&self.max_values)
            .zip(missing)
            .map(|((&x, &y), &skip)| if !skip && x - y > 0.0 { x - y } else { 0.0 })
            .sum();
        let sum = max_sum + min_sum;
        if sum == 0.0 {
            return 0.0;
        } else if self.range_sum == 0.0 {
            return 1.0;
        }
        (sum as f64) / (self.range_sum + sum as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_orders_corners() {
        let unit = BoundingBox::new(&[1.0, -1.0], &[-1.0, 1.0]).unwrap();
        assert_eq!(unit.min_values(), &[-1.0, -1.0]);
        assert_eq!(unit.max_values(), &[1.0, 1.0]);
        assert_eq!(unit.range_sum(), 4.0);
    }

    #[test]
    fn adding_interior_point_reports_containment() {
        let mut unit = BoundingBox::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert!(unit.check_contains_and_add_point(&[0.5, 0.5]));
        assert!(!unit.check_contains_and_add_point(&[2.0, 0.5]));
        assert_eq!(unit.max_values(), &[2.0, 1.0]);
        assert_eq!(unit.range_sum(), 3.0);
    }

    #[test]
    fn cut_probability_matches_gap_ratio() {
        let unit = BoundingBox::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert_eq!(unit.probability_of_cut(&[0.5, 0.5]), 0.0);
        // one unit of gap against two units of range
        let p = unit.probability_of_cut(&[2.0, 0.5]);
        assert!((p - 1.0 / 3.0).abs() < 1e-12);
        // a degenerate box is always separated from a distinct point
        let degenerate = BoundingBox::from_point(&[0.0, 0.0]);
        assert_eq!(degenerate.probability_of_cut(&[1.0, 0.0]), 1.0);
    }

    #[test]
    fn missing_coordinates_do_not_contribute() {
        let unit = BoundingBox::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let p = unit.probability_of_cut_with_missing(&[2.0, 5.0], &[false, true]);
        assert!((p - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(
            unit.probability_of_cut_with_missing(&[2.0, 5.0], &[true, true]),
            0.0
        );
    }
}
