use crate::sampledtree::boundingbox::BoundingBox;

/// A pair of non-negative vectors tracking a quantity separately in the
/// positive ("high") and negative ("low") direction of each dimension.
/// Attribution results are reported in this form: `high[i]` is the share of
/// the score owed to coordinate `i` being unusually large, `low[i]` to it
/// being unusually small.
#[derive(Clone)]
pub struct DiVector {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
}

impl DiVector {
    pub fn empty(dimension: usize) -> Self {
        DiVector {
            high: vec![0.0; dimension],
            low: vec![0.0; dimension],
        }
    }

    pub fn new(high: &[f64], low: &[f64]) -> Self {
        assert!(high.len() == low.len(), "mismatched lengths");
        DiVector {
            high: Vec::from(high),
            low: Vec::from(low),
        }
    }

    /// Overwrites this vector with the per-dimension separation
    /// probabilities of `point` against `bounding_box`, so that the total
    /// equals the box's probability of cut.
    pub fn assign_as_probability_of_cut(&mut self, bounding_box: &BoundingBox, point: &[f32]) {
        let min_sum: f64 = self
            .low
            .iter_mut()
            .zip(bounding_box.min_values())
            .zip(point)
            .map(|((x, &y), &z)| {
                if y - z > 0.0 {
                    *x = (y - z) as f64;
                    *x
                } else {
                    *x = 0.0;
                    *x
                }
            })
            .sum();
        let max_sum: f64 = self
            .high
            .iter_mut()
            .zip(point)
            .zip(bounding_box.max_values())
            .map(|((x, &y), &z)| {
                if y - z > 0.0 {
                    *x = (y - z) as f64;
                    *x
                } else {
                    *x = 0.0;
                    *x
                }
            })
            .sum();
        let sum = min_sum + max_sum;
        if sum != 0.0 {
            self.scale(1.0 / (bounding_box.range_sum() + sum));
        }
    }

    pub fn add_from(&mut self, other: &DiVector, factor: f64) {
        other.add_to_scaled(self, factor);
    }

    pub fn add_to(&self, other: &mut DiVector) {
        for (x, &y) in other.high.iter_mut().zip(&self.high) {
            *x += y;
        }
        for (x, &y) in other.low.iter_mut().zip(&self.low) {
            *x += y;
        }
    }

    pub fn add_to_scaled(&self, other: &mut DiVector, factor: f64) {
        for (x, &y) in other.high.iter_mut().zip(&self.high) {
            *x += y * factor;
        }
        for (x, &y) in other.low.iter_mut().zip(&self.low) {
            *x += y * factor;
        }
    }

    pub fn divide(&mut self, num: usize) {
        self.scale(1.0 / num as f64)
    }

    pub fn scale(&mut self, factor: f64) {
        for x in self.high.iter_mut() {
            *x *= factor;
        }
        for x in self.low.iter_mut() {
            *x *= factor;
        }
    }

    pub fn total(&self) -> f64 {
        self.high.iter().sum::<f64>() + self.low.iter().sum::<f64>()
    }

    /// Rescales so the total equals `value`; an all-zero vector is spread
    /// uniformly instead, keeping the total meaningful.
    pub fn normalize(&mut self, value: f64) {
        let current = self.total();
        if current <= 0.0 {
            let v = value / (2.0 * self.high.len() as f64);
            for x in self.high.iter_mut() {
                *x = v;
            }
            for x in self.low.iter_mut() {
                *x = v;
            }
        } else {
            self.scale(value / current);
        }
    }

    pub fn dimensions(&self) -> usize {
        self.high.len()
    }

    pub fn high_low_sum(&self, index: usize) -> f64 {
        self.high[index] + self.low[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_assignment_sums_to_cut_probability() {
        let bounding_box = BoundingBox::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let point = [2.0f32, -1.0];
        let mut vector = DiVector::empty(2);
        vector.assign_as_probability_of_cut(&bounding_box, &point);
        let expected = bounding_box.probability_of_cut(&point);
        assert!((vector.total() - expected).abs() < 1e-12);
        assert!(vector.high[0] > 0.0 && vector.low[0] == 0.0);
        assert!(vector.low[1] > 0.0 && vector.high[1] == 0.0);
    }

    #[test]
    fn normalize_spreads_zero_vectors() {
        let mut vector = DiVector::empty(2);
        vector.normalize(1.0);
        assert!((vector.total() - 1.0).abs() < 1e-12);
        assert!((vector.high[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn accumulation_and_division() {
        let mut total = DiVector::empty(2);
        let part = DiVector::new(&[1.0, 0.0], &[0.0, 3.0]);
        part.add_to(&mut total);
        part.add_to(&mut total);
        total.divide(2);
        assert!((total.high[0] - 1.0).abs() < 1e-12);
        assert!((total.low[1] - 3.0).abs() < 1e-12);
        assert!((total.high_low_sum(1) - 3.0).abs() < 1e-12);
    }
}
