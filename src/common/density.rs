use crate::common::divector::DiVector;
use crate::sampledtree::boundingbox::BoundingBox;

/// Accumulators behind the density estimate: a directional measure, the
/// expected distances to the query in each direction, and the probability
/// mass of a random cut falling in each direction. All three shrink
/// geometrically as the traversal ascends, mirroring the score recursion.
#[derive(Clone)]
pub struct DirectionalDensity {
    pub measure: DiVector,
    pub distance: DiVector,
    pub probability_mass: DiVector,
    pub sample_size: f32,
}

impl DirectionalDensity {
    pub fn empty(dimension: usize, sample_size: f32) -> Self {
        DirectionalDensity {
            measure: DiVector::empty(dimension),
            distance: DiVector::empty(dimension),
            probability_mass: DiVector::empty(dimension),
            sample_size,
        }
    }

    pub fn add_to(&self, other: &mut DirectionalDensity) {
        self.probability_mass.add_to(&mut other.probability_mass);
        self.distance.add_to(&mut other.distance);
        self.measure.add_to(&mut other.measure);
        other.sample_size += self.sample_size;
    }

    pub fn divide(&mut self, num: usize) {
        self.scale(1.0 / num as f64);
        self.sample_size = (self.sample_size as f64 / num as f64) as f32;
    }

    pub fn scale(&mut self, factor: f64) {
        self.distance.scale(factor);
        self.probability_mass.scale(factor);
        self.measure.scale(factor);
    }

    /// Folds one node of the traversal into the accumulators and returns the
    /// probability that a random cut separates `point` from `bounding_box`.
    pub fn update(&mut self, point: &[f32], bounding_box: &BoundingBox, measure: f64) -> f64 {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();
        let min_sum: f32 = min_values
            .iter()
            .zip(point)
            .map(|(&x, &y)| if x - y > 0.0 { x - y } else { 0.0 })
            .sum();
        let max_sum: f32 = point
            .iter()
            .zip(max_values)
            .map(|(&x, &y)| if x - y > 0.0 { x - y } else { 0.0 })
            .sum();
        let sum = max_sum + min_sum;
        let new_range = sum as f64 + bounding_box.range_sum();
        let prob = sum as f64 / new_range;
        if prob > 0.0 {
            self.scale(1.0 - prob);
            for i in 0..point.len() {
                if point[i] > max_values[i] {
                    let t = (point[i] - max_values[i]) as f64 / new_range;
                    self.distance.high[i] += t * (point[i] - min_values[i]) as f64;
                    self.probability_mass.high[i] += t;
                    self.measure.high[i] += measure * t;
                } else if point[i] < min_values[i] {
                    let t = (min_values[i] - point[i]) as f64 / new_range;
                    self.distance.low[i] += t * (max_values[i] - point[i]) as f64;
                    self.probability_mass.low[i] += t;
                    self.measure.low[i] += measure * t;
                }
            }
        }
        prob
    }

    /// Interpolates the accumulated measure against the expected manifold
    /// volume in each direction; `threshold` keeps the estimate bounded
    /// when the query coincides with the sample.
    pub fn directional_measure(&self, threshold: f64, manifold_dimension: f64) -> DiVector {
        assert!(
            self.sample_size >= 0.0 && self.measure.total() >= 0.0,
            "cannot have negative samples or measure"
        );
        if self.sample_size == 0.0f32 || self.measure.total() == 0.0 {
            return DiVector::empty(self.measure.dimensions());
        }

        let mut sum_of_factors = 0.0;
        for i in 0..self.measure.dimensions() {
            let mut t = if self.probability_mass.high_low_sum(i) > 0.0 {
                self.distance.high_low_sum(i) / self.probability_mass.high_low_sum(i)
            } else {
                0.0
            };
            if t > 0.0 {
                t = f64::exp(f64::ln(t) * manifold_dimension) * self.probability_mass.high_low_sum(i);
            }
            sum_of_factors += t;
        }

        let density_factor = 1.0 / (threshold + sum_of_factors);
        let mut answer = self.measure.clone();
        answer.scale(density_factor);
        answer
    }

    pub fn directional_density(&self) -> DiVector {
        self.directional_measure(1e-3, self.measure.dimensions() as f64)
    }

    pub fn density(&self) -> f64 {
        self.directional_density().total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_returns_separation_probability() {
        let bounding_box = BoundingBox::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let mut accumulator = DirectionalDensity::empty(2, 10.0);
        let prob = accumulator.update(&[2.0, 0.5], &bounding_box, 0.5);
        assert!((prob - 1.0 / 3.0).abs() < 1e-12);
        assert!(accumulator.probability_mass.high[0] > 0.0);
        assert_eq!(accumulator.probability_mass.low[0], 0.0);
        assert_eq!(accumulator.probability_mass.high[1], 0.0);
    }

    #[test]
    fn empty_accumulator_has_zero_density() {
        let accumulator = DirectionalDensity::empty(3, 0.0);
        assert_eq!(accumulator.density(), 0.0);
    }
}
