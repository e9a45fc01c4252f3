use crate::sampledtree::boundingbox::BoundingBox;

/// Transient description of a cut while an insertion is being resolved;
/// the node store keeps cuts in columnar form, not in this shape.
pub struct Cut {
    pub dimension: usize,
    pub value: f32,
}

impl Cut {
    pub fn new(dimension: usize, value: f32) -> Self {
        Cut { dimension, value }
    }

    /// Draws the cut implied by `factor` (a uniform draw in [0,1)) on the
    /// box extended by `point`, and reports whether that cut separates the
    /// point from the box.
    ///
    /// The dimension is found by walking dimensions in index order and
    /// subtracting each extended range from the scaled draw; the cut lands
    /// in the first dimension where the residual no longer exceeds the
    /// range, at `min + residual`. A residual that collapses onto a box
    /// face under f32 rounding is clamped to the low face, which keeps the
    /// two sides of the cut non-trivial.
    pub fn random_cut_and_separation(
        bounding_box: &BoundingBox,
        factor: f64,
        point: &[f32],
    ) -> (Cut, bool) {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();
        let mut range: f64 = min_values
            .iter()
            .zip(max_values)
            .zip(point)
            .map(|((x, y), z)| {
                if z < x {
                    (x - z) as f64
                } else if y < z {
                    (z - y) as f64
                } else {
                    0.0
                }
            })
            .sum();
        if range == 0.0 {
            return (Cut::new(usize::MAX, 0.0), false);
        }
        range += bounding_box.range_sum();
        range *= factor;

        let mut dim: usize = 0;
        let mut new_cut: f32 = f32::MAX;

        while dim < point.len() {
            let min_v = if point[dim] < min_values[dim] {
                point[dim]
            } else {
                min_values[dim]
            };
            let max_v = if point[dim] > max_values[dim] {
                point[dim]
            } else {
                max_values[dim]
            };

            let gap: f32 = max_v - min_v;
            // the residual cannot outlive the last dimension; rounding in
            // the per-dimension subtraction must not push it past the end
            if gap > range as f32 || dim == point.len() - 1 {
                new_cut = min_v + range as f32; // f32 rounding is deliberate
                if new_cut <= min_v || new_cut >= max_v {
                    new_cut = min_v;
                }
                break;
            }
            range -= gap as f64;
            dim += 1;
        }

        let min_value = min_values[dim];
        let max_value = max_values[dim];

        let separation: bool = ((point[dim] <= new_cut) && (new_cut < min_value))
            || ((max_value <= new_cut) && (new_cut < point[dim]));
        (Cut::new(dim, new_cut), separation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_dimensions_in_index_order() {
        // extended box over {(0,0), (1,3)}: ranges 1 and 3, total 4
        let bounding_box = BoundingBox::from_point(&[0.0, 0.0]);
        let point = [1.0f32, 3.0];
        // a draw inside the first quarter cuts dimension 0
        let (cut, separation) = Cut::random_cut_and_separation(&bounding_box, 0.125, &point);
        assert_eq!(cut.dimension, 0);
        assert!((cut.value - 0.5).abs() < 1e-6);
        assert!(separation);
        // past the first range the residual lands in dimension 1
        let (cut, separation) = Cut::random_cut_and_separation(&bounding_box, 0.5, &point);
        assert_eq!(cut.dimension, 1);
        assert!((cut.value - 1.0).abs() < 1e-6);
        assert!(separation);
    }

    #[test]
    fn no_cut_for_a_contained_point() {
        let bounding_box = BoundingBox::new(&[0.0, 0.0], &[2.0, 2.0]).unwrap();
        let (cut, separation) = Cut::random_cut_and_separation(&bounding_box, 0.3, &[1.0, 1.0]);
        assert_eq!(cut.dimension, usize::MAX);
        assert!(!separation);
    }

    #[test]
    fn separation_only_when_point_is_isolated() {
        // point to the right of the box in dimension 0
        let bounding_box = BoundingBox::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let point = [3.0f32, 0.5];
        // extended ranges: 3 and 1; a draw of 0.5 scales to 2.0 -> dim 0 at 2.0,
        // between the box face (1.0) and the point (3.0): separation
        let (cut, separation) = Cut::random_cut_and_separation(&bounding_box, 0.5, &point);
        assert_eq!(cut.dimension, 0);
        assert!(separation);
        assert!(cut.value >= 1.0 && cut.value < 3.0);
    }
}
