use crate::errors::{ForestError, Result};

/// If the test condition is false, return an `InvalidArgument` error with
/// the given message. Otherwise return Ok.
pub(crate) fn check_argument(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::InvalidArgument { msg })
    }
}

/// Replaces every negative zero by positive zero. Stored points are used as
/// exact-equality lookup keys inside the trees, and `-0.0 == 0.0` while the
/// two have different bit patterns; normalizing on the way in keeps the keys
/// well defined.
pub fn sanitize(point: &[f32]) -> Vec<f32> {
    point
        .iter()
        .map(|&x| if x == 0.0 { 0.0 } else { x })
        .collect()
}

/// Single-precision conversion for callers holding double input, with the
/// same signed-zero normalization as [`sanitize`].
pub fn sanitize_f64(point: &[f64]) -> Vec<f32> {
    point
        .iter()
        .map(|&x| {
            let y = x as f32;
            if y == 0.0 {
                0.0
            } else {
                y
            }
        })
        .collect()
}

// reduction plumbing used by the executor; collectors must be commutative
// and associative, the executor folds per-tree results in declared order

pub(crate) fn add_to(a: &f64, b: &mut f64) {
    *b += *a;
}

pub(crate) fn divide(a: &mut f64, b: usize) {
    *a /= b as f64;
}

pub(crate) fn add_nbr(a: &(f64, usize, f64), b: &mut Vec<(f64, usize, f64)>) {
    b.push(*a)
}

pub(crate) fn nbr_finish(_a: &mut Vec<(f64, usize, f64)>, _b: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clears_negative_zero() {
        let cleaned = sanitize(&[-0.0, 0.0, -1.5, 2.0]);
        assert_eq!(cleaned, vec![0.0, 0.0, -1.5, 2.0]);
        assert!(cleaned[0].to_bits() == 0.0f32.to_bits());
    }

    #[test]
    fn sanitize_f64_rounds_and_clears() {
        let cleaned = sanitize_f64(&[-0.0f64, 48.08000000000001]);
        assert_eq!(cleaned[0].to_bits(), 0.0f32.to_bits());
        assert_eq!(cleaned[1], 48.08f32);
    }

    #[test]
    fn check_argument_propagates() {
        assert!(check_argument(true, "fine").is_ok());
        assert!(check_argument(false, "broken").is_err());
    }
}
