//! Output contract for the downstream trainer: every probability in `[0, 1]`.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::Display, derive_more::Error,
)]
#[display("{out_of_range} of {total} probabilities outside [0, 1] (observed min {min}, max {max})")]
pub struct ProbabilityRangeError {
    /// Smallest value seen, NaN when every value was NaN.
    pub min: f64,
    pub max: f64,
    /// Count of values outside `[0, 1]`, NaN included.
    pub out_of_range: usize,
    pub total: usize,
}

pub fn validate_probabilities(probabilities: &[f64]) -> Result<(), ProbabilityRangeError> {
    let mut min = f64::NAN;
    let mut max = f64::NAN;
    let mut out_of_range = 0;
    for &p in probabilities {
        // f64::min/max skip NaN operands
        min = min.min(p);
        max = max.max(p);
        if !(0.0..=1.0).contains(&p) {
            out_of_range += 1;
        }
    }
    if out_of_range == 0 {
        return Ok(());
    }
    let err = ProbabilityRangeError {
        min,
        max,
        out_of_range,
        total: probabilities.len(),
    };
    warn!(%err, "probability contract violated");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_closed_unit_interval() {
        assert!(validate_probabilities(&[0.0, 0.25, 1.0]).is_ok());
        assert!(validate_probabilities(&[]).is_ok());
    }

    #[test]
    fn test_reports_observed_extremes() {
        let err = validate_probabilities(&[0.5, 1.2, -0.1, 0.3]).unwrap_err();
        assert!((err.min - -0.1).abs() < f64::EPSILON);
        assert!((err.max - 1.2).abs() < f64::EPSILON);
        assert_eq!(err.out_of_range, 2);
        assert_eq!(err.total, 4);
        assert_eq!(
            err.to_string(),
            "2 of 4 probabilities outside [0, 1] (observed min -0.1, max 1.2)"
        );
    }

    #[test]
    fn test_nan_is_out_of_range() {
        let err = validate_probabilities(&[0.5, f64::NAN]).unwrap_err();
        assert_eq!(err.out_of_range, 1);
        assert!((err.min - 0.5).abs() < f64::EPSILON);
    }
}
