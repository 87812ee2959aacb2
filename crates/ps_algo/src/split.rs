//! Proportional splits by weight (C1/C2 shares).
//!
//! Contract:
//! - `percent_i = round3(w_i × 100 / Σw)`; areas are `round2(percent_i × amount / 100)`.
//! - Rounding residue is left in place; callers that need exact sums run
//!   the surplus engine afterwards.
//! - A zero (or non-finite) weight sum is reported, never divided by.

use ps_core::rounding::{round_area, round_pct};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitError {
    /// Σ weights is zero, so no share is defined.
    ZeroBasis,
    /// A weight or the amount is NaN/∞.
    NonFinite,
}

impl core::fmt::Display for SplitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SplitError::ZeroBasis => write!(f, "weights sum to zero"),
            SplitError::NonFinite => write!(f, "non-finite weight or amount"),
        }
    }
}

impl std::error::Error for SplitError {}

/// One member's share: percentage (3 dp) and the matching area (2 dp).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Share {
    pub percent: f64,
    pub area: f64,
}

/// Percentage share of each weight in the total.
pub fn percent_shares(weights: &[f64]) -> Result<Vec<f64>, SplitError> {
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(SplitError::NonFinite);
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Err(SplitError::ZeroBasis);
    }
    Ok(weights.iter().map(|w| round_pct(w * 100.0 / total)).collect())
}

/// Split `amount` by weight.
pub fn proportional_split(weights: &[f64], amount: f64) -> Result<Vec<Share>, SplitError> {
    if !amount.is_finite() {
        return Err(SplitError::NonFinite);
    }
    let percents = percent_shares(weights)?;
    Ok(percents
        .into_iter()
        .map(|percent| Share { percent, area: round_area(percent * amount / 100.0) })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_follow_weights() {
        let s = percent_shares(&[40.0, 35.0, 25.0]).unwrap();
        assert_eq!(s, vec![40.0, 35.0, 25.0]);
    }

    #[test]
    fn thirds_leave_a_residue() {
        let s = percent_shares(&[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(s, vec![33.333, 33.333, 33.333]);
    }

    #[test]
    fn special_common_area_split() {
        let shares = proportional_split(&[60.0, 40.0], 100.0).unwrap();
        assert_eq!(
            shares,
            vec![Share { percent: 60.0, area: 60.0 }, Share { percent: 40.0, area: 40.0 }]
        );
    }

    #[test]
    fn zero_and_non_finite_inputs() {
        assert_eq!(percent_shares(&[0.0, 0.0]), Err(SplitError::ZeroBasis));
        assert_eq!(percent_shares(&[]), Err(SplitError::ZeroBasis));
        assert_eq!(percent_shares(&[f64::NAN, 1.0]), Err(SplitError::NonFinite));
        assert_eq!(proportional_split(&[1.0], f64::INFINITY), Err(SplitError::NonFinite));
    }
}
