//! Shared division policy for shares and year-over-year change.
//!
//! Every percentage in a report goes through these helpers so that an
//! empty county-year or a new entrant is treated identically everywhere.

use crate::models::PctChange;

/// Share of `part` in `whole` as a fraction in [0, 1].
///
/// An empty whole yields 0 rather than NaN.
pub fn share(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64).clamp(0.0, 1.0)
}

/// Relative change from `prior` to `current`.
///
/// - prior > 0: `(current - prior) / prior`
/// - prior = 0, current > 0: new entrant (undefined, never infinite)
/// - both 0: no change
pub fn pct_change(prior: u64, current: u64) -> PctChange {
    match (prior, current) {
        (0, 0) => PctChange::Change(0.0),
        (0, _) => PctChange::NewEntrant,
        (p, c) => PctChange::Change((c as f64 - p as f64) / p as f64),
    }
}

/// Fraction to a 0-100 percentage rounded to two decimals.
pub fn to_percent(fraction: f64) -> f64 {
    (fraction * 10_000.0).round() / 100.0
}

/// Signed gap between two shares, in percentage points.
pub fn percentage_points(share: f64, baseline: f64) -> f64 {
    to_percent(share - baseline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_of_empty_whole() {
        assert_eq!(share(0, 0), 0.0);
        assert_eq!(share(3, 0), 0.0);
    }

    #[test]
    fn test_share_is_bounded() {
        assert_eq!(share(10, 15), 10.0 / 15.0);
        assert_eq!(share(20, 10), 1.0);
        assert!((0.0..=1.0).contains(&share(1, 3)));
    }

    #[test]
    fn test_pct_change_policy() {
        assert_eq!(pct_change(8, 0), PctChange::Change(-1.0));
        assert_eq!(pct_change(4, 5), PctChange::Change(0.25));
        assert_eq!(pct_change(0, 3), PctChange::NewEntrant);
        assert_eq!(pct_change(0, 0), PctChange::Change(0.0));
    }

    #[test]
    fn test_to_percent_rounding() {
        assert_eq!(to_percent(10.0 / 15.0), 66.67);
        assert_eq!(to_percent(0.0), 0.0);
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(percentage_points(0.5, 0.25), 25.0);
    }
}
