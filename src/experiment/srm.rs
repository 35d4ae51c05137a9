// Sample Ratio Mismatch (SRM) detection
//
// Chi-square goodness-of-fit (1 degree of freedom) of the observed
// [control, treatment] allocation against the split the experiment was
// configured with. A tiny p-value means randomization or logging is broken
// and every downstream readout is suspect.

use crate::error::{LaunchLensError, Result};
use crate::experiment::statistics::chi_square_sf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conventional alpha for flagging SRM
pub const DEFAULT_SRM_ALPHA: f64 = 0.01;

/// Unit at which allocation counts were taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrmLevel {
    /// Plain counts with no declared unit
    Count,
    /// Randomized users (the primary SRM check)
    User,
    /// Sessions, diagnostic only: activity differences can skew them
    Session,
}

impl fmt::Display for SrmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SrmLevel::Count => "count",
            SrmLevel::User => "user",
            SrmLevel::Session => "session",
        };
        f.write_str(name)
    }
}

/// Outcome of one SRM chi-square test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrmResult {
    pub level: SrmLevel,
    pub n_control: u64,
    pub n_treatment: u64,
    pub expected_treatment_share: f64,
    pub chi_square_statistic: f64,
    pub p_value: f64,
}

impl SrmResult {
    /// Whether the allocation is flagged as mismatched at `alpha`
    pub fn is_mismatch(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }

    /// Observed share of units in treatment
    pub fn observed_treatment_share(&self) -> f64 {
        let total = self.n_control + self.n_treatment;
        if total == 0 {
            return 0.0;
        }
        self.n_treatment as f64 / total as f64
    }
}

/// Run the SRM check on raw counts
///
/// # Example
/// ```
/// use launchlens::experiment::srm;
///
/// let result = srm::check(6000, 4000, 0.5).unwrap();
/// assert!((result.chi_square_statistic - 400.0).abs() < 1e-9);
/// assert!(result.is_mismatch(0.01));
/// ```
pub fn check(n_control: u64, n_treatment: u64, expected_treatment_share: f64) -> Result<SrmResult> {
    check_at_level(SrmLevel::Count, n_control, n_treatment, expected_treatment_share)
}

/// Run the SRM check and tag the result with the unit the counts describe
pub fn check_at_level(
    level: SrmLevel,
    n_control: u64,
    n_treatment: u64,
    expected_treatment_share: f64,
) -> Result<SrmResult> {
    if !(expected_treatment_share > 0.0 && expected_treatment_share < 1.0) {
        return Err(LaunchLensError::InvalidShare(expected_treatment_share));
    }

    let total = n_control + n_treatment;
    if total == 0 {
        return Err(LaunchLensError::EmptyAllocation);
    }

    let total = total as f64;
    let expected = [
        total * (1.0 - expected_treatment_share),
        total * expected_treatment_share,
    ];
    let observed = [n_control as f64, n_treatment as f64];

    let chi_square_statistic: f64 = observed
        .iter()
        .zip(expected.iter())
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum();
    let p_value = chi_square_sf(chi_square_statistic, 1.0)?;

    tracing::debug!(
        %level,
        n_control,
        n_treatment,
        chi_square_statistic,
        p_value,
        "SRM check"
    );

    Ok(SrmResult {
        level,
        n_control,
        n_treatment,
        expected_treatment_share,
        chi_square_statistic,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_split_passes() {
        let result = check(5000, 5000, 0.5).unwrap();
        assert!(result.chi_square_statistic.abs() < 1e-12);
        assert!((result.p_value - 1.0).abs() < 1e-9);
        assert!(!result.is_mismatch(DEFAULT_SRM_ALPHA));
    }

    #[test]
    fn test_severe_imbalance_flagged() {
        let result = check(6000, 4000, 0.5).unwrap();
        assert!((result.chi_square_statistic - 400.0).abs() < 1e-9);
        assert!(result.p_value < 1e-10, "p={}", result.p_value);
        assert!(result.is_mismatch(DEFAULT_SRM_ALPHA));
    }

    #[test]
    fn test_unequal_expected_split() {
        // 30/70 design observed exactly
        let result = check(3000, 7000, 0.7).unwrap();
        assert!(result.chi_square_statistic.abs() < 1e-9);
        assert!((result.observed_treatment_share() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_mild_noise_not_flagged() {
        let result = check(5040, 4960, 0.5).unwrap();
        // (40^2/5000)*2 = 0.64
        assert!((result.chi_square_statistic - 0.64).abs() < 1e-9);
        assert!(result.p_value > 0.4);
        assert!(!result.is_mismatch(DEFAULT_SRM_ALPHA));
    }

    #[test]
    fn test_empty_allocation_rejected() {
        assert!(matches!(
            check(0, 0, 0.5),
            Err(LaunchLensError::EmptyAllocation)
        ));
    }

    #[test]
    fn test_invalid_share_rejected() {
        assert!(matches!(check(10, 10, 0.0), Err(LaunchLensError::InvalidShare(_))));
        assert!(matches!(check(10, 10, 1.0), Err(LaunchLensError::InvalidShare(_))));
        assert!(check(10, 10, f64::NAN).is_err());
    }

    #[test]
    fn test_level_is_recorded() {
        let result = check_at_level(SrmLevel::User, 100, 100, 0.5).unwrap();
        assert_eq!(result.level, SrmLevel::User);
        assert_eq!(result.level.to_string(), "user");
    }
}
