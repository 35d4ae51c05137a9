// Two-sample proportion comparison (z-test)
//
// The interval and the p-value use different standard errors:
// - CI: unpooled SE
// - p-value: pooled SE under H0: p1 == p2
//
// An empty arm resolves to zeros with p = 1.0.

use crate::error::Result;
use crate::experiment::statistics::{normal_two_sided_pvalue, z_critical, DEFAULT_CONFIDENCE};
use serde::{Deserialize, Serialize};

/// Result of comparing a control rate `x1/n1` with a treatment rate `x2/n2`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionComparison {
    /// Control success rate
    pub p1: f64,
    /// Treatment success rate
    pub p2: f64,
    /// p2 - p1
    pub diff: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub p_value: f64,
}

impl ProportionComparison {
    /// Neutral result for arms without any units
    pub fn no_signal() -> Self {
        Self {
            p1: 0.0,
            p2: 0.0,
            diff: 0.0,
            ci_low: 0.0,
            ci_high: 0.0,
            p_value: 1.0,
        }
    }

    /// diff / p1, undefined when the control rate is not positive
    pub fn relative_difference(&self) -> Option<f64> {
        (self.p1 > 0.0).then(|| self.diff / self.p1)
    }
}

/// Compare two proportions with a 95% confidence interval
///
/// # Example
/// ```
/// use launchlens::experiment::proportion::compare_proportions;
///
/// let cmp = compare_proportions(100, 1000, 120, 1000).unwrap();
/// assert!((cmp.diff - 0.02).abs() < 1e-12);
/// assert!(cmp.p_value > 0.05); // not significant
/// ```
pub fn compare_proportions(x1: u64, n1: u64, x2: u64, n2: u64) -> Result<ProportionComparison> {
    compare_proportions_with_confidence(x1, n1, x2, n2, DEFAULT_CONFIDENCE)
}

/// Compare two proportions at an arbitrary two-sided confidence level
pub fn compare_proportions_with_confidence(
    x1: u64,
    n1: u64,
    x2: u64,
    n2: u64,
    confidence: f64,
) -> Result<ProportionComparison> {
    if n1 == 0 || n2 == 0 {
        tracing::debug!(n1, n2, "empty arm in proportion comparison, returning no-signal result");
        return Ok(ProportionComparison::no_signal());
    }

    let (x1f, n1f, x2f, n2f) = (x1 as f64, n1 as f64, x2 as f64, n2 as f64);
    let p1 = x1f / n1f;
    let p2 = x2f / n2f;
    let diff = p2 - p1;

    let se_ci = (p1 * (1.0 - p1) / n1f + p2 * (1.0 - p2) / n2f).sqrt();
    let z = z_critical(confidence)?;
    let ci_low = diff - z * se_ci;
    let ci_high = diff + z * se_ci;

    let p_pool = (x1f + x2f) / (n1f + n2f);
    let se_pooled = (p_pool * (1.0 - p_pool) * (1.0 / n1f + 1.0 / n2f)).sqrt();
    let p_value = if se_pooled == 0.0 {
        1.0
    } else {
        normal_two_sided_pvalue(diff / se_pooled)?
    };

    Ok(ProportionComparison {
        p1,
        p2,
        diff,
        ci_low,
        ci_high,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_arms_empty() {
        let cmp = compare_proportions(0, 0, 0, 0).unwrap();
        assert_eq!(cmp, ProportionComparison::no_signal());
        assert_eq!(cmp.p_value, 1.0);
    }

    #[test]
    fn test_one_arm_empty() {
        let cmp = compare_proportions(5, 10, 0, 0).unwrap();
        assert_eq!(cmp, ProportionComparison::no_signal());
    }

    #[test]
    fn test_no_successes_anywhere() {
        let cmp = compare_proportions(0, 500, 0, 700).unwrap();
        assert_eq!(cmp.diff, 0.0);
        assert_eq!(cmp.p_value, 1.0);
        assert_eq!(cmp.ci_low, 0.0);
        assert_eq!(cmp.ci_high, 0.0);
    }

    #[test]
    fn test_all_successes_everywhere() {
        // p_pool = 1 also collapses the pooled SE
        let cmp = compare_proportions(40, 40, 60, 60).unwrap();
        assert_eq!(cmp.diff, 0.0);
        assert_eq!(cmp.p_value, 1.0);
    }

    #[test]
    fn test_reference_scenario() {
        let cmp = compare_proportions(100, 1000, 120, 1000).unwrap();
        assert!((cmp.p1 - 0.10).abs() < 1e-12);
        assert!((cmp.p2 - 0.12).abs() < 1e-12);
        assert!((cmp.diff - 0.02).abs() < 1e-12);

        // pooled SE sqrt(0.11*0.89*0.002) ~= 0.013993, z ~= 1.4293
        assert!((cmp.p_value - 0.153).abs() < 0.002, "p={}", cmp.p_value);

        // unpooled SE sqrt(0.09/1000 + 0.1056/1000) ~= 0.013985
        let se_ci = (0.1 * 0.9 / 1000.0 + 0.12 * 0.88 / 1000.0_f64).sqrt();
        let half_width = cmp.ci_high - cmp.diff;
        assert!((half_width - 1.959_964 * se_ci).abs() < 1e-6);
        assert!(cmp.ci_low < 0.0 && cmp.ci_high > 0.0);
    }

    #[test]
    fn test_ci_uses_unpooled_se() {
        // Very unequal rates make the two SEs diverge noticeably
        let cmp = compare_proportions(10, 1000, 300, 1000).unwrap();
        let se_unpooled = (0.01 * 0.99 / 1000.0 + 0.3 * 0.7 / 1000.0_f64).sqrt();
        let half_width = (cmp.ci_high - cmp.ci_low) / 2.0;
        assert!((half_width - 1.959_964 * se_unpooled).abs() < 1e-6);
        assert!(cmp.p_value < 1e-10);
    }

    #[test]
    fn test_negative_effect() {
        let cmp = compare_proportions(200, 1000, 150, 1000).unwrap();
        assert!(cmp.diff < 0.0);
        assert!(cmp.ci_high < 0.0);
        assert!(cmp.p_value < 0.01);
    }

    #[test]
    fn test_relative_difference() {
        let cmp = compare_proportions(100, 1000, 120, 1000).unwrap();
        assert!((cmp.relative_difference().unwrap() - 0.2).abs() < 1e-9);

        let zero_control = compare_proportions(0, 1000, 10, 1000).unwrap();
        assert_eq!(zero_control.relative_difference(), None);
    }

    #[test]
    fn test_wider_interval_at_higher_confidence() {
        let c95 = compare_proportions_with_confidence(100, 1000, 120, 1000, 0.95).unwrap();
        let c99 = compare_proportions_with_confidence(100, 1000, 120, 1000, 0.99).unwrap();
        assert!(c99.ci_high - c99.ci_low > c95.ci_high - c95.ci_low);
        assert_eq!(c95.p_value, c99.p_value);
    }
}
