// Welch two-sample comparison for continuous metrics
//
// Unequal variances are assumed. Degrees of freedom come from the
// Welch-Satterthwaite approximation, and the same df drives both the
// confidence interval and the p-value so the readout and CUPED paths share
// one algorithm.

use crate::error::Result;
use crate::experiment::statistics::{
    mean, sample_variance, t_critical, t_two_sided_pvalue, DEFAULT_CONFIDENCE,
};
use serde::{Deserialize, Serialize};

/// Result of comparing `mean(b) - mean(a)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanComparison {
    pub diff: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub p_value: f64,
    /// Welch-Satterthwaite degrees of freedom (0 when no test was run)
    pub df: f64,
}

impl MeanComparison {
    fn insufficient_data() -> Self {
        Self {
            diff: 0.0,
            ci_low: 0.0,
            ci_high: 0.0,
            p_value: 1.0,
            df: 0.0,
        }
    }
}

/// Welch-Satterthwaite degrees of freedom
///
/// Falls back to the pooled `na + nb - 2` when the denominator vanishes.
pub fn welch_satterthwaite_df(va: f64, na: usize, vb: f64, nb: usize) -> f64 {
    let (naf, nbf) = (na as f64, nb as f64);
    let numerator = (va / naf + vb / nbf).powi(2);
    let denominator =
        va.powi(2) / (naf.powi(2) * (naf - 1.0)) + vb.powi(2) / (nbf.powi(2) * (nbf - 1.0));
    if denominator > 0.0 {
        numerator / denominator
    } else {
        naf + nbf - 2.0
    }
}

/// Compare two samples with a 95% Welch interval
///
/// # Example
/// ```
/// use launchlens::experiment::welch::compare_means;
///
/// let control = [10.0, 12.0, 11.0, 13.0, 10.0];
/// let treatment = [25.0, 27.0, 26.0, 28.0, 25.0];
/// let cmp = compare_means(&control, &treatment).unwrap();
/// assert!(cmp.diff > 0.0);
/// assert!(cmp.p_value < 0.05);
/// ```
pub fn compare_means(sample_a: &[f64], sample_b: &[f64]) -> Result<MeanComparison> {
    compare_means_with_confidence(sample_a, sample_b, DEFAULT_CONFIDENCE)
}

/// Compare two samples at an arbitrary two-sided confidence level
pub fn compare_means_with_confidence(
    sample_a: &[f64],
    sample_b: &[f64],
    confidence: f64,
) -> Result<MeanComparison> {
    let (na, nb) = (sample_a.len(), sample_b.len());
    if na < 2 || nb < 2 {
        tracing::debug!(na, nb, "fewer than 2 observations in an arm, skipping Welch test");
        return Ok(MeanComparison::insufficient_data());
    }

    let diff = mean(sample_b) - mean(sample_a);
    let va = sample_variance(sample_a);
    let vb = sample_variance(sample_b);
    let se = (va / na as f64 + vb / nb as f64).sqrt();

    if se == 0.0 {
        return Ok(MeanComparison {
            diff,
            ci_low: diff,
            ci_high: diff,
            p_value: 1.0,
            df: (na + nb - 2) as f64,
        });
    }

    let df = welch_satterthwaite_df(va, na, vb, nb);
    let t_crit = t_critical(df, confidence)?;
    let p_value = t_two_sided_pvalue(diff / se, df)?;

    Ok(MeanComparison {
        diff,
        ci_low: diff - t_crit * se,
        ci_high: diff + t_crit * se,
        p_value,
        df,
    })
}
