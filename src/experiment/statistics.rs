// Distribution and moment helpers shared by the comparators
//
// Wraps statrs so every comparator draws quantiles, CDFs and sample moments
// from one place:
// - Sample variance and covariance use the unbiased (n-1) divisor
// - Two-sided p-values are 2 * (1 - CDF(|statistic|))
// - Chi-square p-values use the survival function for precision deep in the
//   tail (SRM statistics in the hundreds)

use crate::error::{LaunchLensError, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};
use statrs::statistics::Statistics;

/// Default two-sided confidence level for intervals (95%)
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Arithmetic mean; 0.0 for an empty sample
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

/// Unbiased sample variance (divisor n-1); 0.0 with fewer than 2 values
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.variance()
}

/// Unbiased sample covariance of paired samples (divisor n-1)
///
/// Callers must pass equal-length slices.
pub fn sample_covariance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.len() < 2 {
        return 0.0;
    }
    a.covariance(b)
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| LaunchLensError::Distribution(e.to_string()))
}

/// Two-sided critical value of the standard normal (1.95996... at 95%)
pub fn z_critical(confidence: f64) -> Result<f64> {
    let normal = standard_normal()?;
    Ok(normal.inverse_cdf(upper_quantile(confidence)))
}

/// Two-sided critical value of Student's t with `df` degrees of freedom
pub fn t_critical(df: f64, confidence: f64) -> Result<f64> {
    let t_dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| LaunchLensError::Distribution(format!("Student-t(df={}): {}", df, e)))?;
    Ok(t_dist.inverse_cdf(upper_quantile(confidence)))
}

/// Two-sided p-value for a standard normal test statistic
pub fn normal_two_sided_pvalue(z: f64) -> Result<f64> {
    let normal = standard_normal()?;
    Ok(2.0 * (1.0 - normal.cdf(z.abs())))
}

/// Two-sided p-value for a Student-t test statistic
pub fn t_two_sided_pvalue(t: f64, df: f64) -> Result<f64> {
    let t_dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| LaunchLensError::Distribution(format!("Student-t(df={}): {}", df, e)))?;
    Ok((2.0 * t_dist.sf(t.abs())).min(1.0))
}

/// Upper-tail probability of a chi-square statistic
pub fn chi_square_sf(statistic: f64, df: f64) -> Result<f64> {
    let chi2 = ChiSquared::new(df)
        .map_err(|e| LaunchLensError::Distribution(format!("chi-square(df={}): {}", df, e)))?;
    Ok(chi2.sf(statistic))
}

fn upper_quantile(confidence: f64) -> f64 {
    1.0 - (1.0 - confidence) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn test_sample_variance_unbiased() {
        // mean=5, sum of squares=20, n-1=3
        let var = sample_variance(&[2.0, 4.0, 6.0, 8.0]);
        assert!((var - 20.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_variance_single_value() {
        assert_eq!(sample_variance(&[42.0]), 0.0);
    }

    #[test]
    fn test_sample_covariance_perfectly_correlated() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        let cov = sample_covariance(&y, &x);
        assert!((cov - 2.0 * sample_variance(&x)).abs() < 1e-12);
    }

    #[test]
    fn test_z_critical_95() {
        let z = z_critical(0.95).unwrap();
        assert!((z - 1.959_963_985).abs() < 1e-6, "z={}", z);
    }

    #[test]
    fn test_t_critical_approaches_normal() {
        let t_small = t_critical(5.0, 0.95).unwrap();
        let t_large = t_critical(100_000.0, 0.95).unwrap();
        assert!((t_small - 2.570_582).abs() < 1e-4, "t={}", t_small);
        assert!((t_large - 1.96).abs() < 1e-3);
    }

    #[test]
    fn test_normal_pvalue_at_zero_is_one() {
        assert!((normal_two_sided_pvalue(0.0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_t_pvalue_symmetric() {
        let p_pos = t_two_sided_pvalue(2.0, 10.0).unwrap();
        let p_neg = t_two_sided_pvalue(-2.0, 10.0).unwrap();
        assert!((p_pos - p_neg).abs() < 1e-12);
        assert!((p_pos - 0.073_388).abs() < 1e-4, "p={}", p_pos);
    }

    #[test]
    fn test_t_critical_rejects_nonpositive_df() {
        assert!(t_critical(0.0, 0.95).is_err());
    }

    #[test]
    fn test_chi_square_sf() {
        // 3.841 is the 95th percentile of chi-square(1)
        let p = chi_square_sf(3.841_458_82, 1.0).unwrap();
        assert!((p - 0.05).abs() < 1e-6);
    }
}
