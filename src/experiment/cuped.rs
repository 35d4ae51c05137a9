// CUPED: Controlled-experiment Using Pre-Experiment Data
//
// Adjusts an outcome Y with a pre-period covariate X:
//   Y* = Y - theta * (X - mean(X)),  theta = cov(Y, X) / var(X)
//
// theta is estimated on the pooled population (both arms), so the
// adjustment leaves the expected treatment effect unchanged while removing
// the variance X explains. The adjusted arms then go through the same Welch
// comparison as the raw ones.

use crate::error::{LaunchLensError, Result};
use crate::experiment::statistics::{mean, sample_covariance, sample_variance};
use crate::experiment::welch::{compare_means_with_confidence, MeanComparison};
use crate::observation::Variant;
use serde::{Deserialize, Serialize};

/// Output of the covariate adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CupedAdjustment {
    pub theta: f64,
    pub y_adjusted: Vec<f64>,
    /// 1 - var(Y*) / var(Y); never exceeds 1, 0 when nothing was adjusted
    pub variance_reduction: f64,
}

/// Adjust `y` using the paired covariate `x`
///
/// # Example
/// ```
/// use launchlens::experiment::cuped::cuped_adjust;
///
/// let y = [1.0, 2.0, 3.0];
/// let x = [4.0, 4.0, 4.0]; // no information in x
/// let adj = cuped_adjust(&y, &x).unwrap();
/// assert_eq!(adj.theta, 0.0);
/// assert_eq!(adj.y_adjusted, y.to_vec());
/// ```
pub fn cuped_adjust(y: &[f64], x: &[f64]) -> Result<CupedAdjustment> {
    if y.len() != x.len() {
        return Err(LaunchLensError::LengthMismatch {
            y: y.len(),
            x: x.len(),
        });
    }

    let var_x = sample_variance(x);
    let theta = if var_x > 0.0 {
        sample_covariance(y, x) / var_x
    } else {
        0.0
    };

    if theta == 0.0 {
        return Ok(CupedAdjustment {
            theta,
            y_adjusted: y.to_vec(),
            variance_reduction: 0.0,
        });
    }

    let x_mean = mean(x);
    let y_adjusted: Vec<f64> = y
        .iter()
        .zip(x)
        .map(|(yi, xi)| yi - theta * (xi - x_mean))
        .collect();

    let var_y = sample_variance(y);
    let variance_reduction = if var_y > 0.0 {
        (1.0 - sample_variance(&y_adjusted) / var_y).min(1.0)
    } else {
        0.0
    };

    Ok(CupedAdjustment {
        theta,
        y_adjusted,
        variance_reduction,
    })
}

/// One analysis unit for the CUPED readout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CupedUnit {
    pub variant: Variant,
    /// Outcome during the experiment period
    pub outcome: f64,
    /// Pre-period covariate
    pub covariate: f64,
}

/// Raw-vs-adjusted comparison for one arm pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CupedArmSummary {
    pub control_mean: f64,
    pub treatment_mean: f64,
    pub comparison: MeanComparison,
}

/// Full CUPED readout: theta, variance reduction, raw and adjusted tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CupedReadout {
    pub units: usize,
    pub theta: f64,
    pub variance_reduction: f64,
    pub raw: CupedArmSummary,
    pub adjusted: CupedArmSummary,
}

/// Estimate theta on all units, then compare raw and adjusted outcomes
pub fn run_cuped_readout(units: &[CupedUnit], confidence: f64) -> Result<CupedReadout> {
    let y: Vec<f64> = units.iter().map(|u| u.outcome).collect();
    let x: Vec<f64> = units.iter().map(|u| u.covariate).collect();
    let adjustment = cuped_adjust(&y, &x)?;

    let raw = summarize_arms(units, &y, confidence)?;
    let adjusted = summarize_arms(units, &adjustment.y_adjusted, confidence)?;

    tracing::info!(
        units = units.len(),
        theta = adjustment.theta,
        variance_reduction = adjustment.variance_reduction,
        "CUPED adjustment computed"
    );

    Ok(CupedReadout {
        units: units.len(),
        theta: adjustment.theta,
        variance_reduction: adjustment.variance_reduction,
        raw,
        adjusted,
    })
}

fn summarize_arms(units: &[CupedUnit], values: &[f64], confidence: f64) -> Result<CupedArmSummary> {
    let split = |arm: Variant| -> Vec<f64> {
        units
            .iter()
            .zip(values)
            .filter(|(u, _)| u.variant == arm)
            .map(|(_, v)| *v)
            .collect()
    };
    let control = split(Variant::Control);
    let treatment = split(Variant::Treatment);

    Ok(CupedArmSummary {
        control_mean: mean(&control),
        treatment_mean: mean(&treatment),
        comparison: compare_means_with_confidence(&control, &treatment, confidence)?,
    })
}
