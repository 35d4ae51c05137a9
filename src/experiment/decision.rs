// Ship/hold decision for the primary metric
//
// Reads raw floats straight from the MetricResult. Ship only when the
// primary metric moved up and the two-sided p-value clears alpha; every
// other outcome, including a significant drop, is Hold.

use crate::error::{LaunchLensError, Result};
use crate::experiment::readout::{MetricResult, ReadoutTable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final recommendation for the experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Ship,
    Hold,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Ship => f.write_str("Ship"),
            Decision::Hold => f.write_str("Hold / Continue Experiment"),
        }
    }
}

/// Decision together with the evidence it was made from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAssessment {
    pub decision: Decision,
    pub alpha: f64,
    pub primary: MetricResult,
    pub reason: String,
}

/// Decide ship/hold from the readout's primary metric
pub fn assess_decision(
    table: &ReadoutTable,
    primary_metric: &str,
    alpha: f64,
) -> Result<DecisionAssessment> {
    let primary = table
        .get(primary_metric)
        .ok_or_else(|| LaunchLensError::UnknownMetric(primary_metric.to_string()))?
        .clone();

    let significant = primary.is_significant(alpha);
    let improved = primary.absolute_difference > 0.0;

    let (decision, reason) = match (significant, improved) {
        (true, true) => (
            Decision::Ship,
            format!("{} improved with p={:.4} < {}", primary_metric, primary.p_value, alpha),
        ),
        (true, false) => (
            Decision::Hold,
            format!(
                "{} moved the wrong way (p={:.4}); do not ship",
                primary_metric, primary.p_value
            ),
        ),
        (false, _) => (
            Decision::Hold,
            format!(
                "{} not significant (p={:.4} >= {})",
                primary_metric, primary.p_value, alpha
            ),
        ),
    };

    tracing::info!(%decision, p_value = primary.p_value, "decision assessed");

    Ok(DecisionAssessment {
        decision,
        alpha,
        primary,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::metrics::PRIMARY_METRIC;
    use crate::experiment::readout::run_readout;
    use crate::observation::{SessionObservation, Variant};

    fn arm(variant: Variant, sessions: usize, purchases: usize) -> Vec<SessionObservation> {
        (0..sessions)
            .map(|i| SessionObservation {
                user_id: i as u64,
                session_id: format!("{}-{}", variant, i),
                experiment_id: "exp".to_string(),
                variant,
                event_date: None,
                is_experiment_period: true,
                has_impression: true,
                has_click: i < purchases * 2,
                has_add_to_cart: i < purchases,
                has_purchase: i < purchases,
                revenue: if i < purchases { 25.0 } else { 0.0 },
            })
            .collect()
    }

    #[test]
    fn test_hold_when_not_significant() {
        let mut rows = arm(Variant::Control, 1000, 100);
        rows.extend(arm(Variant::Treatment, 1000, 120));
        let table = run_readout(&rows).unwrap();

        let assessment = assess_decision(&table, PRIMARY_METRIC, 0.05).unwrap();
        assert_eq!(assessment.decision, Decision::Hold);
        assert!(assessment.reason.contains("not significant"));
    }

    #[test]
    fn test_ship_when_significant_lift() {
        let mut rows = arm(Variant::Control, 2000, 200);
        rows.extend(arm(Variant::Treatment, 2000, 300));
        let table = run_readout(&rows).unwrap();

        let assessment = assess_decision(&table, PRIMARY_METRIC, 0.05).unwrap();
        assert_eq!(assessment.decision, Decision::Ship);
        assert!(assessment.primary.absolute_difference > 0.0);
    }

    #[test]
    fn test_hold_when_significant_drop() {
        let mut rows = arm(Variant::Control, 2000, 300);
        rows.extend(arm(Variant::Treatment, 2000, 200));
        let table = run_readout(&rows).unwrap();

        let assessment = assess_decision(&table, PRIMARY_METRIC, 0.05).unwrap();
        assert_eq!(assessment.decision, Decision::Hold);
        assert!(assessment.reason.contains("wrong way"));
    }

    #[test]
    fn test_unknown_primary_metric() {
        let mut rows = arm(Variant::Control, 10, 1);
        rows.extend(arm(Variant::Treatment, 10, 1));
        let table = run_readout(&rows).unwrap();

        let err = assess_decision(&table, "bounce_rate", 0.05).unwrap_err();
        assert!(matches!(err, LaunchLensError::UnknownMetric(_)));
    }
}
