// Readout orchestration: one MetricResult per registered metric
//
// Splits session observations by arm, dispatches every metric in the
// registry to its comparator and returns the results sorted by metric name.
// An empty observation set is an error (nothing can be computed); empty
// funnel stages inside a non-empty set are ordinary no-signal results.

use crate::error::{LaunchLensError, Result};
use crate::experiment::metrics::{MetricKind, MetricKindTag, MetricSpec, METRICS};
use crate::experiment::proportion::compare_proportions_with_confidence;
use crate::experiment::statistics::{mean, DEFAULT_CONFIDENCE};
use crate::experiment::welch::compare_means_with_confidence;
use crate::observation::{SessionObservation, Variant};
use crate::store::ExperimentStore;
use serde::{Deserialize, Serialize};

/// Control-vs-treatment estimate for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_name: String,
    pub kind: MetricKindTag,
    pub control_estimate: f64,
    pub treatment_estimate: f64,
    pub absolute_difference: f64,
    /// `None` when the control estimate is not positive
    pub relative_difference: Option<f64>,
    pub ci_low: f64,
    pub ci_high: f64,
    pub p_value: f64,
}

impl MetricResult {
    /// Significant at `alpha` (two-sided)
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Results for every tracked metric, ordered by metric name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadoutTable {
    results: Vec<MetricResult>,
}

impl ReadoutTable {
    fn new(mut results: Vec<MetricResult>) -> Self {
        results.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
        Self { results }
    }

    pub fn get(&self, metric_name: &str) -> Option<&MetricResult> {
        self.results.iter().find(|r| r.metric_name == metric_name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_vec(self) -> Vec<MetricResult> {
        self.results
    }
}

impl<'a> IntoIterator for &'a ReadoutTable {
    type Item = &'a MetricResult;
    type IntoIter = std::slice::Iter<'a, MetricResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Readout runner over a metric registry
#[derive(Debug, Clone)]
pub struct Readout {
    confidence: f64,
    metrics: &'static [MetricSpec],
}

impl Default for Readout {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            metrics: &METRICS,
        }
    }
}

impl Readout {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            ..Self::default()
        }
    }

    /// Compute the readout over already-filtered session observations
    pub fn run(&self, observations: &[SessionObservation]) -> Result<ReadoutTable> {
        if observations.is_empty() {
            return Err(LaunchLensError::NoData {
                context: "empty observation set".to_string(),
            });
        }
        self.compute(observations)
    }

    /// Fetch experiment-period sessions from `store` and compute the readout
    pub fn run_for(&self, store: &dyn ExperimentStore, experiment_id: &str) -> Result<ReadoutTable> {
        let observations = store.experiment_sessions(experiment_id)?;
        if observations.is_empty() {
            return Err(LaunchLensError::NoData {
                context: format!("experiment '{}'", experiment_id),
            });
        }
        tracing::info!(
            experiment_id,
            sessions = observations.len(),
            "running A/B readout"
        );
        self.compute(&observations)
    }

    fn compute(&self, observations: &[SessionObservation]) -> Result<ReadoutTable> {
        let (control, treatment): (Vec<&SessionObservation>, Vec<&SessionObservation>) =
            observations
                .iter()
                .partition(|row| row.variant == Variant::Control);

        tracing::debug!(
            control = control.len(),
            treatment = treatment.len(),
            "split observations by variant"
        );

        let results = self
            .metrics
            .iter()
            .map(|spec| self.evaluate(spec, &control, &treatment))
            .collect::<Result<Vec<_>>>()?;

        Ok(ReadoutTable::new(results))
    }

    fn evaluate(
        &self,
        spec: &MetricSpec,
        control: &[&SessionObservation],
        treatment: &[&SessionObservation],
    ) -> Result<MetricResult> {
        match spec.kind {
            MetricKind::Proportion {
                numerator,
                denominator,
            } => {
                let x1 = numerator.count(control.iter().copied());
                let n1 = denominator.count(control.iter().copied());
                let x2 = numerator.count(treatment.iter().copied());
                let n2 = denominator.count(treatment.iter().copied());
                let cmp = compare_proportions_with_confidence(x1, n1, x2, n2, self.confidence)?;

                Ok(MetricResult {
                    metric_name: spec.name.to_string(),
                    kind: MetricKindTag::Proportion,
                    control_estimate: cmp.p1,
                    treatment_estimate: cmp.p2,
                    absolute_difference: cmp.diff,
                    relative_difference: cmp.relative_difference(),
                    ci_low: cmp.ci_low,
                    ci_high: cmp.ci_high,
                    p_value: cmp.p_value,
                })
            }
            MetricKind::Continuous { value } => {
                let a: Vec<f64> = control.iter().map(|row| value.value(row)).collect();
                let b: Vec<f64> = treatment.iter().map(|row| value.value(row)).collect();
                let cmp = compare_means_with_confidence(&a, &b, self.confidence)?;
                let control_estimate = mean(&a);

                Ok(MetricResult {
                    metric_name: spec.name.to_string(),
                    kind: MetricKindTag::Continuous,
                    control_estimate,
                    treatment_estimate: mean(&b),
                    absolute_difference: cmp.diff,
                    relative_difference: (control_estimate > 0.0)
                        .then(|| cmp.diff / control_estimate),
                    ci_low: cmp.ci_low,
                    ci_high: cmp.ci_high,
                    p_value: cmp.p_value,
                })
            }
        }
    }
}

/// Compute the default 95% readout over session observations
///
/// # Example
/// ```
/// use launchlens::experiment::readout::run_readout;
/// use launchlens::LaunchLensError;
///
/// let err = run_readout(&[]).unwrap_err();
/// assert!(matches!(err, LaunchLensError::NoData { .. }));
/// ```
pub fn run_readout(observations: &[SessionObservation]) -> Result<ReadoutTable> {
    Readout::default().run(observations)
}
