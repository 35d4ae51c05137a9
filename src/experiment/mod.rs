// Statistical inference core for A/B readouts
//
// Turns per-unit observations into control-vs-treatment effect estimates
// with confidence intervals and p-values:
// - SRM chi-square check of the observed allocation
// - Two-proportion z-test (unpooled CI, pooled p-value) for funnel rates
// - Welch t-test with Welch-Satterthwaite df for continuous metrics
// - CUPED covariate adjustment feeding the same Welch comparison
// - A declarative metric registry walked by the readout orchestrator
//
// Every function here is a pure function of in-memory inputs. Degenerate
// inputs (an empty arm, zero variance) resolve to neutral results with
// p = 1.0; only an entirely empty observation set is an error.
//
// Implementation:
// - Uses statrs (crates.io) for normal, Student-t and chi-square
//   distributions and for unbiased sample moments

pub mod cuped;
pub mod decision;
pub mod metrics;
pub mod proportion;
pub mod readout;
pub mod srm;
pub mod statistics;
pub mod welch;

pub use cuped::{cuped_adjust, run_cuped_readout, CupedAdjustment, CupedReadout, CupedUnit};
pub use decision::{assess_decision, Decision, DecisionAssessment};
pub use metrics::{MetricKind, MetricKindTag, MetricSpec, METRICS, PRIMARY_METRIC};
pub use proportion::{compare_proportions, ProportionComparison};
pub use readout::{run_readout, MetricResult, Readout, ReadoutTable};
pub use srm::{SrmLevel, SrmResult};
pub use welch::{compare_means, MeanComparison};
