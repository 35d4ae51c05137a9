//! LaunchLens - A/B test readouts over product telemetry
//!
//! This library turns session- and user-level experiment observations into
//! control-vs-treatment estimates: sample-ratio-mismatch checks, two-proportion
//! z-tests for funnel rates, Welch t-tests for revenue, and CUPED variance
//! reduction using a pre-period covariate.

pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod monitoring;
pub mod observation;
pub mod report;
pub mod simulate;
pub mod store;
pub mod warehouse;

pub use error::{LaunchLensError, Result};
