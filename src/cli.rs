//! CLI argument parsing for LaunchLens

use crate::config::LaunchLensConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables (default)
    Text,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "launchlens")]
#[command(version)]
#[command(about = "A/B test readouts over product telemetry", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// TOML configuration file (flags override its values)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command that reads a data directory
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Data directory holding sessions.jsonl, users.jsonl and events.jsonl
    #[arg(long, default_value = "data", value_name = "DIR")]
    pub data: PathBuf,

    /// Experiment to analyze [default: exp_checkout_v1]
    #[arg(long = "experiment-id", value_name = "ID")]
    pub experiment_id: Option<String>,

    /// Designed treatment allocation used by the SRM check [default: 0.5]
    #[arg(long = "expected-treatment-share", value_name = "SHARE")]
    pub expected_treatment_share: Option<f64>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl DataArgs {
    /// Overlay explicit flags on a loaded configuration
    pub fn apply(&self, config: &mut LaunchLensConfig) {
        if let Some(id) = &self.experiment_id {
            config.experiment_id = id.clone();
        }
        if let Some(share) = self.expected_treatment_share {
            config.expected_treatment_share = share;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sessionize events.jsonl, roll up daily metrics and run data-quality checks
    Warehouse(DataArgs),

    /// A/B readout for every tracked metric
    Readout(DataArgs),

    /// SRM at user and session level plus guardrail metrics
    Monitor(DataArgs),

    /// CUPED-adjusted revenue readout at user level
    Cuped(DataArgs),

    /// Write the markdown experiment report
    Report {
        #[command(flatten)]
        data: DataArgs,

        /// Directory the report is written to
        #[arg(long, default_value = "artifacts/reports", value_name = "DIR")]
        out: PathBuf,
    },

    /// Generate a synthetic experiment into a data directory
    Simulate {
        /// Output data directory
        #[arg(long, default_value = "data", value_name = "DIR")]
        out: PathBuf,

        #[arg(long = "experiment-id", default_value = crate::config::DEFAULT_EXPERIMENT_ID)]
        experiment_id: String,

        /// Number of randomized users
        #[arg(long, default_value = "2000")]
        users: usize,

        /// Probability a user is assigned to treatment
        #[arg(long = "treatment-share", default_value = "0.5")]
        treatment_share: f64,

        /// Relative purchase-step lift for treatment
        #[arg(long, default_value = "0.1")]
        lift: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}
