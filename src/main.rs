use anyhow::{bail, Context, Result};
use clap::Parser;
use launchlens::cli::{Cli, Command, DataArgs, OutputFormat};
use launchlens::config::LaunchLensConfig;
use launchlens::experiment::{run_cuped_readout, Readout};
use launchlens::report::{self, ExperimentReport};
use launchlens::simulate::{simulate, SimulationConfig};
use launchlens::store::{ExperimentStore, JsonlStore, DAILY_METRICS_FILE, DQ_CHECKS_FILE};
use launchlens::{monitoring, warehouse, LaunchLensError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load the optional config file, overlay flags and validate
fn resolve_config(path: Option<&Path>, args: &DataArgs) -> Result<LaunchLensConfig> {
    let mut config = match path {
        Some(path) => LaunchLensConfig::from_file(path)?,
        None => LaunchLensConfig::default(),
    };
    args.apply(&mut config);
    config.validate().map_err(LaunchLensError::InvalidConfig)?;
    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fail with the no-data error when the experiment has no experiment-period sessions
fn require_sessions(store: &JsonlStore, config: &LaunchLensConfig) -> Result<()> {
    if store.experiment_sessions(&config.experiment_id)?.is_empty() {
        return Err(LaunchLensError::NoData {
            context: format!("experiment '{}'", config.experiment_id),
        }
        .into());
    }
    Ok(())
}

fn run_warehouse(args: &DataArgs) -> Result<()> {
    let store = JsonlStore::open(&args.data)?;
    let events = store.events().context("Failed to load raw events")?;
    let users = store.all_users().context("Failed to load users")?;

    let checks = warehouse::dq_checks(&events, users.len());
    store.write_table(DQ_CHECKS_FILE, &checks)?;

    let sessions = warehouse::build_sessions(&events);
    let daily = warehouse::daily_metrics(&sessions);
    let passed = warehouse::all_passed(&checks);
    if passed {
        store.write_sessions(&sessions)?;
        store.write_table(DAILY_METRICS_FILE, &daily)?;
    }

    match args.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "dq_checks": checks,
            "sessions": sessions.len(),
            "daily_metrics": daily.len(),
        }))?,
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = checks
                .iter()
                .map(|c| {
                    vec![
                        c.check_name.clone(),
                        c.observed.to_string(),
                        c.threshold.to_string(),
                        if c.pass { "PASS" } else { "FAIL" }.to_string(),
                    ]
                })
                .collect();
            println!("Data-quality checks");
            print!(
                "{}",
                report::text_table(&["check_name", "observed", "threshold", "pass"], &rows)
            );
            println!();
            println!("sessions: {}", sessions.len());
            println!("daily metric rows: {}", daily.len());
        }
    }

    if !passed {
        bail!("data-quality checks failed; warehouse tables were not written");
    }
    Ok(())
}

fn run_readout(config_path: Option<&Path>, args: &DataArgs) -> Result<()> {
    let config = resolve_config(config_path, args)?;
    let store = JsonlStore::open(&args.data)?;
    let table = Readout::new(config.confidence_level).run_for(&store, &config.experiment_id)?;

    match args.format {
        OutputFormat::Json => print_json(&table)?,
        OutputFormat::Text => {
            println!("LaunchLens A/B Readout: {}\n", config.experiment_id);
            print!("{}", report::readout_text(&table));
            println!();
            for line in report::metric_definitions(&table) {
                println!("{}", line.replace('`', ""));
            }
        }
    }
    Ok(())
}

fn run_monitor(config_path: Option<&Path>, args: &DataArgs) -> Result<()> {
    let config = resolve_config(config_path, args)?;
    let store = JsonlStore::open(&args.data)?;
    require_sessions(&store, &config)?;

    let sessions = store.experiment_sessions(&config.experiment_id)?;
    let users = store.users(&config.experiment_id)?;
    let srm = monitoring::srm_report(&users, &sessions, config.expected_treatment_share)?;
    let guardrails = monitoring::guardrails(&sessions);

    match args.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "srm": srm,
            "guardrails": guardrails,
        }))?,
        OutputFormat::Text => print!(
            "{}",
            report::monitoring_text(&srm, &guardrails, config.srm_alpha)
        ),
    }
    Ok(())
}

fn run_cuped(config_path: Option<&Path>, args: &DataArgs) -> Result<()> {
    let config = resolve_config(config_path, args)?;
    let store = JsonlStore::open(&args.data)?;

    let users = store.users(&config.experiment_id)?;
    let sessions = store.experiment_sessions(&config.experiment_id)?;
    let units = monitoring::cuped_units(&users, &sessions);
    if units.is_empty() {
        return Err(LaunchLensError::NoData {
            context: format!("no users with sessions for experiment '{}'", config.experiment_id),
        }
        .into());
    }
    let cuped = run_cuped_readout(&units, config.confidence_level)?;

    match args.format {
        OutputFormat::Json => print_json(&cuped)?,
        OutputFormat::Text => print!("{}", report::cuped_text(&cuped, config.confidence_level)),
    }
    Ok(())
}

fn run_report(config_path: Option<&Path>, args: &DataArgs, out: &Path) -> Result<()> {
    let config = resolve_config(config_path, args)?;
    let store = JsonlStore::open(&args.data)?;
    let built = ExperimentReport::build(&store, &config)?;

    let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let markdown = built.to_markdown(&generated_at, &store.root().display().to_string());

    fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let path: PathBuf = out.join(format!("{}_report.md", config.experiment_id));
    fs::write(&path, markdown).with_context(|| format!("Failed to write {}", path.display()))?;

    match args.format {
        OutputFormat::Json => print_json(&built)?,
        OutputFormat::Text => {
            println!("Recommendation: {}", built.assessment.decision);
            println!("Report written: {}", path.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let config_path = cli.config.as_deref();

    match &cli.command {
        Command::Warehouse(args) => run_warehouse(args),
        Command::Readout(args) => run_readout(config_path, args),
        Command::Monitor(args) => run_monitor(config_path, args),
        Command::Cuped(args) => run_cuped(config_path, args),
        Command::Report { data, out } => run_report(config_path, data, out),
        Command::Simulate {
            out,
            experiment_id,
            users,
            treatment_share,
            lift,
            seed,
        } => {
            let sim_config = SimulationConfig {
                experiment_id: experiment_id.clone(),
                users: *users,
                treatment_share: *treatment_share,
                treatment_purchase_lift: *lift,
                seed: *seed,
                ..SimulationConfig::default()
            };
            let sim = simulate(&sim_config);
            sim.write_to(out)?;
            println!(
                "Simulated {} users, {} events into {}",
                sim.users.len(),
                sim.events.len(),
                out.display()
            );
            Ok(())
        }
    }
}
