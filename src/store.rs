//! Data-access capability for experiment observations
//!
//! The readout never opens files or connections itself; callers hand it an
//! `ExperimentStore`. `JsonlStore` reads a directory of newline-delimited
//! JSON exports, `MemoryStore` holds rows already in memory.
//!
//! # Directory layout
//!
//! ```text
//! data/
//!   sessions.jsonl   # one SessionObservation per line
//!   users.jsonl      # one UserObservation per line
//!   events.jsonl     # raw events (optional, input to the warehouse builder)
//!   daily_metrics.jsonl, dq_checks.jsonl   # written by the warehouse builder
//! ```

use crate::error::{LaunchLensError, Result};
use crate::observation::{Event, SessionObservation, UserObservation};
use crate::warehouse::{self, DailyMetrics};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SESSIONS_FILE: &str = "sessions.jsonl";
pub const USERS_FILE: &str = "users.jsonl";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const DAILY_METRICS_FILE: &str = "daily_metrics.jsonl";
pub const DQ_CHECKS_FILE: &str = "dq_checks.jsonl";

/// Source of per-unit observations for one experiment
pub trait ExperimentStore {
    /// All sessions of the experiment, pre-period included
    fn sessions(&self, experiment_id: &str) -> Result<Vec<SessionObservation>>;

    /// Randomized users of the experiment
    fn users(&self, experiment_id: &str) -> Result<Vec<UserObservation>>;

    /// Sessions inside the experiment period (the readout population)
    fn experiment_sessions(&self, experiment_id: &str) -> Result<Vec<SessionObservation>> {
        Ok(self
            .sessions(experiment_id)?
            .into_iter()
            .filter(|s| s.is_experiment_period)
            .collect())
    }

    /// Per-day, per-variant rollup of all sessions of the experiment
    fn daily_metrics(&self, experiment_id: &str) -> Result<Vec<DailyMetrics>> {
        Ok(warehouse::daily_metrics(&self.sessions(experiment_id)?))
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Vec<SessionObservation>,
    users: Vec<UserObservation>,
}

impl MemoryStore {
    pub fn new(sessions: Vec<SessionObservation>, users: Vec<UserObservation>) -> Self {
        Self { sessions, users }
    }
}

impl ExperimentStore for MemoryStore {
    fn sessions(&self, experiment_id: &str) -> Result<Vec<SessionObservation>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.experiment_id == experiment_id)
            .cloned()
            .collect())
    }

    fn users(&self, experiment_id: &str) -> Result<Vec<UserObservation>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.experiment_id == experiment_id)
            .cloned()
            .collect())
    }
}

/// Store backed by a directory of `.jsonl` files
#[derive(Debug, Clone)]
pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(LaunchLensError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data directory not found: {}", root.display()),
            )));
        }
        Ok(Self { root })
    }

    /// Directory the store reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw events for the warehouse builder (all experiments)
    pub fn events(&self) -> Result<Vec<Event>> {
        read_jsonl(&self.root.join(EVENTS_FILE))
    }

    /// Users of every experiment in the directory
    pub fn all_users(&self) -> Result<Vec<UserObservation>> {
        read_jsonl(&self.root.join(USERS_FILE))
    }

    /// Overwrite `sessions.jsonl` with warehouse output
    pub fn write_sessions(&self, sessions: &[SessionObservation]) -> Result<()> {
        self.write_table(SESSIONS_FILE, sessions)
    }

    /// Overwrite one table file inside the directory
    pub fn write_table<T: Serialize>(&self, file_name: &str, rows: &[T]) -> Result<()> {
        write_jsonl(&self.root.join(file_name), rows)
    }
}

impl ExperimentStore for JsonlStore {
    fn sessions(&self, experiment_id: &str) -> Result<Vec<SessionObservation>> {
        let rows: Vec<SessionObservation> = read_jsonl(&self.root.join(SESSIONS_FILE))?;
        let total = rows.len();
        let rows: Vec<_> = rows
            .into_iter()
            .filter(|s| s.experiment_id == experiment_id)
            .collect();
        tracing::debug!(total, matched = rows.len(), experiment_id, "loaded sessions");
        Ok(rows)
    }

    fn users(&self, experiment_id: &str) -> Result<Vec<UserObservation>> {
        let rows: Vec<UserObservation> = read_jsonl(&self.root.join(USERS_FILE))?;
        Ok(rows
            .into_iter()
            .filter(|u| u.experiment_id == experiment_id)
            .collect())
    }
}

/// Read one JSON value per non-blank line
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| {
        LaunchLensError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|source| LaunchLensError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write one JSON value per line, replacing the file
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut out, row).map_err(|source| LaunchLensError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Variant;
    use std::fs;
    use tempfile::TempDir;

    fn session(experiment_id: &str, in_period: bool) -> SessionObservation {
        SessionObservation {
            user_id: 1,
            session_id: "s1".to_string(),
            experiment_id: experiment_id.to_string(),
            variant: Variant::Control,
            event_date: None,
            is_experiment_period: in_period,
            has_impression: true,
            has_click: false,
            has_add_to_cart: false,
            has_purchase: false,
            revenue: 0.0,
        }
    }

    #[test]
    fn test_memory_store_filters_experiment_and_period() {
        let store = MemoryStore::new(
            vec![
                session("exp_a", true),
                session("exp_a", false),
                session("exp_b", true),
            ],
            vec![],
        );
        assert_eq!(store.sessions("exp_a").unwrap().len(), 2);
        assert_eq!(store.experiment_sessions("exp_a").unwrap().len(), 1);
        assert!(store.experiment_sessions("missing").unwrap().is_empty());
        // no event dates, nothing to roll up
        assert!(store.daily_metrics("exp_a").unwrap().is_empty());
    }

    #[test]
    fn test_jsonl_round_trip_through_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store
            .write_sessions(&[session("exp_a", true), session("exp_b", true)])
            .unwrap();

        let loaded = store.sessions("exp_a").unwrap();
        assert_eq!(loaded, vec![session("exp_a", true)]);
        assert_eq!(store.root(), dir.path());
        assert!(store.root().join(SESSIONS_FILE).is_file());
    }

    #[test]
    fn test_parse_error_reports_line() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(USERS_FILE),
            "{\"user_id\":1,\"experiment_id\":\"e\",\"variant\":\"control\",\"pre_rev\":1.0}\n\n{not json}\n",
        )
        .unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();

        match store.users("e") {
            Err(LaunchLensError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    struct Unwritable;

    impl Serialize for Unwritable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("row cannot be encoded"))
        }
    }

    #[test]
    fn test_write_failure_is_not_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DQ_CHECKS_FILE);

        let err = write_jsonl(&path, &[Unwritable]).unwrap_err();
        assert!(matches!(err, LaunchLensError::Serialize { .. }));
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to write"));
        assert!(msg.contains("row cannot be encoded"));
    }

    #[test]
    fn test_missing_directory() {
        assert!(JsonlStore::open("/definitely/not/here").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert!(matches!(store.users("e"), Err(LaunchLensError::Io(_))));
    }
}
