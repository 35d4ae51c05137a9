//! Synthetic checkout experiment
//!
//! Generates randomized users and their funnel events over a pre-period and
//! an experiment period. Each user carries a latent value that drives both
//! pre-period and experiment-period spend, so the pre-period revenue works
//! as a CUPED covariate. Output is deterministic for a given seed.

use crate::config::DEFAULT_EXPERIMENT_ID;
use crate::error::Result;
use crate::observation::{Event, EventType, SessionObservation, UserObservation, Variant};
use crate::store::{write_jsonl, EVENTS_FILE, SESSIONS_FILE, USERS_FILE};
use crate::warehouse::build_sessions;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Generator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub experiment_id: String,
    pub users: usize,
    pub treatment_share: f64,
    pub start_date: NaiveDate,
    pub pre_period_days: u32,
    pub experiment_days: u32,
    /// Expected sessions per user per day
    pub sessions_per_day: f64,
    pub impression_rate: f64,
    pub click_rate: f64,
    pub add_to_cart_rate: f64,
    pub purchase_rate: f64,
    /// Relative lift on the purchase step for treatment during the experiment
    pub treatment_purchase_lift: f64,
    pub mean_order_value: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
            users: 2_000,
            treatment_share: 0.5,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            pre_period_days: 14,
            experiment_days: 14,
            sessions_per_day: 0.3,
            impression_rate: 0.9,
            click_rate: 0.35,
            add_to_cart_rate: 0.4,
            purchase_rate: 0.5,
            treatment_purchase_lift: 0.1,
            mean_order_value: 45.0,
            seed: 42,
        }
    }
}

/// Generated rows, ready to be written as a data directory
#[derive(Debug, Clone)]
pub struct SimulatedExperiment {
    pub users: Vec<UserObservation>,
    pub events: Vec<Event>,
}

impl SimulatedExperiment {
    pub fn sessions(&self) -> Vec<SessionObservation> {
        build_sessions(&self.events)
    }

    /// Write `users.jsonl`, `events.jsonl` and the sessionized `sessions.jsonl`
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        write_jsonl(&dir.join(USERS_FILE), &self.users)?;
        write_jsonl(&dir.join(EVENTS_FILE), &self.events)?;
        write_jsonl(&dir.join(SESSIONS_FILE), &self.sessions())?;
        tracing::info!(
            dir = %dir.display(),
            users = self.users.len(),
            events = self.events.len(),
            "wrote simulated experiment"
        );
        Ok(())
    }
}

/// Generate a synthetic experiment
pub fn simulate(config: &SimulationConfig) -> SimulatedExperiment {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut users = Vec::with_capacity(config.users);
    let mut events = Vec::new();
    let total_days = config.pre_period_days + config.experiment_days;
    let mut item_id = 0u64;

    for idx in 0..config.users {
        let user_id = idx as u64 + 1;
        let variant = if rng.gen_bool(config.treatment_share.clamp(0.0, 1.0)) {
            Variant::Treatment
        } else {
            Variant::Control
        };
        // latent propensity in [0.5, 1.5)
        let value = 0.5 + rng.gen::<f64>();
        let mut pre_revenue = 0.0;
        let mut session_no = 0u32;

        for day in 0..total_days {
            let in_experiment = day >= config.pre_period_days;
            if !rng.gen_bool((config.sessions_per_day * value).clamp(0.0, 1.0)) {
                continue;
            }
            session_no += 1;

            let date = config.start_date + Duration::days(i64::from(day));
            let mut at = date.and_hms_opt(0, 0, 0).unwrap_or_default()
                + Duration::seconds(rng.gen_range(0..80_000));
            let session_id = format!("u{}-s{}", user_id, session_no);

            let lift = if in_experiment && variant == Variant::Treatment {
                1.0 + config.treatment_purchase_lift
            } else {
                1.0
            };
            let stages = [
                (EventType::Impression, config.impression_rate),
                (EventType::Click, config.click_rate * value),
                (EventType::AddToCart, config.add_to_cart_rate),
                (EventType::Purchase, config.purchase_rate * lift),
            ];

            for (kind, p) in stages {
                if !rng.gen_bool(p.clamp(0.0, 1.0)) {
                    break;
                }
                item_id += 1;
                let revenue = if kind == EventType::Purchase {
                    let order = config.mean_order_value * value * rng.gen_range(0.6..1.4);
                    (order * 100.0).round() / 100.0
                } else {
                    0.0
                };
                if !in_experiment {
                    pre_revenue += revenue;
                }
                events.push(event(
                    config, user_id, &session_id, kind, at, item_id, variant, in_experiment, revenue,
                ));
                at += Duration::seconds(rng.gen_range(5..300));
            }
        }

        users.push(UserObservation {
            user_id,
            experiment_id: config.experiment_id.clone(),
            variant,
            pre_revenue,
        });
    }

    events.sort_by(|a, b| a.event_time.cmp(&b.event_time));
    SimulatedExperiment { users, events }
}

#[allow(clippy::too_many_arguments)]
fn event(
    config: &SimulationConfig,
    user_id: u64,
    session_id: &str,
    kind: EventType,
    at: NaiveDateTime,
    item_id: u64,
    variant: Variant,
    is_experiment_period: bool,
    revenue: f64,
) -> Event {
    Event {
        event_time: at,
        user_id: Some(user_id),
        session_id: Some(session_id.to_string()),
        event_type: kind.as_str().to_string(),
        item_id: Some(item_id),
        experiment_id: config.experiment_id.clone(),
        variant,
        is_experiment_period,
        revenue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{all_passed, dq_checks};

    fn small() -> SimulationConfig {
        SimulationConfig {
            users: 300,
            seed: 7,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let a = simulate(&small());
        let b = simulate(&small());
        assert_eq!(a.users, b.users);
        assert_eq!(a.events, b.events);
    }

    #[test]
    fn test_simulation_passes_dq_checks() {
        let sim = simulate(&small());
        assert_eq!(sim.users.len(), 300);
        assert!(!sim.events.is_empty());
        assert!(all_passed(&dq_checks(&sim.events, sim.users.len())));
    }

    #[test]
    fn test_simulation_funnel_is_nested() {
        let sessions = simulate(&small()).sessions();
        assert!(sessions.iter().any(|s| s.is_experiment_period));
        assert!(sessions.iter().any(|s| !s.is_experiment_period));
        for s in &sessions {
            assert!(!s.has_click || s.has_impression);
            assert!(!s.has_add_to_cart || s.has_click);
            assert!(!s.has_purchase || s.has_add_to_cart);
            assert_eq!(s.revenue > 0.0, s.has_purchase);
        }
    }

    #[test]
    fn test_write_to_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let sim = simulate(&small());
        sim.write_to(dir.path()).unwrap();
        for file in [USERS_FILE, EVENTS_FILE, SESSIONS_FILE] {
            assert!(dir.path().join(file).is_file(), "missing {}", file);
        }
    }
}
