//! Warehouse builder: events -> session facts -> daily rollups
//!
//! Sessionizes raw telemetry into one `SessionObservation` per
//! (user, session) with funnel flags and purchase revenue, rolls sessions up
//! per day, experiment and variant, and runs the data-quality checks that gate every
//! downstream readout.

use crate::observation::{Event, EventType, SessionObservation, Variant};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group events into session facts
///
/// Sessions are keyed by (user_id, session_id). Events missing either
/// identifier cannot be attributed and are skipped; the data-quality checks
/// report them. Output is ordered by session start time.
pub fn build_sessions(events: &[Event]) -> Vec<SessionObservation> {
    struct Acc {
        start: NaiveDateTime,
        experiment_id: String,
        variant: Variant,
        is_experiment_period: bool,
        has_impression: bool,
        has_click: bool,
        has_add_to_cart: bool,
        has_purchase: bool,
        revenue: f64,
    }

    let mut sessions: BTreeMap<(u64, String), Acc> = BTreeMap::new();
    let mut skipped = 0usize;

    for event in events {
        let (Some(user_id), Some(session_id)) = (event.user_id, event.session_id.as_ref()) else {
            skipped += 1;
            continue;
        };

        let acc = sessions
            .entry((user_id, session_id.clone()))
            .or_insert_with(|| Acc {
                start: event.event_time,
                experiment_id: event.experiment_id.clone(),
                variant: event.variant,
                is_experiment_period: false,
                has_impression: false,
                has_click: false,
                has_add_to_cart: false,
                has_purchase: false,
                revenue: 0.0,
            });

        acc.start = acc.start.min(event.event_time);
        acc.is_experiment_period |= event.is_experiment_period;
        match event.kind() {
            Some(EventType::Impression) => acc.has_impression = true,
            Some(EventType::Click) => acc.has_click = true,
            Some(EventType::AddToCart) => acc.has_add_to_cart = true,
            Some(EventType::Purchase) => {
                acc.has_purchase = true;
                acc.revenue += event.revenue;
            }
            None => {}
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "events without user_id/session_id were not sessionized");
    }

    let mut out: Vec<(NaiveDateTime, SessionObservation)> = sessions
        .into_iter()
        .map(|((user_id, session_id), acc)| {
            (
                acc.start,
                SessionObservation {
                    user_id,
                    session_id,
                    experiment_id: acc.experiment_id,
                    variant: acc.variant,
                    event_date: Some(acc.start.date()),
                    is_experiment_period: acc.is_experiment_period,
                    has_impression: acc.has_impression,
                    has_click: acc.has_click,
                    has_add_to_cart: acc.has_add_to_cart,
                    has_purchase: acc.has_purchase,
                    revenue: acc.revenue,
                },
            )
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out.into_iter().map(|(_, s)| s).collect()
}

/// Per-day, per-experiment, per-variant funnel rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub event_date: NaiveDate,
    pub experiment_id: String,
    pub variant: Variant,
    pub is_experiment_period: bool,
    pub sessions: u64,
    pub sessions_with_impression: u64,
    pub sessions_with_click: u64,
    pub sessions_with_add_to_cart: u64,
    pub sessions_with_purchase: u64,
    pub revenue: f64,
    pub ctr: f64,
    pub atc_rate: f64,
    pub purchase_rate_given_atc: f64,
    pub purchase_rate_per_session: f64,
    pub revenue_per_session: f64,
}

/// Roll sessions up by (event_date, experiment_id, variant)
///
/// Rates with an empty denominator are reported as 0. Sessions without an
/// event date are skipped.
pub fn daily_metrics(sessions: &[SessionObservation]) -> Vec<DailyMetrics> {
    let mut groups: BTreeMap<(NaiveDate, &str, Variant), Vec<&SessionObservation>> = BTreeMap::new();
    for s in sessions {
        if let Some(date) = s.event_date {
            groups
                .entry((date, s.experiment_id.as_str(), s.variant))
                .or_default()
                .push(s);
        }
    }

    groups
        .into_iter()
        .map(|((event_date, experiment_id, variant), rows)| {
            let count = |f: fn(&SessionObservation) -> bool| {
                rows.iter().filter(|r| f(**r)).count() as u64
            };
            let n = rows.len() as u64;
            let imp = count(|r| r.has_impression);
            let clk = count(|r| r.has_click);
            let atc = count(|r| r.has_add_to_cart);
            let buy = count(|r| r.has_purchase);
            let revenue: f64 = rows.iter().map(|r| r.revenue).sum();

            DailyMetrics {
                event_date,
                experiment_id: experiment_id.to_string(),
                variant,
                is_experiment_period: rows.iter().any(|r| r.is_experiment_period),
                sessions: n,
                sessions_with_impression: imp,
                sessions_with_click: clk,
                sessions_with_add_to_cart: atc,
                sessions_with_purchase: buy,
                revenue,
                ctr: safe_ratio(clk as f64, imp),
                atc_rate: safe_ratio(atc as f64, clk),
                purchase_rate_given_atc: safe_ratio(buy as f64, atc),
                purchase_rate_per_session: safe_ratio(buy as f64, n),
                revenue_per_session: safe_ratio(revenue, n),
            }
        })
        .collect()
}

fn safe_ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// One data-quality check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqCheck {
    pub check_name: String,
    pub observed: u64,
    pub threshold: u64,
    pub pass: bool,
}

impl DqCheck {
    fn at_least(name: &str, observed: u64, threshold: u64) -> Self {
        Self {
            check_name: name.to_string(),
            observed,
            threshold,
            pass: observed >= threshold,
        }
    }

    fn at_most(name: &str, observed: u64, threshold: u64) -> Self {
        Self {
            check_name: name.to_string(),
            observed,
            threshold,
            pass: observed <= threshold,
        }
    }
}

/// Run the data-quality checks, ordered by check name
pub fn dq_checks(events: &[Event], users: usize) -> Vec<DqCheck> {
    let missing_users = events.iter().filter(|e| e.user_id.is_none()).count() as u64;
    let missing_sessions = events
        .iter()
        .filter(|e| e.session_id.as_deref().map_or(true, str::is_empty))
        .count() as u64;
    let invalid_types = events.iter().filter(|e| e.kind().is_none()).count() as u64;

    let mut checks = vec![
        DqCheck::at_least("events_nonempty", events.len() as u64, 1),
        DqCheck::at_least("users_nonempty", users as u64, 1),
        DqCheck::at_most("no_empty_user_ids", missing_users, 0),
        DqCheck::at_most("no_empty_session_ids", missing_sessions, 0),
        DqCheck::at_most("valid_event_types", invalid_types, 0),
    ];
    checks.sort_by(|a, b| a.check_name.cmp(&b.check_name));

    for check in checks.iter().filter(|c| !c.pass) {
        tracing::warn!(check = %check.check_name, observed = check.observed, "data-quality check failed");
    }
    checks
}

/// Whether every check passed
pub fn all_passed(checks: &[DqCheck]) -> bool {
    checks.iter().all(|c| c.pass)
}
