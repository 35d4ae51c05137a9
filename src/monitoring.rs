//! Experiment monitoring: SRM at user and session level, guardrail rollups,
//! daily trend summary, and the user-level CUPED dataset

use crate::error::Result;
use crate::experiment::cuped::CupedUnit;
use crate::experiment::srm::{check_at_level, SrmLevel, SrmResult};
use crate::observation::{SessionObservation, UserObservation, Variant};
use crate::warehouse::DailyMetrics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// SRM checks for one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrmReport {
    /// Primary check on randomized users; `None` when no users are known
    pub user: Option<SrmResult>,
    /// Diagnostic check on experiment-period sessions
    pub session: Option<SrmResult>,
}

impl SrmReport {
    /// Whether the primary (user-level) check flags a mismatch
    pub fn user_mismatch(&self, alpha: f64) -> bool {
        self.user.as_ref().is_some_and(|r| r.is_mismatch(alpha))
    }
}

fn arm_counts<T>(rows: &[T], variant_of: impl Fn(&T) -> Variant) -> (u64, u64) {
    rows.iter().fold((0, 0), |(c, t), row| match variant_of(row) {
        Variant::Control => (c + 1, t),
        Variant::Treatment => (c, t + 1),
    })
}

/// Run SRM on users (primary) and experiment-period sessions (diagnostic)
///
/// A level with no units at all is reported as `None` rather than failing
/// the whole monitoring run.
pub fn srm_report(
    users: &[UserObservation],
    experiment_sessions: &[SessionObservation],
    expected_treatment_share: f64,
) -> Result<SrmReport> {
    let run = |level: SrmLevel, (c, t): (u64, u64)| -> Result<Option<SrmResult>> {
        if c + t == 0 {
            tracing::warn!(%level, "no units available for SRM check");
            return Ok(None);
        }
        check_at_level(level, c, t, expected_treatment_share).map(Some)
    };

    Ok(SrmReport {
        user: run(SrmLevel::User, arm_counts(users, |u| u.variant))?,
        session: run(SrmLevel::Session, arm_counts(experiment_sessions, |s| s.variant))?,
    })
}

/// Guardrail rollup for one variant over the experiment period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailRow {
    pub variant: Variant,
    pub sessions: u64,
    pub impression_rate: f64,
    pub click_rate: f64,
    pub atc_rate_per_session: f64,
    pub purchase_rate_per_session: f64,
    pub revenue_per_session: f64,
    /// Clicks among impression sessions
    pub ctr: Option<f64>,
    /// Add-to-carts among click sessions
    pub atc_rate_given_click: Option<f64>,
}

/// Compute guardrails per variant present in the data, control first
pub fn guardrails(experiment_sessions: &[SessionObservation]) -> Vec<GuardrailRow> {
    Variant::ALL
        .iter()
        .filter_map(|&variant| {
            let rows: Vec<&SessionObservation> = experiment_sessions
                .iter()
                .filter(|s| s.variant == variant)
                .collect();
            if rows.is_empty() {
                return None;
            }

            let n = rows.len() as f64;
            let count = |f: fn(&SessionObservation) -> bool| {
                rows.iter().filter(|r| f(**r)).count() as f64
            };
            let impressions = count(|r| r.has_impression);
            let clicks = count(|r| r.has_click);
            let carts = count(|r| r.has_add_to_cart);
            let purchases = count(|r| r.has_purchase);
            let revenue: f64 = rows.iter().map(|r| r.revenue).sum();

            Some(GuardrailRow {
                variant,
                sessions: rows.len() as u64,
                impression_rate: impressions / n,
                click_rate: clicks / n,
                atc_rate_per_session: carts / n,
                purchase_rate_per_session: purchases / n,
                revenue_per_session: revenue / n,
                ctr: (impressions > 0.0).then(|| clicks / impressions),
                atc_rate_given_click: (clicks > 0.0).then(|| carts / clicks),
            })
        })
        .collect()
}

/// Average primary rate per variant over the trailing window of days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub window_days: u32,
    pub control_avg: f64,
    pub treatment_avg: f64,
}

impl TrendSummary {
    pub fn delta(&self) -> f64 {
        self.treatment_avg - self.control_avg
    }
}

/// Summarize the last `window_days` days of purchase rate per session
///
/// Returns `None` when there is no daily data or one of the arms has no
/// days inside the window.
pub fn trend_summary(daily: &[DailyMetrics], window_days: u32) -> Option<TrendSummary> {
    let last = daily.iter().map(|d| d.event_date).max()?;
    let first = last - chrono::Duration::days(i64::from(window_days.saturating_sub(1)));

    let avg = |variant: Variant| -> Option<f64> {
        let rates: Vec<f64> = daily
            .iter()
            .filter(|d| d.variant == variant && d.event_date >= first)
            .map(|d| d.purchase_rate_per_session)
            .collect();
        (!rates.is_empty()).then(|| rates.iter().sum::<f64>() / rates.len() as f64)
    };

    Some(TrendSummary {
        window_days,
        control_avg: avg(Variant::Control)?,
        treatment_avg: avg(Variant::Treatment)?,
    })
}

/// Build the user-level CUPED dataset
///
/// One unit per user with at least one experiment-period session: the
/// outcome is that user's session revenue summed, the variant is taken from
/// the sessions, and the covariate is the user's pre-period revenue. Users
/// without sessions, or sessions whose user is unknown, are left out.
pub fn cuped_units(users: &[UserObservation], experiment_sessions: &[SessionObservation]) -> Vec<CupedUnit> {
    let mut by_user: BTreeMap<u64, (Variant, f64)> = BTreeMap::new();
    for s in experiment_sessions {
        by_user.entry(s.user_id).or_insert((s.variant, 0.0)).1 += s.revenue;
    }

    let pre_revenue: HashMap<u64, f64> = users.iter().map(|u| (u.user_id, u.pre_revenue)).collect();
    let units: Vec<CupedUnit> = by_user
        .into_iter()
        .filter_map(|(user_id, (variant, outcome))| {
            pre_revenue.get(&user_id).map(|&covariate| CupedUnit {
                variant,
                outcome,
                covariate,
            })
        })
        .collect();

    tracing::debug!(
        units = units.len(),
        users = users.len(),
        "built CUPED units from users with experiment-period sessions"
    );
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn user(id: u64, variant: Variant, pre: f64) -> UserObservation {
        UserObservation {
            user_id: id,
            experiment_id: "exp".to_string(),
            variant,
            pre_revenue: pre,
        }
    }

    fn session(user_id: u64, variant: Variant, imp: bool, clk: bool, buy: bool, rev: f64) -> SessionObservation {
        SessionObservation {
            user_id,
            session_id: format!("s{}", user_id),
            experiment_id: "exp".to_string(),
            variant,
            event_date: None,
            is_experiment_period: true,
            has_impression: imp,
            has_click: clk,
            has_add_to_cart: buy,
            has_purchase: buy,
            revenue: rev,
        }
    }

    fn day(d: u32, variant: Variant, rate: f64) -> DailyMetrics {
        DailyMetrics {
            event_date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            experiment_id: "exp".to_string(),
            variant,
            is_experiment_period: true,
            sessions: 100,
            sessions_with_impression: 0,
            sessions_with_click: 0,
            sessions_with_add_to_cart: 0,
            sessions_with_purchase: 0,
            revenue: 0.0,
            ctr: 0.0,
            atc_rate: 0.0,
            purchase_rate_given_atc: 0.0,
            purchase_rate_per_session: rate,
            revenue_per_session: 0.0,
        }
    }

    #[test]
    fn test_srm_report_levels() {
        let users = vec![
            user(1, Variant::Control, 0.0),
            user(2, Variant::Treatment, 0.0),
        ];
        let sessions = vec![
            session(1, Variant::Control, true, false, false, 0.0),
            session(1, Variant::Control, true, false, false, 0.0),
            session(2, Variant::Treatment, true, false, false, 0.0),
        ];
        let report = srm_report(&users, &sessions, 0.5).unwrap();
        let user_level = report.user.as_ref().unwrap();
        assert_eq!(user_level.level, SrmLevel::User);
        assert_eq!((user_level.n_control, user_level.n_treatment), (1, 1));
        assert_eq!(report.session.as_ref().unwrap().n_control, 2);
        assert!(!report.user_mismatch(0.01));
    }

    #[test]
    fn test_srm_report_without_users() {
        let report = srm_report(&[], &[], 0.5).unwrap();
        assert!(report.user.is_none());
        assert!(report.session.is_none());
        assert!(!report.user_mismatch(0.01));
    }

    #[test]
    fn test_guardrails_rates() {
        let sessions = vec![
            session(1, Variant::Control, true, true, true, 20.0),
            session(2, Variant::Control, true, false, false, 0.0),
            session(3, Variant::Control, false, false, false, 0.0),
            session(4, Variant::Control, false, false, false, 0.0),
        ];
        let rows = guardrails(&sessions);
        assert_eq!(rows.len(), 1);

        let control = &rows[0];
        assert_eq!(control.sessions, 4);
        assert_eq!(control.impression_rate, 0.5);
        assert_eq!(control.click_rate, 0.25);
        assert_eq!(control.revenue_per_session, 5.0);
        assert_eq!(control.ctr, Some(0.5));
        assert_eq!(control.atc_rate_given_click, Some(1.0));
    }

    #[test]
    fn test_guardrails_undefined_ctr() {
        let sessions = vec![session(1, Variant::Treatment, false, false, false, 0.0)];
        let rows = guardrails(&sessions);
        assert_eq!(rows[0].variant, Variant::Treatment);
        assert_eq!(rows[0].ctr, None);
        assert_eq!(rows[0].atc_rate_given_click, None);
    }

    #[test]
    fn test_trend_summary_window() {
        let daily = vec![
            day(1, Variant::Control, 0.50), // outside a 7-day window ending on the 10th
            day(1, Variant::Treatment, 0.50),
            day(9, Variant::Control, 0.10),
            day(9, Variant::Treatment, 0.12),
            day(10, Variant::Control, 0.12),
            day(10, Variant::Treatment, 0.14),
        ];
        let trend = trend_summary(&daily, 7).unwrap();
        assert!((trend.control_avg - 0.11).abs() < 1e-12);
        assert!((trend.treatment_avg - 0.13).abs() < 1e-12);
        assert!((trend.delta() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_trend_summary_missing_arm() {
        let daily = vec![day(3, Variant::Control, 0.1)];
        assert!(trend_summary(&daily, 7).is_none());
        assert!(trend_summary(&[], 7).is_none());
    }

    #[test]
    fn test_cuped_units_sum_revenue_per_user() {
        let users = vec![
            user(1, Variant::Control, 10.0),
            user(2, Variant::Treatment, 4.0),
        ];
        let sessions = vec![
            session(1, Variant::Control, true, true, true, 15.0),
            session(1, Variant::Control, true, true, true, 5.0),
            session(2, Variant::Treatment, true, false, false, 0.0),
        ];
        let units = cuped_units(&users, &sessions);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].outcome, 20.0);
        assert_eq!(units[0].covariate, 10.0);
        assert_eq!(units[1].outcome, 0.0);
        assert_eq!(units[1].covariate, 4.0);
        assert_eq!(units[1].variant, Variant::Treatment);
    }

    #[test]
    fn test_cuped_units_exclude_users_without_sessions() {
        let users = vec![
            user(1, Variant::Control, 1.0),
            user(2, Variant::Control, 3.0),
            user(3, Variant::Treatment, 2.0),
            user(4, Variant::Treatment, 5.0),
            user(5, Variant::Control, 40.0),
            user(6, Variant::Treatment, 0.0),
        ];
        let sessions = vec![
            session(1, Variant::Control, true, true, true, 2.0),
            session(2, Variant::Control, true, true, true, 4.0),
            session(3, Variant::Treatment, true, true, true, 3.0),
            session(4, Variant::Treatment, true, true, true, 6.0),
        ];
        let units = cuped_units(&users, &sessions);
        assert_eq!(units.len(), 4);
        assert!(units.iter().all(|u| u.covariate != 40.0 && u.outcome > 0.0));

        let y: Vec<f64> = units.iter().map(|u| u.outcome).collect();
        let x: Vec<f64> = units.iter().map(|u| u.covariate).collect();
        let adj = crate::experiment::cuped::cuped_adjust(&y, &x).unwrap();
        assert!(adj.theta > 0.0);
    }

    #[test]
    fn test_cuped_units_variant_from_sessions_and_unknown_users_dropped() {
        let users = vec![user(1, Variant::Control, 7.0)];
        let sessions = vec![
            session(1, Variant::Treatment, true, false, false, 9.0),
            session(99, Variant::Control, true, false, false, 1.0),
        ];
        let units = cuped_units(&users, &sessions);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].variant, Variant::Treatment);
        assert_eq!(units[0].outcome, 9.0);
        assert_eq!(units[0].covariate, 7.0);
    }
}
