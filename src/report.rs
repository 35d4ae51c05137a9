//! Experiment report rendering
//!
//! Every number in the library stays a raw `f64` until it reaches this
//! module. Proportions render as percentages with three decimals, continuous
//! metrics and p-values with four, undefined values as `NA`.

use crate::config::LaunchLensConfig;
use crate::error::{LaunchLensError, Result};
use crate::experiment::cuped::{run_cuped_readout, CupedReadout};
use crate::experiment::decision::{assess_decision, Decision, DecisionAssessment};
use crate::experiment::metrics::{self, MetricKindTag};
use crate::experiment::readout::{MetricResult, Readout, ReadoutTable};
use crate::experiment::srm::SrmResult;
use crate::monitoring::{self, GuardrailRow, SrmReport, TrendSummary};
use crate::store::ExperimentStore;
use crate::warehouse::DailyMetrics;
use serde::{Deserialize, Serialize};

/// Daily rows shown in the markdown trend preview
const DAILY_PREVIEW_ROWS: usize = 14;

/// Everything the report needs, computed from one store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: String,
    pub confidence_level: f64,
    pub srm_alpha: f64,
    pub assessment: DecisionAssessment,
    pub srm: SrmReport,
    pub readout: ReadoutTable,
    pub guardrails: Vec<GuardrailRow>,
    pub trend: Option<TrendSummary>,
    pub daily: Vec<DailyMetrics>,
    /// `None` when no randomized user has an experiment-period session
    pub cuped: Option<CupedReadout>,
}

impl ExperimentReport {
    /// Run every analysis for `config.experiment_id`
    pub fn build(store: &dyn ExperimentStore, config: &LaunchLensConfig) -> Result<Self> {
        let id = config.experiment_id.as_str();

        let sessions = store.experiment_sessions(id)?;
        if sessions.is_empty() {
            return Err(LaunchLensError::NoData {
                context: format!("experiment '{}'", id),
            });
        }
        let users = store.users(id)?;

        let readout = Readout::new(config.confidence_level).run(&sessions)?;
        let assessment = assess_decision(&readout, &config.primary_metric, config.decision_alpha)?;
        let srm = monitoring::srm_report(&users, &sessions, config.expected_treatment_share)?;
        let guardrails = monitoring::guardrails(&sessions);
        let daily = store.daily_metrics(id)?;
        let trend = monitoring::trend_summary(&daily, config.trend_window_days);

        let units = monitoring::cuped_units(&users, &sessions);
        let cuped = if units.is_empty() {
            tracing::warn!(experiment_id = id, "no users with experiment-period sessions, skipping CUPED");
            None
        } else {
            Some(run_cuped_readout(&units, config.confidence_level)?)
        };

        tracing::info!(experiment_id = id, decision = ?assessment.decision, "report assembled");

        Ok(Self {
            experiment_id: id.to_string(),
            confidence_level: config.confidence_level,
            srm_alpha: config.srm_alpha,
            assessment,
            srm,
            readout,
            guardrails,
            trend,
            daily,
            cuped,
        })
    }

    /// Render the markdown report
    pub fn to_markdown(&self, generated_at: &str, data_source: &str) -> String {
        let mut md = String::new();
        let primary = &self.assessment.primary;
        let ci = confidence_label(self.confidence_level);

        md.push_str("# LaunchLens Experiment Report\n\n");
        md.push_str(&format!("**Experiment:** `{}`  \n", self.experiment_id));
        md.push_str(&format!("**Generated:** {}  \n", generated_at));
        md.push_str(&format!("**Data source:** `{}`  \n\n---\n\n", data_source));

        md.push_str("## Decision Summary\n\n");
        let badge = match self.assessment.decision {
            Decision::Ship => "✅",
            Decision::Hold => "⚠️",
        };
        md.push_str(&format!(
            "**Recommendation:** {} {}  \n",
            badge, self.assessment.decision
        ));
        md.push_str(&format!("**Primary metric:** `{}`  \n", primary.metric_name));
        md.push_str(&format!(
            "- Δ (T-C): {}  \n",
            format_value(primary.kind, primary.absolute_difference)
        ));
        md.push_str(&format!(
            "- {} CI: [{}, {}]  \n",
            ci,
            format_value(primary.kind, primary.ci_low),
            format_value(primary.kind, primary.ci_high)
        ));
        md.push_str(&format!("- p-value: {}  \n", fmt_num(primary.p_value)));
        md.push_str(&format!("- {}\n\n---\n\n", self.assessment.reason));

        md.push_str("## Sample Ratio Mismatch (SRM)\n\n");
        md.push_str("**User-level (primary SRM check):**  \n");
        md.push_str(&srm_lines(self.srm.user.as_ref(), self.srm_alpha, "SRM ❌"));
        md.push_str("\n**Session-level (diagnostic):**  \n");
        md.push_str(&srm_lines(self.srm.session.as_ref(), self.srm_alpha, "Flag ⚠️"));
        md.push_str(
            "\n> Session-level imbalance can appear under correct user randomization \
             when arms differ in activity.\n\n---\n\n",
        );

        md.push_str("## A/B Readout (Experiment Period)\n\n");
        md.push_str(&markdown_table(&READOUT_HEADERS, &readout_rows(&self.readout)));
        md.push('\n');
        for line in metric_definitions(&self.readout) {
            md.push_str(&format!("- {}\n", line));
        }
        md.push_str("\n---\n\n");

        md.push_str("## Guardrails (Experiment Period)\n\n");
        md.push_str(&markdown_table(&GUARDRAIL_HEADERS, &guardrail_rows(&self.guardrails)));
        md.push_str("\n---\n\n");

        md.push_str("## Trends (Daily)\n\n");
        md.push_str(&trend_line(self.trend.as_ref()));
        md.push('\n');
        if !self.daily.is_empty() {
            let preview: Vec<&DailyMetrics> = self.daily.iter().take(DAILY_PREVIEW_ROWS).collect();
            md.push('\n');
            md.push_str(&markdown_table(&DAILY_HEADERS, &daily_rows(&preview)));
        }

        if let Some(cuped) = &self.cuped {
            md.push_str("\n---\n\n## CUPED (User-level Revenue)\n\n");
            md.push_str(&format!("- theta: {:.6}\n", cuped.theta));
            md.push_str(&format!(
                "- Variance reduction: {:.2}%\n",
                cuped.variance_reduction * 100.0
            ));
            md.push_str(&format!(
                "- Raw diff: {} {} CI [{}, {}] p={}\n",
                fmt_num(cuped.raw.comparison.diff),
                ci,
                fmt_num(cuped.raw.comparison.ci_low),
                fmt_num(cuped.raw.comparison.ci_high),
                fmt_num(cuped.raw.comparison.p_value)
            ));
            md.push_str(&format!(
                "- Adjusted diff: {} {} CI [{}, {}] p={}\n",
                fmt_num(cuped.adjusted.comparison.diff),
                ci,
                fmt_num(cuped.adjusted.comparison.ci_low),
                fmt_num(cuped.adjusted.comparison.ci_high),
                fmt_num(cuped.adjusted.comparison.p_value)
            ));
        }

        md
    }
}

const READOUT_HEADERS: [&str; 8] = [
    "metric",
    "control",
    "treatment",
    "abs_diff",
    "rel_diff",
    "ci_low",
    "ci_high",
    "p_value",
];

const GUARDRAIL_HEADERS: [&str; 9] = [
    "variant",
    "sessions",
    "impression_rate",
    "click_rate",
    "atc_rate_per_session",
    "purchase_rate_per_session",
    "revenue_per_session",
    "ctr",
    "atc_rate_given_click",
];

const DAILY_HEADERS: [&str; 7] = [
    "event_date",
    "variant",
    "sessions",
    "purchase_rate_per_session",
    "revenue_per_session",
    "ctr",
    "atc_rate",
];

/// Percentage with three decimals
pub fn fmt_pct(x: f64) -> String {
    format!("{:.3}%", x * 100.0)
}

/// Relative change with two decimals, `NA` when undefined
pub fn fmt_rel(x: Option<f64>) -> String {
    x.map_or_else(|| "NA".to_string(), |v| format!("{:.2}%", v * 100.0))
}

pub fn fmt_num(x: f64) -> String {
    format!("{:.4}", x)
}

fn fmt_opt_pct(x: Option<f64>) -> String {
    x.map_or_else(|| "NA".to_string(), fmt_pct)
}

/// Format one estimate according to the metric family
pub fn format_value(kind: MetricKindTag, x: f64) -> String {
    match kind {
        MetricKindTag::Proportion => fmt_pct(x),
        MetricKindTag::Continuous => fmt_num(x),
    }
}

fn confidence_label(level: f64) -> String {
    format!("{}%", (level * 100.0 * 10.0).round() / 10.0)
}

fn readout_row(r: &MetricResult) -> Vec<String> {
    vec![
        r.metric_name.clone(),
        format_value(r.kind, r.control_estimate),
        format_value(r.kind, r.treatment_estimate),
        format_value(r.kind, r.absolute_difference),
        fmt_rel(r.relative_difference),
        format_value(r.kind, r.ci_low),
        format_value(r.kind, r.ci_high),
        fmt_num(r.p_value),
    ]
}

fn readout_rows(table: &ReadoutTable) -> Vec<Vec<String>> {
    table.iter().map(readout_row).collect()
}

fn guardrail_rows(rows: &[GuardrailRow]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|g| {
            vec![
                g.variant.to_string(),
                g.sessions.to_string(),
                fmt_pct(g.impression_rate),
                fmt_pct(g.click_rate),
                fmt_pct(g.atc_rate_per_session),
                fmt_pct(g.purchase_rate_per_session),
                fmt_num(g.revenue_per_session),
                fmt_opt_pct(g.ctr),
                fmt_opt_pct(g.atc_rate_given_click),
            ]
        })
        .collect()
}

fn daily_rows(rows: &[&DailyMetrics]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|d| {
            vec![
                d.event_date.to_string(),
                d.variant.to_string(),
                d.sessions.to_string(),
                fmt_pct(d.purchase_rate_per_session),
                fmt_num(d.revenue_per_session),
                fmt_pct(d.ctr),
                fmt_pct(d.atc_rate),
            ]
        })
        .collect()
}

fn srm_lines(result: Option<&SrmResult>, alpha: f64, flag: &str) -> String {
    match result {
        Some(r) => format!(
            "- control={}, treatment={}  \n- chi2={:.3}, p={:.4} → {}  \n",
            r.n_control,
            r.n_treatment,
            r.chi_square_statistic,
            r.p_value,
            if r.is_mismatch(alpha) { flag } else { "OK ✅" }
        ),
        None => "- no units recorded  \n".to_string(),
    }
}

fn trend_line(trend: Option<&TrendSummary>) -> String {
    match trend {
        Some(t) => format!(
            "- Last {} days avg purchase/session: control={}, treatment={} (Δ={})",
            t.window_days,
            fmt_pct(t.control_avg),
            fmt_pct(t.treatment_avg),
            fmt_pct(t.delta())
        ),
        None => "- Trend summary not available.".to_string(),
    }
}

/// Pipe table with a header separator row
pub fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = format!("| {} |\n", headers.join(" | "));
    out.push_str(&format!(
        "|{}\n",
        headers.iter().map(|_| "---|").collect::<String>()
    ));
    for row in rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out
}

/// Space-aligned table for the terminal
pub fn text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = render(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&render(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// Readout table for the terminal
pub fn readout_text(table: &ReadoutTable) -> String {
    text_table(&READOUT_HEADERS, &readout_rows(table))
}

/// "`name`: definition" for every metric in the table, in table order
pub fn metric_definitions(table: &ReadoutTable) -> Vec<String> {
    table
        .iter()
        .filter_map(|r| metrics::find(&r.metric_name))
        .map(|spec| format!("`{}`: {}", spec.name, spec.description))
        .collect()
}

/// SRM and guardrail summary for the terminal
pub fn monitoring_text(srm: &SrmReport, guardrails: &[GuardrailRow], alpha: f64) -> String {
    let mut out = String::from("LaunchLens Monitoring: SRM + Guardrails (experiment period)\n\n");

    for (title, result) in [
        ("SRM (User-level assignment)", srm.user.as_ref()),
        ("SRM (Session-level, experiment period)", srm.session.as_ref()),
    ] {
        out.push_str(title);
        out.push('\n');
        match result {
            Some(r) => {
                out.push_str(&format!(
                    "  control={}  treatment={}  expected_treat={:.2}\n",
                    r.n_control, r.n_treatment, r.expected_treatment_share
                ));
                out.push_str(&format!(
                    "  chi2={:.3}  p={:.4}\n",
                    r.chi_square_statistic, r.p_value
                ));
                out.push_str(&if r.is_mismatch(alpha) {
                    format!("  FLAG: SRM detected (p<{})\n\n", alpha)
                } else {
                    "  FLAG: OK (no SRM)\n\n".to_string()
                });
            }
            None => out.push_str("  no units recorded\n\n"),
        }
    }

    out.push_str("Guardrail metrics (experiment period)\n");
    out.push_str(&text_table(&GUARDRAIL_HEADERS, &guardrail_rows(guardrails)));
    out
}

/// CUPED raw-vs-adjusted summary for the terminal
pub fn cuped_text(cuped: &CupedReadout, confidence: f64) -> String {
    let ci = confidence_label(confidence);
    let mut out = String::from("LaunchLens CUPED Readout (user-level revenue during experiment)\n");
    out.push_str(&format!("- units: {}\n", cuped.units));
    out.push_str(&format!("- theta (CUPED): {:.6}\n", cuped.theta));
    out.push_str(&format!(
        "- Variance reduction: {:.2}%\n\n",
        cuped.variance_reduction * 100.0
    ));

    for (title, arm) in [
        ("RAW revenue_per_user", &cuped.raw),
        ("CUPED-adjusted revenue_per_user", &cuped.adjusted),
    ] {
        let c = &arm.comparison;
        out.push_str(title);
        out.push('\n');
        out.push_str(&format!("  control mean:   {}\n", fmt_num(arm.control_mean)));
        out.push_str(&format!("  treatment mean: {}\n", fmt_num(arm.treatment_mean)));
        out.push_str(&format!(
            "  diff (T-C):     {}   {} CI [{}, {}]   p={}\n\n",
            fmt_num(c.diff),
            ci,
            fmt_num(c.ci_low),
            fmt_num(c.ci_high),
            fmt_num(c.p_value)
        ));
    }
    out
}
