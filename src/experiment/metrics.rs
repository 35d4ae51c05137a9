// Declarative registry of tracked readout metrics
//
// Each metric declares its kind and the fields it reads. The orchestrator
// walks this table instead of branching on metric names. Funnel rates use
// the realized count of the previous stage as denominator (CTR is clicks
// over impression sessions, not over all sessions).

use crate::observation::SessionObservation;
use serde::{Deserialize, Serialize};

/// Binary indicator counted per session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Every session counts (per-session denominators)
    Session,
    Impression,
    Click,
    AddToCart,
    Purchase,
}

impl Indicator {
    pub fn is_set(&self, row: &SessionObservation) -> bool {
        match self {
            Indicator::Session => true,
            Indicator::Impression => row.has_impression,
            Indicator::Click => row.has_click,
            Indicator::AddToCart => row.has_add_to_cart,
            Indicator::Purchase => row.has_purchase,
        }
    }

    /// Number of rows with this indicator set
    pub fn count<'a, I>(&self, rows: I) -> u64
    where
        I: IntoIterator<Item = &'a SessionObservation>,
    {
        rows.into_iter().filter(|row| self.is_set(row)).count() as u64
    }
}

/// Continuous per-session value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousField {
    Revenue,
}

impl ContinuousField {
    pub fn value(&self, row: &SessionObservation) -> f64 {
        match self {
            ContinuousField::Revenue => row.revenue,
        }
    }
}

/// How a metric is estimated and compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Rate of `numerator` among `denominator` sessions, two-proportion z-test
    Proportion {
        numerator: Indicator,
        denominator: Indicator,
    },
    /// Mean of a per-session value, Welch t-test
    Continuous { value: ContinuousField },
}

impl MetricKind {
    pub fn tag(&self) -> MetricKindTag {
        match self {
            MetricKind::Proportion { .. } => MetricKindTag::Proportion,
            MetricKind::Continuous { .. } => MetricKindTag::Continuous,
        }
    }
}

/// Field-free view of `MetricKind` carried on results for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKindTag {
    Proportion,
    Continuous,
}

/// A tracked metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: MetricKind,
}

/// Primary decision metric
pub const PRIMARY_METRIC: &str = "purchase_rate_per_session";

/// All metrics produced by a readout
pub const METRICS: [MetricSpec; 5] = [
    MetricSpec {
        name: PRIMARY_METRIC,
        description: "purchase sessions / sessions",
        kind: MetricKind::Proportion {
            numerator: Indicator::Purchase,
            denominator: Indicator::Session,
        },
    },
    MetricSpec {
        name: "ctr",
        description: "click sessions / impression sessions",
        kind: MetricKind::Proportion {
            numerator: Indicator::Click,
            denominator: Indicator::Impression,
        },
    },
    MetricSpec {
        name: "atc_rate",
        description: "add-to-cart sessions / click sessions",
        kind: MetricKind::Proportion {
            numerator: Indicator::AddToCart,
            denominator: Indicator::Click,
        },
    },
    MetricSpec {
        name: "purchase_rate_given_atc",
        description: "purchase sessions / add-to-cart sessions",
        kind: MetricKind::Proportion {
            numerator: Indicator::Purchase,
            denominator: Indicator::AddToCart,
        },
    },
    MetricSpec {
        name: "revenue_per_session",
        description: "mean purchase revenue per session",
        kind: MetricKind::Continuous {
            value: ContinuousField::Revenue,
        },
    },
];

/// Look up a registered metric by name
pub fn find(name: &str) -> Option<&'static MetricSpec> {
    METRICS.iter().find(|m| m.name == name)
}
