//! Observation records consumed by the statistical core
//!
//! One `SessionObservation` per analysis unit (a user-session), one
//! `UserObservation` per randomized user, and raw `Event` rows that the
//! warehouse builder sessionizes.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Experiment arm
///
/// Rows carrying any other label fail deserialization, so unknown variants
/// never reach a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Control,
    Treatment,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Control, Variant::Treatment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Control => "control",
            Variant::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-level fact row (one row per user-session)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionObservation {
    pub user_id: u64,
    pub session_id: String,
    pub experiment_id: String,
    pub variant: Variant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_experiment_period: bool,
    #[serde(deserialize_with = "flag")]
    pub has_impression: bool,
    #[serde(deserialize_with = "flag")]
    pub has_click: bool,
    #[serde(deserialize_with = "flag")]
    pub has_add_to_cart: bool,
    #[serde(deserialize_with = "flag")]
    pub has_purchase: bool,
    #[serde(default)]
    pub revenue: f64,
}

/// Randomized user with the pre-period covariate used by CUPED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserObservation {
    pub user_id: u64,
    pub experiment_id: String,
    pub variant: Variant,
    #[serde(alias = "pre_rev", default)]
    pub pre_revenue: f64,
}

/// Funnel stage of a raw telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Impression,
    Click,
    AddToCart,
    Purchase,
}

impl EventType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "impression" => Some(EventType::Impression),
            "click" => Some(EventType::Click),
            "add_to_cart" => Some(EventType::AddToCart),
            "purchase" => Some(EventType::Purchase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Impression => "impression",
            EventType::Click => "click",
            EventType::AddToCart => "add_to_cart",
            EventType::Purchase => "purchase",
        }
    }
}

/// Raw telemetry event as exported by the collection pipeline
///
/// Identifiers are optional and `event_type` is kept as text so the
/// data-quality checks can count malformed rows instead of rejecting the
/// whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_time: NaiveDateTime,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub item_id: Option<u64>,
    pub experiment_id: String,
    pub variant: Variant,
    #[serde(default)]
    pub is_experiment_period: bool,
    #[serde(default)]
    pub revenue: f64,
}

impl Event {
    pub fn kind(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }
}

fn default_true() -> bool {
    true
}

/// Accept both JSON booleans and the 0/1 integers warehouse exports emit
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "indicator must be 0 or 1, got {}",
            other
        ))),
    }
}
