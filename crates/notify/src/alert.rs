//! Alert types shared between the checker and the delivery channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How urgently an alert should reach the user.
///
/// Ordering matters: routing tables and quiet-hours filtering key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Immediate attention - severe storm in progress or inbound.
    Critical,
    /// Significant activity, worth interrupting for.
    High,
    /// Notable but not disruptive.
    Moderate,
    /// Background awareness only.
    Info,
}

impl Urgency {
    /// Display name, matching the serialized form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Info => "info",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of condition an alert reports.
///
/// The serialized form is the cooldown-table key, so variants keep the
/// kebab-case names the state file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    CmeEarth,
    CmeRevision,
    FlareX,
    FlareM,
    HssArrival,
    KpThreshold,
    KpElevated,
    BzThreshold,
    WindSpeed,
    WindDensity,
    ActiveRegion,
    AllClear,
    PredictionResult,
    /// Synthetic digest the dispatcher makes when a tick produces several
    /// info alerts. Never persisted; exists only on the wire.
    InfoDigest,
}

impl AlertKind {
    /// Cooldown-table key for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CmeEarth => "cme-earth",
            Self::CmeRevision => "cme-revision",
            Self::FlareX => "flare-x",
            Self::FlareM => "flare-m",
            Self::HssArrival => "hss-arrival",
            Self::KpThreshold => "kp-threshold",
            Self::KpElevated => "kp-elevated",
            Self::BzThreshold => "bz-threshold",
            Self::WindSpeed => "wind-speed",
            Self::WindDensity => "wind-density",
            Self::ActiveRegion => "active-region",
            Self::AllClear => "all-clear",
            Self::PredictionResult => "prediction-result",
            Self::InfoDigest => "info-digest",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert produced by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Deduplication id. Deterministic where the underlying event has a
    /// stable id; threshold crossings and recoveries embed the emission
    /// timestamp instead so each emission stays unique.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub urgency: Urgency,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Upstream event id that triggered this alert, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
}

impl Alert {
    /// Build an alert tied to a stable upstream event id.
    #[must_use]
    pub fn for_event(
        kind: AlertKind,
        urgency: Urgency,
        event_id: &str,
        title: String,
        body: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{}-{event_id}", kind.as_str()),
            kind,
            urgency,
            title,
            body,
            timestamp,
            source_event_id: Some(event_id.to_string()),
        }
    }

    /// Build an alert for a recurring condition (threshold crossing,
    /// revision, recovery). The emission time goes into the id.
    #[must_use]
    pub fn for_condition(
        kind: AlertKind,
        urgency: Urgency,
        title: String,
        body: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{}-{}", kind.as_str(), timestamp.timestamp()),
            kind,
            urgency,
            title,
            body,
            timestamp,
            source_event_id: None,
        }
    }
}
