//! Prediction log, deferred verification, and scorecard.
//!
//! Users submit "something is coming" prognostics; once a prediction's
//! window closes, it is scored against the events the checker actually
//! observed inside that window.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use heliowatch_notify::AlertKind;

use crate::evaluate::impact::flare_class_letter;
use crate::model::Snapshot;
use crate::state::{atomic_replace, CheckerState};

pub const PREDICTION_SCHEMA_VERSION: u32 = 1;

/// Alert types that count as prediction-confirming events.
const MATCHING_ALERT_KINDS: [AlertKind; 7] = [
    AlertKind::FlareM,
    AlertKind::FlareX,
    AlertKind::KpThreshold,
    AlertKind::KpElevated,
    AlertKind::CmeEarth,
    AlertKind::BzThreshold,
    AlertKind::WindSpeed,
];

/// Errors from prediction storage.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("prediction storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("prediction serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Pending,
    Hit,
    Miss,
}

/// An observed event that fell inside a prediction's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// One user prognostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: PredictionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub window_hours: i64,
    pub window_end: DateTime<Utc>,
    #[serde(default)]
    pub matched_events: Vec<MatchedEvent>,
}

/// Prediction settings, persisted alongside the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub verification_window_hours: i64,
    pub cooldown_hours: i64,
    pub max_predictions: usize,
    /// Empirical probability that a random window of the configured length
    /// contains at least one significant event. Computed offline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_rate_computed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_rate_sample_windows: Option<u64>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            verification_window_hours: 48,
            cooldown_hours: 6,
            max_predictions: 500,
            base_rate: None,
            base_rate_computed_at: None,
            base_rate_sample_windows: None,
        }
    }
}

/// The persisted prediction blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionState {
    pub schema_version: u32,
    pub predictions: Vec<Prediction>,
    pub config: PredictionConfig,
}

impl Default for PredictionState {
    fn default() -> Self {
        Self {
            schema_version: PREDICTION_SCHEMA_VERSION,
            predictions: Vec::new(),
            config: PredictionConfig::default(),
        }
    }
}

/// Outcome of a submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted(Prediction),
    /// The most recent prediction is still inside the cooldown.
    OnCooldown { cooldown_ends: DateTime<Utc> },
}

/// Aggregate hit/miss statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scorecard {
    pub hits: usize,
    pub misses: usize,
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
    pub total_days_tracked: i64,
    /// One-tailed binomial P(X >= hits) against the base rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

impl PredictionState {
    /// Submit a new prediction, subject to the cooldown.
    pub fn submit(&mut self, note: Option<String>, now: DateTime<Utc>) -> SubmitOutcome {
        if let Some(last) = self.predictions.last() {
            let cooldown_ends = last.timestamp + Duration::hours(self.config.cooldown_hours);
            if now < cooldown_ends {
                return SubmitOutcome::OnCooldown { cooldown_ends };
            }
        }

        let window_hours = self.config.verification_window_hours;
        let prediction = Prediction {
            id: format!("pred-{}", now.timestamp_millis()),
            timestamp: now,
            note,
            status: PredictionStatus::Pending,
            verified_at: None,
            window_hours,
            window_end: now + Duration::hours(window_hours),
            matched_events: Vec::new(),
        };
        self.predictions.push(prediction.clone());

        let excess = self
            .predictions
            .len()
            .saturating_sub(self.config.max_predictions);
        self.predictions.drain(..excess);

        SubmitOutcome::Accepted(prediction)
    }

    /// Score every pending prediction whose window has closed. Returns the
    /// newly decided predictions so the caller can notify the user.
    pub fn verify_due(
        &mut self,
        state: &CheckerState,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Vec<Prediction> {
        let mut decided = Vec::new();
        for prediction in &mut self.predictions {
            if prediction.status != PredictionStatus::Pending || prediction.window_end > now {
                continue;
            }

            let matched = collect_matches(prediction, state, snapshot);
            prediction.status = if matched.is_empty() {
                PredictionStatus::Miss
            } else {
                PredictionStatus::Hit
            };
            prediction.verified_at = Some(now);
            prediction.matched_events = matched;

            info!(
                id = %prediction.id,
                status = ?prediction.status,
                matches = prediction.matched_events.len(),
                "prediction verified"
            );
            decided.push(prediction.clone());
        }
        decided
    }

    /// Build the scorecard.
    #[must_use]
    pub fn scorecard(&self, now: DateTime<Utc>) -> Scorecard {
        let hits = self
            .predictions
            .iter()
            .filter(|p| p.status == PredictionStatus::Hit)
            .count();
        let misses = self
            .predictions
            .iter()
            .filter(|p| p.status == PredictionStatus::Miss)
            .count();
        let pending = self.predictions.len() - hits - misses;

        let decided = hits + misses;
        let hit_rate = (decided > 0).then(|| hits as f64 / decided as f64);

        let total_days_tracked = self
            .predictions
            .first()
            .map_or(0, |first| (now - first.timestamp).num_days());

        let p_value = match (self.config.base_rate, decided) {
            (Some(rate), n) if n > 0 => Some(binomial_p_value(hits, n, rate)),
            _ => None,
        };

        Scorecard {
            hits,
            misses,
            pending,
            hit_rate,
            total_days_tracked,
            p_value,
        }
    }
}

/// Events inside `[prediction.timestamp, prediction.window_end]`, deduped
/// by `(type, timestamp)`.
fn collect_matches(
    prediction: &Prediction,
    state: &CheckerState,
    snapshot: &Snapshot,
) -> Vec<MatchedEvent> {
    let in_window =
        |t: DateTime<Utc>| t >= prediction.timestamp && t <= prediction.window_end;

    let mut seen: BTreeSet<(String, i64)> = BTreeSet::new();
    let mut matches = Vec::new();
    let mut push = |event: MatchedEvent| {
        if seen.insert((event.event_type.clone(), event.timestamp.timestamp())) {
            matches.push(event);
        }
    };

    // Alerts the checker actually sent during the window.
    for alert in &state.alerts_sent {
        if MATCHING_ALERT_KINDS.contains(&alert.kind) && in_window(alert.timestamp) {
            push(MatchedEvent {
                event_type: alert.kind.as_str().to_string(),
                timestamp: alert.timestamp,
                description: alert.title.clone(),
            });
        }
    }

    // M+ flares from the raw feed, covering alerts a cooldown swallowed.
    for flare in &snapshot.recent_flares {
        let significant = flare
            .class_type
            .as_deref()
            .and_then(flare_class_letter)
            .is_some_and(|letter| letter == 'M' || letter == 'X');
        if !significant {
            continue;
        }
        if let Some(t) = flare.event_time().filter(|t| in_window(*t)) {
            push(MatchedEvent {
                event_type: "flare".to_string(),
                timestamp: t,
                description: format!(
                    "{} Flare",
                    flare.class_type.as_deref().unwrap_or("?").trim()
                ),
            });
        }
    }

    // Storms that reached Kp 5.
    for storm in &snapshot.recent_storms {
        let Some(kp) = storm.max_kp.filter(|kp| *kp >= 5.0) else {
            continue;
        };
        if let Some(t) = storm.start_time.filter(|t| in_window(*t)) {
            push(MatchedEvent {
                event_type: "storm".to_string(),
                timestamp: t,
                description: format!("Kp {kp:.1} Geomagnetic Storm"),
            });
        }
    }

    // Earth-directed CMEs launched during the window.
    for cme in &snapshot.earth_directed_cmes {
        if let Some(t) = cme.start_time.filter(|t| in_window(*t)) {
            let description = match cme.speed {
                Some(speed) => format!("Earth-directed CME at {speed:.0} km/s"),
                None => "Earth-directed CME".to_string(),
            };
            push(MatchedEvent {
                event_type: "cme".to_string(),
                timestamp: t,
                description,
            });
        }
    }

    matches
}

/// One-tailed binomial tail probability `P(X >= hits)` with `n` trials at
/// success probability `p`, accumulated from log-space PMF terms so large
/// `n` stays finite.
#[must_use]
pub fn binomial_p_value(hits: usize, n: usize, p: f64) -> f64 {
    if n == 0 || hits == 0 {
        return 1.0;
    }
    let p = p.clamp(0.0, 1.0);
    if p == 0.0 {
        return 0.0;
    }
    if p == 1.0 {
        return 1.0;
    }

    let ln_p = p.ln();
    let ln_q = (1.0 - p).ln();

    let mut ln_fact = vec![0.0f64; n + 1];
    for k in 1..=n {
        ln_fact[k] = ln_fact[k - 1] + (k as f64).ln();
    }

    let mut total = 0.0;
    for k in hits..=n {
        let ln_pmf = ln_fact[n] - ln_fact[k] - ln_fact[n - k]
            + k as f64 * ln_p
            + (n - k) as f64 * ln_q;
        total += ln_pmf.exp();
    }
    total.min(1.0)
}

/// Storage seam for the prediction blob. The JSON file backend ships
/// here; a key/value backend can implement the same trait.
#[async_trait]
pub trait PredictionStorage: Send + Sync {
    async fn load(&self) -> Result<PredictionState, PredictionError>;
    async fn save(&self, state: &PredictionState) -> Result<(), PredictionError>;
}

/// JSON-file prediction storage.
pub struct FilePredictionStorage {
    path: PathBuf,
}

impl FilePredictionStorage {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PredictionStorage for FilePredictionStorage {
    async fn load(&self) -> Result<PredictionState, PredictionError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PredictionState::default());
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "prediction file corrupt, starting fresh");
                Ok(PredictionState::default())
            }
        }
    }

    async fn save(&self, state: &PredictionState) -> Result<(), PredictionError> {
        let serialized = serde_json::to_string_pretty(state)?;
        // Same pre-write sanity check as the state store.
        serde_json::from_str::<PredictionState>(&serialized)?;
        atomic_replace(&self.path, serialized.as_bytes())?;
        Ok(())
    }
}
