//! Read models for the external dashboard layer.
//!
//! The HTTP endpoints that serve these live outside this crate; here are
//! only the serializable response shapes and the pure builders that fill
//! them from persisted state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::predict::{Prediction, PredictionState, Scorecard};
use crate::state::{CheckerState, SentAlert, SourceHealth};

/// How many sent alerts the alerts view returns.
const ALERTS_VIEW_LIMIT: usize = 50;

/// Latest observed values, for the dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_density: Option<f64>,
}

/// Response body for the alerts read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AlertsView {
    /// Newest first, at most 50.
    pub alerts: Vec<SentAlert>,
    pub health: BTreeMap<String, SourceHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    pub checker_active: bool,
    pub current_values: CurrentValues,
}

/// Build the alerts view. `state` is `None` when no state file exists,
/// which the dashboard shows as "checker inactive".
#[must_use]
pub fn alerts_view(state: Option<&CheckerState>) -> AlertsView {
    let Some(state) = state else {
        return AlertsView {
            alerts: Vec::new(),
            health: BTreeMap::new(),
            last_run: None,
            checker_active: false,
            current_values: CurrentValues {
                kp: None,
                bz: None,
                wind_speed: None,
                wind_density: None,
            },
        };
    };

    let mut alerts: Vec<SentAlert> = state
        .alerts_sent
        .iter()
        .rev()
        .take(ALERTS_VIEW_LIMIT)
        .cloned()
        .collect();
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    AlertsView {
        alerts,
        health: state.data_health.clone(),
        last_run: state.last_run_at,
        checker_active: true,
        current_values: CurrentValues {
            kp: state.last_kp,
            bz: state.last_bz,
            wind_speed: state.last_wind_speed,
            wind_density: state.last_wind_density,
        },
    }
}

/// Config subset exposed to the predictions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionConfigView {
    pub verification_window_hours: i64,
    pub cooldown_hours: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_rate: Option<f64>,
}

/// Response body for the predictions read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionsView {
    /// Newest first.
    pub predictions: Vec<Prediction>,
    pub scorecard: Scorecard,
    pub config: PredictionConfigView,
}

/// Build the predictions view.
#[must_use]
pub fn predictions_view(state: &PredictionState, now: DateTime<Utc>) -> PredictionsView {
    let mut predictions = state.predictions.clone();
    predictions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    PredictionsView {
        predictions,
        scorecard: state.scorecard(now),
        config: PredictionConfigView {
            verification_window_hours: state.config.verification_window_hours,
            cooldown_hours: state.config.cooldown_hours,
            base_rate: state.config.base_rate,
        },
    }
}
