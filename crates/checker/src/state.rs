//! Persistent checker state.
//!
//! The state blob is owned by the tick: loaded up front, transformed by the
//! pipeline, and written back through an atomic replace so concurrent
//! readers (the dashboard) never observe a partial file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use heliowatch_notify::{Alert, AlertKind, Urgency};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::CheckerConfig;
use crate::model::{ActiveRegion, Snapshot};

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Health of one upstream source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A dispatched alert, as remembered in the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub urgency: Urgency,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Alert> for SentAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            kind: alert.kind,
            urgency: alert.urgency,
            title: alert.title.clone(),
            timestamp: alert.timestamp,
        }
    }
}

/// A previously seen Earth-directed CME with its last forecast, kept to
/// detect forecast revisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownCme {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_kp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_arrival: Option<DateTime<Utc>>,
}

/// Everything the checker remembers between ticks.
///
/// Every field is defaulted so a state file written by an older or newer
/// build still loads: missing fields are filled, unknown fields ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerState {
    pub schema_version: u32,

    pub last_run_at: Option<DateTime<Utc>>,
    pub last_kp: Option<f64>,
    pub last_bz: Option<f64>,
    pub last_wind_speed: Option<f64>,
    pub last_wind_density: Option<f64>,

    // Threshold flags reflect the current tick's observation and feed the
    // next tick's falling-edge recovery detection.
    pub kp_was_above5: bool,
    pub kp_was_above7: bool,
    pub bz_was_below10: bool,
    pub bz_was_below15: bool,
    pub wind_was_above600: bool,
    pub wind_was_above700: bool,
    pub density_was_above20: bool,

    pub known_cmes: Vec<KnownCme>,
    pub known_flare_ids: BTreeSet<String>,
    pub known_hss_ids: BTreeSet<String>,
    pub known_region_numbers: BTreeSet<u32>,
    pub known_alert_product_ids: BTreeSet<String>,

    /// Alert type -> last emission time.
    pub last_cooldowns: BTreeMap<String, DateTime<Utc>>,
    /// Emission-time-ascending, capped at `max_alert_history` on save.
    pub alerts_sent: Vec<SentAlert>,
    pub data_health: BTreeMap<String, SourceHealth>,
}

impl Default for CheckerState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            last_run_at: None,
            last_kp: None,
            last_bz: None,
            last_wind_speed: None,
            last_wind_density: None,
            kp_was_above5: false,
            kp_was_above7: false,
            bz_was_below10: false,
            bz_was_below15: false,
            wind_was_above600: false,
            wind_was_above700: false,
            density_was_above20: false,
            known_cmes: Vec::new(),
            known_flare_ids: BTreeSet::new(),
            known_hss_ids: BTreeSet::new(),
            known_region_numbers: BTreeSet::new(),
            known_alert_product_ids: BTreeSet::new(),
            last_cooldowns: BTreeMap::new(),
            alerts_sent: Vec::new(),
            data_health: BTreeMap::new(),
        }
    }
}

impl CheckerState {
    /// Look up a known CME by id.
    #[must_use]
    pub fn known_cme(&self, id: &str) -> Option<&KnownCme> {
        self.known_cmes.iter().find(|c| c.id == id)
    }

    /// Fold one tick's snapshot and dispatched alerts into the state.
    pub fn apply_tick(
        &mut self,
        snapshot: &Snapshot,
        regions: &[ActiveRegion],
        dispatched: &[Alert],
        health: BTreeMap<String, SourceHealth>,
        now: DateTime<Utc>,
    ) {
        self.last_run_at = Some(now);

        self.last_kp = snapshot.kp;
        if let Some(mag) = &snapshot.magnetic_field {
            self.last_bz = Some(mag.bz);
        }
        if let Some(wind) = &snapshot.solar_wind {
            self.last_wind_speed = Some(wind.speed);
            self.last_wind_density = Some(wind.density);
        }

        let kp = snapshot.kp.unwrap_or(0.0);
        let bz = snapshot.magnetic_field.map_or(0.0, |m| m.bz);
        let speed = snapshot.solar_wind.map_or(0.0, |w| w.speed);
        let density = snapshot.solar_wind.map_or(0.0, |w| w.density);

        self.kp_was_above5 = kp >= 5.0;
        self.kp_was_above7 = kp >= 7.0;
        self.bz_was_below10 = bz <= -10.0;
        self.bz_was_below15 = bz <= -15.0;
        self.wind_was_above600 = speed >= 600.0;
        self.wind_was_above700 = speed >= 700.0;
        self.density_was_above20 = density >= 20.0;

        // Known-id sets are replaced wholesale: novelty means "present now
        // but absent last tick".
        self.known_cmes = snapshot
            .earth_directed_cmes
            .iter()
            .map(|c| KnownCme {
                id: c.id.clone(),
                predicted_kp: c.predicted_kp,
                predicted_arrival: c.predicted_arrival,
            })
            .collect();
        self.known_flare_ids = snapshot
            .recent_flares
            .iter()
            .map(|f| f.id.clone())
            .collect();
        self.known_hss_ids = snapshot.recent_hss.iter().map(|h| h.id.clone()).collect();
        self.known_region_numbers = regions.iter().map(|r| r.region_number).collect();
        self.known_alert_product_ids = snapshot
            .active_alerts
            .iter()
            .map(|a| a.id.clone())
            .collect();

        self.data_health = health;

        for alert in dispatched {
            self.last_cooldowns
                .insert(alert.kind.as_str().to_string(), now);
            self.alerts_sent.push(SentAlert::from(alert));
        }
    }

    /// Drop all but the newest `max` sent alerts.
    pub fn cap_alert_history(&mut self, max: usize) {
        let excess = self.alerts_sent.len().saturating_sub(max);
        self.alerts_sent.drain(..excess);
    }
}

/// Loads and saves the checker state file.
pub struct StateStore {
    path: PathBuf,
    max_alert_history: usize,
}

impl StateStore {
    #[must_use]
    pub fn new(config: &CheckerConfig) -> Self {
        Self {
            path: config.state_path(),
            max_alert_history: config.max_alert_history,
        }
    }

    #[must_use]
    pub fn at_path(path: PathBuf, max_alert_history: usize) -> Self {
        Self {
            path,
            max_alert_history,
        }
    }

    /// Whether a state file exists at all (drives the dashboard's
    /// checker-active flag).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the state, falling back to defaults on absence or damage.
    #[must_use]
    pub fn load(&self) -> CheckerState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CheckerState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, using defaults");
                return CheckerState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, using defaults");
                CheckerState::default()
            }
        }
    }

    /// Persist the state atomically.
    ///
    /// The serialized bytes are re-parsed before anything touches disk; a
    /// blob that cannot round-trip is never written. The write itself goes
    /// to a pid-stamped sibling and is renamed over the target.
    pub fn save(&self, state: &mut CheckerState) -> std::io::Result<()> {
        state.cap_alert_history(self.max_alert_history);

        let serialized = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;
        if let Err(e) = serde_json::from_str::<CheckerState>(&serialized) {
            error!(error = %e, "CRITICAL: state failed round-trip sanity check, keeping prior file");
            return Err(std::io::Error::other(e));
        }

        atomic_replace(&self.path, serialized.as_bytes())
    }
}

/// Write `bytes` to a pid-stamped temp sibling of `path`, then rename it
/// over `path`. Readers observe either the old or the new file.
pub(crate) fn atomic_replace(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        error!(path = %path.display(), error = %e, "CRITICAL: state rename failed, keeping prior file");
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
