//! Static checker configuration.
//!
//! Everything here is read once at startup: defaults first, environment
//! overrides second. The running pipeline only ever sees the finished,
//! immutable value.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use heliowatch_notify::{AlertKind, Urgency};

/// Default per-type cooldowns in minutes. `0` means never suppress.
const DEFAULT_COOLDOWNS: &[(AlertKind, i64)] = &[
    (AlertKind::KpThreshold, 180),
    (AlertKind::KpElevated, 360),
    (AlertKind::BzThreshold, 60),
    (AlertKind::WindSpeed, 60),
    (AlertKind::WindDensity, 120),
    (AlertKind::FlareM, 60),
    (AlertKind::FlareX, 0),
    (AlertKind::CmeEarth, 0),
    (AlertKind::CmeRevision, 60),
    (AlertKind::HssArrival, 240),
    (AlertKind::ActiveRegion, 360),
    (AlertKind::AllClear, 60),
];

/// Numeric trigger thresholds for the evaluator.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub kp_elevated: f64,
    pub kp_storm: f64,
    pub kp_major: f64,
    /// Bz thresholds are southward, i.e. negative nT.
    pub bz_moderate: f64,
    pub bz_strong: f64,
    pub wind_elevated: f64,
    pub wind_high: f64,
    pub density_high: f64,
    /// M-class flare probability (percent) that makes a new region notable.
    pub region_m_flare_prob: f64,
    /// X-class flare probability (percent) that makes a new region notable.
    pub region_x_flare_prob: f64,
    /// Upward predicted-Kp jump that counts as a CME forecast revision.
    pub cme_revision_kp_jump: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            kp_elevated: 4.0,
            kp_storm: 5.0,
            kp_major: 7.0,
            bz_moderate: -10.0,
            bz_strong: -15.0,
            wind_elevated: 600.0,
            wind_high: 700.0,
            density_high: 20.0,
            region_m_flare_prob: 30.0,
            region_x_flare_prob: 10.0,
            cme_revision_kp_jump: 2.0,
        }
    }
}

/// Local-time window during which non-critical alerts are held back.
///
/// Start is inclusive, end exclusive. `start > end` wraps past midnight.
#[derive(Debug, Clone)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: u32,
    pub end: u32,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: 23,
            end: 7,
        }
    }
}

/// Immutable configuration for one checker invocation.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Directory holding state, predictions, lockfile, and log.
    pub data_dir: PathBuf,
    pub thresholds: Thresholds,
    /// Cooldown minutes per alert type; kinds absent from the map never
    /// cool down.
    pub cooldowns: BTreeMap<AlertKind, i64>,
    pub routing: HashMap<Urgency, Vec<String>>,
    pub quiet_hours: QuietHours,
    pub max_alert_history: usize,
    pub lock_timeout: Duration,
    pub max_log_size: u64,
    /// Per-source fetch deadline.
    pub fetch_timeout: Duration,
    /// Whether rule 8 (new noteworthy active regions) runs at all.
    pub watch_active_regions: bool,
    pub swpc_base: String,
    pub donki_base: String,
}

impl CheckerConfig {
    /// Build a configuration rooted at `data_dir`, applying environment
    /// overrides on top of the defaults.
    #[must_use]
    pub fn from_env(data_dir: impl AsRef<Path>) -> Self {
        let mut config = Self::with_defaults(data_dir);

        if let Some(enabled) = env_bool("HELIOWATCH_QUIET_HOURS") {
            config.quiet_hours.enabled = enabled;
        }
        if let Some(start) = env_parse::<u32>("HELIOWATCH_QUIET_START") {
            config.quiet_hours.start = start.min(23);
        }
        if let Some(end) = env_parse::<u32>("HELIOWATCH_QUIET_END") {
            config.quiet_hours.end = end.min(24);
        }
        if let Some(secs) = env_parse::<u64>("HELIOWATCH_LOCK_TIMEOUT_SECS") {
            config.lock_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("HELIOWATCH_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(enabled) = env_bool("HELIOWATCH_WATCH_REGIONS") {
            config.watch_active_regions = enabled;
        }
        if let Ok(base) = std::env::var("HELIOWATCH_SWPC_BASE") {
            config.swpc_base = base;
        }
        if let Ok(base) = std::env::var("HELIOWATCH_DONKI_BASE") {
            config.donki_base = base;
        }

        config
    }

    /// Build the default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_defaults(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            thresholds: Thresholds::default(),
            cooldowns: DEFAULT_COOLDOWNS.iter().copied().collect(),
            routing: heliowatch_notify::Dispatcher::default_routing(),
            quiet_hours: QuietHours::default(),
            max_alert_history: 100,
            lock_timeout: Duration::from_secs(10 * 60),
            max_log_size: 1024 * 1024,
            fetch_timeout: Duration::from_secs(20),
            watch_active_regions: true,
            swpc_base: "https://services.swpc.noaa.gov".to_string(),
            donki_base: "https://kauai.ccmc.gsfc.nasa.gov/DONKI/WS/get".to_string(),
        }
    }

    /// Cooldown for an alert kind, in minutes. Zero means never suppress.
    #[must_use]
    pub fn cooldown_minutes(&self, kind: AlertKind) -> i64 {
        self.cooldowns.get(&kind).copied().unwrap_or(0)
    }

    /// Path of the persisted checker state.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("checker-state.json")
    }

    /// Path of the prediction log.
    #[must_use]
    pub fn prediction_path(&self) -> PathBuf {
        self.data_dir.join("predictions.json")
    }

    /// Path of the single-writer lockfile.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("checker.lock")
    }

    /// Path of the checker's own log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("heliowatch.log")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
