//! Typed records for upstream space-weather data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One Kp reading with its observation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpReading {
    pub time: DateTime<Utc>,
    pub kp: f64,
}

/// Bulk solar-wind parameters from the plasma instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarWind {
    /// km/s
    pub speed: f64,
    /// protons/cm³
    pub density: f64,
    /// Kelvin
    pub temperature: f64,
}

/// Interplanetary magnetic field components in GSM coordinates, nT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagneticField {
    pub bx: f64,
    pub by: f64,
    pub bz: f64,
    pub bt: f64,
}

/// A CME analysis, reduced to what the evaluator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmeSignature {
    /// Upstream CME activity id.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Radial speed, km/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Model-predicted peak Kp at Earth, when an Enlil run exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_kp: Option<f64>,
    /// Model-predicted shock arrival at Earth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_arrival: Option<DateTime<Utc>>,
    /// Whether any model run puts the ejecta on an Earth-intersecting path.
    pub earth_directed: bool,
}

/// A solar flare event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlareEvent {
    pub id: String,
    /// X-ray class, e.g. "M2.1" or "X1.0".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_region: Option<u32>,
}

impl FlareEvent {
    /// Best event time for window matching: peak, else begin.
    #[must_use]
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.peak_time.or(self.begin_time)
    }
}

/// A geomagnetic storm event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Highest Kp observed during the storm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_kp: Option<f64>,
}

/// A high-speed solar-wind stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HssEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
}

/// A solar energetic particle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SepEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
}

/// An interplanetary shock event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpsEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A magnetopause crossing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
}

/// A numbered active region on the visible disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRegion {
    pub region_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnetic_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_spots: Option<u32>,
    /// Percent probabilities, 0..=100.
    pub flare_prob_c: f64,
    pub flare_prob_m: f64,
    pub flare_prob_x: f64,
    pub proton_prob: f64,
}

/// An upstream watch/warning/alert product message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMessage {
    /// Stable id for novelty tracking.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_time: Option<DateTime<Utc>>,
    pub message: String,
}

/// One coherent view of current conditions, assembled once per tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,

    /// Current planetary Kp; carried over from the previous tick when the
    /// geomagnetic source failed.
    pub kp: Option<f64>,
    /// Recent 3-hourly Kp readings, newest last, at most 8.
    pub kp_recent: Vec<KpReading>,
    pub g_scale: Option<String>,
    pub s_scale: Option<String>,
    pub r_scale: Option<String>,

    /// Latest GOES X-ray flux, W/m².
    pub xray_flux: Option<f64>,
    pub latest_flare: Option<FlareEvent>,

    pub solar_wind: Option<SolarWind>,
    pub magnetic_field: Option<MagneticField>,

    pub cmes: Vec<CmeSignature>,
    pub earth_directed_cmes: Vec<CmeSignature>,
    pub recent_flares: Vec<FlareEvent>,
    pub recent_storms: Vec<StormEvent>,
    pub recent_seps: Vec<SepEvent>,
    pub recent_hss: Vec<HssEvent>,
    pub recent_ips: Vec<IpsEvent>,
    pub recent_mpc: Vec<MpcEvent>,

    pub active_alerts: Vec<ProductMessage>,
    pub forecast_3day: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flare_event_time_prefers_peak() {
        let begin = "2026-01-01T10:00:00Z".parse().unwrap();
        let peak = "2026-01-01T10:12:00Z".parse().unwrap();
        let flare = FlareEvent {
            id: "f1".into(),
            class_type: Some("M2.1".into()),
            begin_time: Some(begin),
            peak_time: Some(peak),
            source_location: None,
            active_region: None,
        };
        assert_eq!(flare.event_time(), Some(peak));

        let no_peak = FlareEvent {
            peak_time: None,
            ..flare
        };
        assert_eq!(no_peak.event_time(), Some(begin));
    }
}
