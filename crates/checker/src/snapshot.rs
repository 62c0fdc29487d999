//! Snapshot assembly from fetch outcomes.
//!
//! The assembler is where per-source failure turns into substitutes: a
//! failed source contributes its previous last-known value (or nothing)
//! plus a red health entry, and the tick carries on.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::fetch::{FetchError, FetchResults, SourceId};
use crate::model::{ActiveRegion, Snapshot};
use crate::state::{CheckerState, SourceHealth};

/// A snapshot plus the health map describing how it was obtained.
#[derive(Debug)]
pub struct Assembled {
    pub snapshot: Snapshot,
    pub regions: Vec<ActiveRegion>,
    pub health: BTreeMap<String, SourceHealth>,
}

/// Build one coherent snapshot from the tick's fetch results, substituting
/// last-known values from `prev` where a source failed.
#[must_use]
pub fn assemble(results: &FetchResults, prev: &CheckerState, now: DateTime<Utc>) -> Assembled {
    let mut health = BTreeMap::new();
    let mut record = |source: SourceId, outcome: Result<(), &FetchError>| {
        health.insert(
            source.as_str().to_string(),
            health_entry(source, outcome, prev, now),
        );
    };

    record(SourceId::Geomag, results.geomag.as_ref().map(|_| ()));
    record(SourceId::Xray, results.xray.as_ref().map(|_| ()));
    record(SourceId::SolarWind, results.wind.as_ref().map(|_| ()));
    record(SourceId::Donki, results.donki.as_ref().map(|_| ()));
    record(SourceId::SwpcProducts, results.products.as_ref().map(|_| ()));

    let geomag = results.geomag.as_ref().ok();
    let xray = results.xray.as_ref().ok();
    let wind = results.wind.as_ref().ok();
    let donki = results.donki.as_ref().ok();
    let products = results.products.as_ref().ok();

    let solar_wind = wind.and_then(|w| w.realtime_wind.or(w.weekly_wind));
    let magnetic_field = wind.and_then(|w| w.realtime_mag.or(w.weekly_mag));

    let recent_flares = donki.map(|d| d.flares.clone()).unwrap_or_default();
    let earth_directed_cmes: Vec<_> = donki
        .map(|d| {
            d.cmes
                .iter()
                .filter(|c| c.earth_directed)
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let snapshot = Snapshot {
        timestamp: now,
        fetched_at: results.fetched_at,
        kp: geomag.and_then(|g| g.kp_now).or(prev.last_kp),
        kp_recent: geomag.map(|g| g.kp_recent.clone()).unwrap_or_default(),
        g_scale: geomag.and_then(|g| g.g_scale.clone()),
        s_scale: geomag.and_then(|g| g.s_scale.clone()),
        r_scale: geomag.and_then(|g| g.r_scale.clone()),
        xray_flux: xray.and_then(|x| x.flux),
        latest_flare: recent_flares.last().cloned(),
        solar_wind,
        magnetic_field,
        cmes: donki.map(|d| d.cmes.clone()).unwrap_or_default(),
        earth_directed_cmes,
        recent_flares,
        recent_storms: donki.map(|d| d.storms.clone()).unwrap_or_default(),
        recent_seps: donki.map(|d| d.seps.clone()).unwrap_or_default(),
        recent_hss: donki.map(|d| d.hss.clone()).unwrap_or_default(),
        recent_ips: donki.map(|d| d.ips.clone()).unwrap_or_default(),
        recent_mpc: donki.map(|d| d.mpc.clone()).unwrap_or_default(),
        active_alerts: products.map(|p| p.alerts.clone()).unwrap_or_default(),
        forecast_3day: products.and_then(|p| p.forecast_3day.clone()),
    };

    Assembled {
        snapshot,
        regions: products.map(|p| p.regions.clone()).unwrap_or_default(),
        health,
    }
}

/// Health entry for one source. A failure keeps the previous
/// `last_success` so the dashboard can show how stale the source is.
fn health_entry(
    source: SourceId,
    outcome: Result<(), &FetchError>,
    prev: &CheckerState,
    now: DateTime<Utc>,
) -> SourceHealth {
    match outcome {
        Ok(()) => SourceHealth {
            ok: true,
            last_success: Some(now),
            last_error: None,
        },
        Err(e) => SourceHealth {
            ok: false,
            last_success: prev
                .data_health
                .get(source.as_str())
                .and_then(|h| h.last_success),
            last_error: Some(e.to_string()),
        },
    }
}
