//! Alert evaluation.
//!
//! Pure over its inputs: one snapshot, the active-region list, and the
//! previous state go in; candidate alerts come out. Cooldown and
//! quiet-hours suppression happen later, uniformly, in the filter.

pub mod impact;

use chrono::{DateTime, Utc};
use tracing::debug;

use heliowatch_notify::{Alert, AlertKind, Urgency};

use crate::config::CheckerConfig;
use crate::model::{ActiveRegion, CmeSignature, Snapshot};
use crate::state::CheckerState;

use impact::{
    bz_impact, flare_class_letter, flare_impact, format_eta, g_scale_label, kp_bucket, kp_impact,
    wind_impact,
};

/// Evaluate one tick. Rules run in a fixed order; the order only shapes
/// log output, never state.
#[must_use]
pub fn evaluate(
    snapshot: &Snapshot,
    regions: &[ActiveRegion],
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    evaluate_cmes(snapshot, prev, config, now, &mut alerts);
    evaluate_flares(snapshot, prev, now, &mut alerts);
    evaluate_hss(snapshot, prev, now, &mut alerts);
    evaluate_kp(snapshot, prev, config, now, &mut alerts);
    evaluate_bz(snapshot, prev, config, now, &mut alerts);
    evaluate_wind(snapshot, prev, config, now, &mut alerts);
    evaluate_density(snapshot, prev, config, now, &mut alerts);
    evaluate_regions(regions, prev, config, now, &mut alerts);
    evaluate_all_clear(snapshot, prev, config, now, &mut alerts);

    for alert in &alerts {
        debug!(kind = %alert.kind, urgency = %alert.urgency, id = %alert.id, "candidate alert");
    }
    alerts
}

/// Rule 1: new Earth-directed CMEs and upward forecast revisions.
fn evaluate_cmes(
    snapshot: &Snapshot,
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    for cme in &snapshot.earth_directed_cmes {
        match prev.known_cme(&cme.id) {
            None => {
                let kp = cme.predicted_kp.unwrap_or(0.0);
                let urgency = if kp >= config.thresholds.kp_major {
                    Urgency::Critical
                } else {
                    Urgency::High
                };
                let title = match cme.predicted_kp {
                    Some(kp) => format!("Earth-Directed CME — Kp {kp:.0} Forecast"),
                    None => "Earth-Directed CME Detected".to_string(),
                };
                alerts.push(Alert::for_event(
                    AlertKind::CmeEarth,
                    urgency,
                    &cme.id,
                    title,
                    cme_body(cme, now),
                    now,
                ));
            }
            Some(known) => {
                let new_kp = cme.predicted_kp.unwrap_or(0.0);
                let old_kp = known.predicted_kp.unwrap_or(0.0);
                let jumped = new_kp - old_kp >= config.thresholds.cme_revision_kp_jump;
                if jumped && new_kp >= config.thresholds.kp_storm {
                    let urgency = if new_kp >= config.thresholds.kp_major {
                        Urgency::Critical
                    } else {
                        Urgency::High
                    };
                    let eta = cme
                        .predicted_arrival
                        .map(|a| format_eta(a, now))
                        .unwrap_or_else(|| "arrival unknown".to_string());
                    let mut body = format!(
                        "Model forecast for this CME raised from Kp {old_kp:.0} to Kp {new_kp:.0}, {eta}."
                    );
                    if let Some(sentence) = kp_impact(kp_bucket(new_kp)) {
                        body.push(' ');
                        body.push_str(sentence);
                    }
                    alerts.push(Alert {
                        id: format!("cme-revision-{}-{}", cme.id, now.timestamp()),
                        kind: AlertKind::CmeRevision,
                        urgency,
                        title: format!("CME Forecast Upgraded — Kp {new_kp:.0}"),
                        body,
                        timestamp: now,
                        source_event_id: Some(cme.id.clone()),
                    });
                }
            }
        }
    }
}

fn cme_body(cme: &CmeSignature, now: DateTime<Utc>) -> String {
    let mut parts = Vec::new();
    if let Some(speed) = cme.speed {
        parts.push(format!("speed {speed:.0} km/s"));
    }
    match cme.predicted_arrival {
        Some(arrival) => parts.push(format!("arrival {}", format_eta(arrival, now))),
        None => parts.push("arrival unknown".to_string()),
    }
    let mut body = format!("Earth-directed CME: {}.", parts.join(", "));
    if let Some(sentence) = cme.predicted_kp.and_then(|kp| kp_impact(kp_bucket(kp))) {
        body.push(' ');
        body.push_str(sentence);
    }
    body
}

/// Rule 2: new M- and X-class flares. C and below stay quiet.
fn evaluate_flares(
    snapshot: &Snapshot,
    prev: &CheckerState,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    for flare in &snapshot.recent_flares {
        if prev.known_flare_ids.contains(&flare.id) {
            continue;
        }
        let Some(class) = flare.class_type.as_deref() else {
            continue;
        };
        let (kind, urgency) = match flare_class_letter(class) {
            Some('X') => (AlertKind::FlareX, Urgency::Critical),
            Some('M') => (AlertKind::FlareM, Urgency::High),
            _ => continue,
        };

        let mut body = match flare.peak_time {
            Some(peak) => format!("Peaked {}.", peak.format("%H:%M UTC")),
            None => "In progress.".to_string(),
        };
        if let Some(location) = &flare.source_location {
            body.push_str(&format!(" Source {location}"));
            if let Some(region) = flare.active_region {
                body.push_str(&format!(" (region {region})"));
            }
            body.push('.');
        }
        if let Some(sentence) = flare_class_letter(class).and_then(flare_impact) {
            body.push(' ');
            body.push_str(sentence);
        }

        alerts.push(Alert::for_event(
            kind,
            urgency,
            &flare.id,
            format!("{} Solar Flare", class.trim()),
            body,
            now,
        ));
    }
}

/// Rule 3: new high-speed stream arrivals.
fn evaluate_hss(
    snapshot: &Snapshot,
    prev: &CheckerState,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    for hss in &snapshot.recent_hss {
        if prev.known_hss_ids.contains(&hss.id) {
            continue;
        }
        let body = match hss.event_time {
            Some(t) => format!(
                "Coronal-hole high-speed stream detected at {}. Elevated wind speeds expected for a day or two.",
                t.format("%Y-%m-%d %H:%M UTC")
            ),
            None => "Coronal-hole high-speed stream detected. Elevated wind speeds expected for a day or two.".to_string(),
        };
        alerts.push(Alert::for_event(
            AlertKind::HssArrival,
            Urgency::Moderate,
            &hss.id,
            "High-Speed Stream Arrival".to_string(),
            body,
            now,
        ));
    }
}

/// Rule 4: Kp threshold crossings. Only the highest matching branch fires.
fn evaluate_kp(
    snapshot: &Snapshot,
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    let Some(kp) = snapshot.kp else {
        return;
    };
    let prev_kp = prev.last_kp.unwrap_or(0.0);
    let t = &config.thresholds;

    let crossing = if kp >= t.kp_major && prev_kp < t.kp_major {
        Some((
            AlertKind::KpThreshold,
            Urgency::Critical,
            format!("Kp {kp:.1} — {} Severe Storm", g_scale_label(kp)),
        ))
    } else if kp >= t.kp_storm && prev_kp < t.kp_storm {
        Some((
            AlertKind::KpThreshold,
            Urgency::High,
            format!("Kp {kp:.1} — {} Storm Threshold", g_scale_label(kp)),
        ))
    } else if kp >= t.kp_elevated && prev_kp < t.kp_elevated {
        Some((
            AlertKind::KpElevated,
            Urgency::Info,
            format!("Kp {kp:.1} — Elevated Activity"),
        ))
    } else {
        None
    };

    if let Some((kind, urgency, title)) = crossing {
        let body = kp_impact(kp_bucket(kp)).unwrap_or_default().to_string();
        alerts.push(Alert::for_condition(kind, urgency, title, body, now));
    }
}

/// Rule 5: southward Bz crossings.
fn evaluate_bz(
    snapshot: &Snapshot,
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    let bz = snapshot.magnetic_field.map_or(0.0, |m| m.bz);
    let prev_bz = prev.last_bz.unwrap_or(0.0);
    let t = &config.thresholds;

    let crossing = if bz <= t.bz_strong && prev_bz > t.bz_strong {
        Some(Urgency::High)
    } else if bz <= t.bz_moderate && prev_bz > t.bz_moderate {
        Some(Urgency::Moderate)
    } else {
        None
    };

    if let Some(urgency) = crossing {
        alerts.push(Alert::for_condition(
            AlertKind::BzThreshold,
            urgency,
            format!("Bz {bz:.1} nT Southward"),
            bz_impact(bz).unwrap_or_default().to_string(),
            now,
        ));
    }
}

/// Rule 6: solar-wind speed crossings.
fn evaluate_wind(
    snapshot: &Snapshot,
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    let speed = snapshot.solar_wind.map_or(0.0, |w| w.speed);
    let prev_speed = prev.last_wind_speed.unwrap_or(0.0);
    let t = &config.thresholds;

    let crossing = if speed >= t.wind_high && prev_speed < t.wind_high {
        Some(Urgency::High)
    } else if speed >= t.wind_elevated && prev_speed < t.wind_elevated {
        Some(Urgency::Moderate)
    } else {
        None
    };

    if let Some(urgency) = crossing {
        alerts.push(Alert::for_condition(
            AlertKind::WindSpeed,
            urgency,
            format!("Solar Wind {speed:.0} km/s"),
            wind_impact(speed).unwrap_or_default().to_string(),
            now,
        ));
    }
}

/// Rule 7: solar-wind density spike.
fn evaluate_density(
    snapshot: &Snapshot,
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    let density = snapshot.solar_wind.map_or(0.0, |w| w.density);
    let prev_density = prev.last_wind_density.unwrap_or(0.0);

    if density >= config.thresholds.density_high && prev_density < config.thresholds.density_high {
        alerts.push(Alert::for_condition(
            AlertKind::WindDensity,
            Urgency::Moderate,
            format!("Solar Wind Density {density:.0} p/cm³"),
            "Dense solar wind is compressing the magnetosphere; minor field disturbances possible."
                .to_string(),
            now,
        ));
    }
}

/// Rule 8: newly numbered regions with meaningful flare probabilities.
fn evaluate_regions(
    regions: &[ActiveRegion],
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    if !config.watch_active_regions {
        return;
    }
    let t = &config.thresholds;
    for region in regions {
        if prev.known_region_numbers.contains(&region.region_number) {
            continue;
        }
        if region.flare_prob_m < t.region_m_flare_prob
            && region.flare_prob_x < t.region_x_flare_prob
        {
            continue;
        }

        let mut body = format!(
            "New watch region with {:.0}% M-class / {:.0}% X-class flare probability",
            region.flare_prob_m, region.flare_prob_x
        );
        if let Some(location) = &region.location {
            body.push_str(&format!(" at {location}"));
        }
        if let Some(class) = &region.magnetic_class {
            body.push_str(&format!(", magnetic class {class}"));
        }
        body.push('.');

        alerts.push(Alert::for_event(
            AlertKind::ActiveRegion,
            Urgency::Info,
            &region.region_number.to_string(),
            format!("Active Region {} Flare Watch", region.region_number),
            body,
            now,
        ));
    }
}

/// Rule 9: falling-edge recoveries.
fn evaluate_all_clear(
    snapshot: &Snapshot,
    prev: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    alerts: &mut Vec<Alert>,
) {
    let t = &config.thresholds;

    // A drop from 7+ straight below 5 rides this same branch; there is no
    // separate severe-storm all-clear.
    if let Some(kp) = snapshot.kp {
        if prev.kp_was_above5 && kp < t.kp_storm {
            alerts.push(all_clear(
                "kp",
                "All Clear — Geomagnetic Storm Over",
                format!("Kp has recovered to {kp:.1}."),
                now,
            ));
        }
    }

    let bz = snapshot.magnetic_field.map_or(0.0, |m| m.bz);
    if prev.bz_was_below15 && bz > t.bz_moderate {
        alerts.push(all_clear(
            "bz",
            "All Clear — IMF Recovered",
            format!("Bz is back up to {bz:.1} nT."),
            now,
        ));
    }

    let speed = snapshot.solar_wind.map_or(0.0, |w| w.speed);
    if prev.wind_was_above700 && speed < t.wind_elevated {
        alerts.push(all_clear(
            "wind",
            "All Clear — Solar Wind Subsided",
            format!("Solar wind has slowed to {speed:.0} km/s."),
            now,
        ));
    }
}

fn all_clear(subject: &str, title: &str, body: String, now: DateTime<Utc>) -> Alert {
    Alert {
        id: format!("all-clear-{subject}-{}", now.timestamp()),
        kind: AlertKind::AllClear,
        urgency: Urgency::Moderate,
        title: title.to_string(),
        body,
        timestamp: now,
        source_event_id: None,
    }
}
