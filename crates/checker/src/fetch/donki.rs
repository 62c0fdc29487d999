//! Fetchers for the DONKI event catalog.

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::model::{
    CmeSignature, FlareEvent, HssEvent, IpsEvent, MpcEvent, SepEvent, StormEvent,
};

use super::{parse_feed_time, DonkiData, FetchError, FetchSet};

/// How far back the per-tick event window reaches.
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct CmeAnalysisRow {
    #[serde(rename = "associatedCMEID")]
    associated_cme_id: Option<String>,
    #[serde(rename = "time21_5")]
    time_21_5: Option<String>,
    speed: Option<f64>,
    #[serde(rename = "isMostAccurate")]
    is_most_accurate: Option<bool>,
    #[serde(rename = "enlilList")]
    enlil_list: Option<Vec<EnlilRow>>,
}

#[derive(Debug, Deserialize)]
struct EnlilRow {
    #[serde(rename = "estimatedShockArrivalTime")]
    estimated_shock_arrival_time: Option<String>,
    #[serde(rename = "kp_90")]
    kp_90: Option<f64>,
    #[serde(rename = "kp_135")]
    kp_135: Option<f64>,
    #[serde(rename = "kp_180")]
    kp_180: Option<f64>,
    #[serde(rename = "isEarthGB")]
    is_earth_gb: Option<bool>,
    #[serde(rename = "impactList")]
    impact_list: Option<Vec<ImpactRow>>,
}

#[derive(Debug, Deserialize)]
struct ImpactRow {
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlrRow {
    #[serde(rename = "flrID")]
    flr_id: Option<String>,
    #[serde(rename = "beginTime")]
    begin_time: Option<String>,
    #[serde(rename = "peakTime")]
    peak_time: Option<String>,
    #[serde(rename = "classType")]
    class_type: Option<String>,
    #[serde(rename = "sourceLocation")]
    source_location: Option<String>,
    #[serde(rename = "activeRegionNum")]
    active_region_num: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GstRow {
    #[serde(rename = "gstID")]
    gst_id: Option<String>,
    #[serde(rename = "startTime")]
    start_time: Option<String>,
    #[serde(rename = "allKpIndex")]
    all_kp_index: Option<Vec<GstKpRow>>,
}

#[derive(Debug, Deserialize)]
struct GstKpRow {
    #[serde(rename = "kpIndex")]
    kp_index: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HssRow {
    #[serde(rename = "hssID")]
    hss_id: Option<String>,
    #[serde(rename = "eventTime")]
    event_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SepRow {
    #[serde(rename = "sepID")]
    sep_id: Option<String>,
    #[serde(rename = "eventTime")]
    event_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpsRow {
    #[serde(rename = "activityID")]
    activity_id: Option<String>,
    #[serde(rename = "eventTime")]
    event_time: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MpcRow {
    #[serde(rename = "mpcID")]
    mpc_id: Option<String>,
    #[serde(rename = "eventTime")]
    event_time: Option<String>,
}

/// Event catalog source: everything the evaluator tracks by id.
pub(super) async fn fetch_recent(set: &FetchSet) -> Result<DonkiData, FetchError> {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(RECENT_DAYS);

    let (cmes, flares, storms, hss, seps, ips, mpc) = tokio::join!(
        cmes_between(set, start, end),
        flares_between(set, start, end),
        storms_between(set, start, end),
        set.get_json::<Vec<HssRow>>(set.donki_url("HSS", start, end)),
        set.get_json::<Vec<SepRow>>(set.donki_url("SEP", start, end)),
        set.get_json::<Vec<IpsRow>>(set.donki_url("IPS", start, end)),
        set.get_json::<Vec<MpcRow>>(set.donki_url("MPC", start, end)),
    );

    let failures = [
        cmes.is_err(),
        flares.is_err(),
        storms.is_err(),
        hss.is_err(),
        seps.is_err(),
        ips.is_err(),
        mpc.is_err(),
    ];
    if failures.iter().all(|failed| *failed) {
        return Err(FetchError::AllFeedsFailed("donki catalog".to_string()));
    }

    Ok(DonkiData {
        cmes: or_empty("CMEAnalysis", cmes),
        flares: or_empty("FLR", flares),
        storms: or_empty("GST", storms),
        hss: or_empty("HSS", hss).into_iter().filter_map(decode_hss).collect(),
        seps: or_empty("SEP", seps).into_iter().filter_map(decode_sep).collect(),
        ips: or_empty("IPS", ips).into_iter().filter_map(decode_ips).collect(),
        mpc: or_empty("MPC", mpc).into_iter().filter_map(decode_mpc).collect(),
    })
}

/// CME analyses over a date range, one signature per CME id.
pub(crate) async fn cmes_between(
    set: &FetchSet,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<CmeSignature>, FetchError> {
    let url = format!(
        "{}&mostAccurateOnly=true",
        set.donki_url("CMEAnalysis", start, end)
    );
    let rows = set.get_json::<Vec<CmeAnalysisRow>>(url).await?;

    // Several analyses can share a CME; keep the most accurate, last wins.
    let mut by_id: Vec<CmeSignature> = Vec::new();
    for row in rows {
        let Some(signature) = decode_cme(row) else {
            continue;
        };
        if let Some(existing) = by_id.iter_mut().find(|c| c.id == signature.id) {
            *existing = signature;
        } else {
            by_id.push(signature);
        }
    }
    Ok(by_id)
}

/// Flares over a date range, oldest first.
pub(crate) async fn flares_between(
    set: &FetchSet,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<FlareEvent>, FetchError> {
    let rows = set
        .get_json::<Vec<FlrRow>>(set.donki_url("FLR", start, end))
        .await?;
    let mut flares: Vec<FlareEvent> = rows.into_iter().filter_map(decode_flare).collect();
    flares.sort_by_key(FlareEvent::event_time);
    Ok(flares)
}

/// Geomagnetic storms over a date range.
pub(crate) async fn storms_between(
    set: &FetchSet,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<StormEvent>, FetchError> {
    let rows = set
        .get_json::<Vec<GstRow>>(set.donki_url("GST", start, end))
        .await?;
    Ok(rows.into_iter().filter_map(decode_storm).collect())
}

fn or_empty<T>(feed: &str, result: Result<Vec<T>, FetchError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(feed, error = %e, "donki feed failed, continuing without it");
        Vec::new()
    })
}

fn decode_cme(row: CmeAnalysisRow) -> Option<CmeSignature> {
    let id = row.associated_cme_id?;
    if row.is_most_accurate == Some(false) {
        return None;
    }

    let mut earth_directed = false;
    let mut predicted_kp: Option<f64> = None;
    let mut predicted_arrival = None;

    for enlil in row.enlil_list.unwrap_or_default() {
        let hits_earth = enlil.estimated_shock_arrival_time.is_some()
            || enlil.is_earth_gb == Some(true)
            || enlil
                .impact_list
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|i| i.location.as_deref() == Some("Earth"));
        if !hits_earth {
            continue;
        }
        earth_directed = true;

        for kp in [enlil.kp_90, enlil.kp_135, enlil.kp_180].into_iter().flatten() {
            predicted_kp = Some(predicted_kp.map_or(kp, |prev: f64| prev.max(kp)));
        }
        if let Some(arrival) = enlil
            .estimated_shock_arrival_time
            .as_deref()
            .and_then(parse_feed_time)
        {
            predicted_arrival = Some(arrival);
        }
    }

    Some(CmeSignature {
        id,
        start_time: row.time_21_5.as_deref().and_then(parse_feed_time),
        speed: row.speed,
        predicted_kp,
        predicted_arrival,
        earth_directed,
    })
}

fn decode_flare(row: FlrRow) -> Option<FlareEvent> {
    Some(FlareEvent {
        id: row.flr_id?,
        class_type: row.class_type,
        begin_time: row.begin_time.as_deref().and_then(parse_feed_time),
        peak_time: row.peak_time.as_deref().and_then(parse_feed_time),
        source_location: row.source_location,
        active_region: row.active_region_num,
    })
}

fn decode_storm(row: GstRow) -> Option<StormEvent> {
    let max_kp = row
        .all_kp_index
        .unwrap_or_default()
        .iter()
        .filter_map(|k| k.kp_index)
        .fold(None, |acc: Option<f64>, kp| {
            Some(acc.map_or(kp, |prev| prev.max(kp)))
        });
    Some(StormEvent {
        id: row.gst_id?,
        start_time: row.start_time.as_deref().and_then(parse_feed_time),
        max_kp,
    })
}

fn decode_hss(row: HssRow) -> Option<HssEvent> {
    Some(HssEvent {
        id: row.hss_id?,
        event_time: row.event_time.as_deref().and_then(parse_feed_time),
    })
}

fn decode_sep(row: SepRow) -> Option<SepEvent> {
    Some(SepEvent {
        id: row.sep_id?,
        event_time: row.event_time.as_deref().and_then(parse_feed_time),
    })
}

fn decode_ips(row: IpsRow) -> Option<IpsEvent> {
    Some(IpsEvent {
        id: row.activity_id?,
        event_time: row.event_time.as_deref().and_then(parse_feed_time),
        location: row.location,
    })
}

fn decode_mpc(row: MpcRow) -> Option<MpcEvent> {
    Some(MpcEvent {
        id: row.mpc_id?,
        event_time: row.event_time.as_deref().and_then(parse_feed_time),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_cme_takes_max_model_kp() {
        let row: CmeAnalysisRow = serde_json::from_value(json!({
            "associatedCMEID": "2026-08-01T08:24:00-CME-001",
            "time21_5": "2026-08-01T12:09Z",
            "speed": 1100.0,
            "isMostAccurate": true,
            "enlilList": [{
                "estimatedShockArrivalTime": "2026-08-03T06:00Z",
                "kp_90": 6.0,
                "kp_135": 7.0,
                "kp_180": 8.0,
                "isEarthGB": false,
                "impactList": [{"location": "Earth"}]
            }]
        }))
        .unwrap();

        let cme = decode_cme(row).unwrap();
        assert!(cme.earth_directed);
        assert_eq!(cme.predicted_kp, Some(8.0));
        assert!(cme.predicted_arrival.is_some());
        assert_eq!(cme.speed, Some(1100.0));
    }

    #[test]
    fn test_decode_cme_without_enlil_is_not_earth_directed() {
        let row: CmeAnalysisRow = serde_json::from_value(json!({
            "associatedCMEID": "2026-08-01T02:00:00-CME-002",
            "time21_5": "2026-08-01T02:30Z",
            "speed": 400.0,
            "isMostAccurate": true
        }))
        .unwrap();

        let cme = decode_cme(row).unwrap();
        assert!(!cme.earth_directed);
        assert_eq!(cme.predicted_kp, None);
    }

    #[test]
    fn test_decode_storm_max_kp() {
        let row: GstRow = serde_json::from_value(json!({
            "gstID": "2026-08-01T15:00:00-GST-001",
            "startTime": "2026-08-01T15:00Z",
            "allKpIndex": [
                {"kpIndex": 5.67},
                {"kpIndex": 7.33},
                {"kpIndex": 6.0}
            ]
        }))
        .unwrap();

        let storm = decode_storm(row).unwrap();
        assert_eq!(storm.max_kp, Some(7.33));
    }

    #[test]
    fn test_rows_without_ids_are_dropped() {
        assert!(decode_hss(HssRow {
            hss_id: None,
            event_time: Some("2026-08-01T00:00Z".into()),
        })
        .is_none());
    }
}
