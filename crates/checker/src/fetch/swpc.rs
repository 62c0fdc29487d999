//! Fetchers for the SWPC JSON/text products.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::model::{ActiveRegion, KpReading, MagneticField, ProductMessage, SolarWind};

use super::{parse_feed_time, FetchError, FetchSet, GeomagData, ProductData, WindData, XrayData};

/// Row of the 1-minute planetary Kp feed.
#[derive(Debug, Deserialize)]
struct KpMinuteRow {
    estimated_kp: Option<f64>,
}

/// Row of the GOES X-ray flux feed.
#[derive(Debug, Deserialize)]
struct XrayRow {
    flux: Option<f64>,
    energy: Option<String>,
}

/// Row of the solar-regions feed. Field names follow the upstream JSON.
#[derive(Debug, Deserialize)]
struct RegionRow {
    observed_date: Option<String>,
    region: Option<u32>,
    location: Option<String>,
    mag_class: Option<String>,
    number_spots: Option<u32>,
    c_flare_probability: Option<f64>,
    m_flare_probability: Option<f64>,
    x_flare_probability: Option<f64>,
    proton_probability: Option<f64>,
}

/// Row of the alerts product.
#[derive(Debug, Deserialize)]
struct AlertRow {
    product_id: Option<String>,
    issue_datetime: Option<String>,
    message: Option<String>,
}

/// Geomagnetic source: current Kp, recent 3-hourly Kp, NOAA scales.
pub(super) async fn fetch_geomag(set: &FetchSet) -> Result<GeomagData, FetchError> {
    let minute = set
        .get_json::<Vec<KpMinuteRow>>(set.swpc_url("/json/planetary_k_index_1m.json"))
        .await;
    let table = set
        .get_json::<Vec<Vec<Value>>>(set.swpc_url("/products/noaa-planetary-k-index.json"))
        .await;

    let kp_now = match &minute {
        Ok(rows) => rows.iter().rev().find_map(|r| r.estimated_kp),
        Err(e) => {
            warn!(error = %e, "1-minute Kp feed failed, falling back to 3-hourly");
            None
        }
    };

    let kp_recent = match &table {
        Ok(rows) => decode_kp_table(rows),
        Err(e) => {
            warn!(error = %e, "3-hourly Kp product failed");
            Vec::new()
        }
    };

    if minute.is_err() && table.is_err() {
        return Err(minute.err().unwrap_or(FetchError::AllFeedsFailed(
            "planetary Kp".to_string(),
        )));
    }

    // Scales are decorative; their failure never fails the source.
    let (g_scale, s_scale, r_scale) = match set
        .get_json::<Value>(set.swpc_url("/products/noaa-scales.json"))
        .await
    {
        Ok(doc) => decode_scales(&doc),
        Err(e) => {
            warn!(error = %e, "NOAA scales product failed");
            (None, None, None)
        }
    };

    Ok(GeomagData {
        kp_now: kp_now.or_else(|| kp_recent.last().map(|r| r.kp)),
        kp_recent,
        g_scale,
        s_scale,
        r_scale,
    })
}

/// GOES X-ray source: latest long-band (0.1-0.8 nm) flux.
pub(super) async fn fetch_xray(set: &FetchSet) -> Result<XrayData, FetchError> {
    let rows = set
        .get_json::<Vec<XrayRow>>(set.swpc_url("/json/goes/primary/xrays-6-hour.json"))
        .await?;

    let flux = rows
        .iter()
        .rev()
        .find(|r| r.energy.as_deref() == Some("0.1-0.8nm"))
        .and_then(|r| r.flux);

    Ok(XrayData { flux })
}

/// Solar-wind source: realtime and 7-day plasma and magnetometer tables.
///
/// Fails only when every feed fails; partial data is normal during
/// instrument gaps.
pub(super) async fn fetch_solar_wind(set: &FetchSet) -> Result<WindData, FetchError> {
    let (rt_plasma, rt_mag, wk_plasma, wk_mag) = tokio::join!(
        set.get_json::<Vec<Vec<Option<String>>>>(
            set.swpc_url("/products/solar-wind/plasma-5-minute.json")
        ),
        set.get_json::<Vec<Vec<Option<String>>>>(
            set.swpc_url("/products/solar-wind/mag-5-minute.json")
        ),
        set.get_json::<Vec<Vec<Option<String>>>>(
            set.swpc_url("/products/solar-wind/plasma-7-day.json")
        ),
        set.get_json::<Vec<Vec<Option<String>>>>(
            set.swpc_url("/products/solar-wind/mag-7-day.json")
        ),
    );

    if rt_plasma.is_err() && rt_mag.is_err() && wk_plasma.is_err() && wk_mag.is_err() {
        return Err(FetchError::AllFeedsFailed("solar wind".to_string()));
    }

    let data = WindData {
        realtime_wind: rt_plasma.ok().as_deref().and_then(decode_plasma_table),
        weekly_wind: wk_plasma.ok().as_deref().and_then(decode_plasma_table),
        realtime_mag: rt_mag.ok().as_deref().and_then(decode_mag_table),
        weekly_mag: wk_mag.ok().as_deref().and_then(decode_mag_table),
    };

    Ok(data)
}

/// SWPC products source: active regions, alert messages, 3-day forecast.
pub(super) async fn fetch_products(set: &FetchSet) -> Result<ProductData, FetchError> {
    let (regions, alerts, forecast) = tokio::join!(
        set.get_json::<Vec<RegionRow>>(set.swpc_url("/json/solar_regions.json")),
        set.get_json::<Vec<AlertRow>>(set.swpc_url("/products/alerts.json")),
        set.get_text(set.swpc_url("/text/3-day-forecast.txt")),
    );

    if regions.is_err() && alerts.is_err() && forecast.is_err() {
        return Err(FetchError::AllFeedsFailed("swpc products".to_string()));
    }

    Ok(ProductData {
        regions: regions.map(decode_regions).unwrap_or_else(|e| {
            warn!(error = %e, "solar regions feed failed");
            Vec::new()
        }),
        alerts: alerts.map(decode_alerts).unwrap_or_else(|e| {
            warn!(error = %e, "alerts product failed");
            Vec::new()
        }),
        forecast_3day: forecast.ok(),
    })
}

/// Decode the 3-hourly Kp header-row table, keeping the last 8 readings.
fn decode_kp_table(rows: &[Vec<Value>]) -> Vec<KpReading> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let time_col = find_column(header, "time_tag").unwrap_or(0);
    let kp_col = find_column(header, "Kp").unwrap_or(1);

    let mut readings: Vec<KpReading> = body
        .iter()
        .filter_map(|row| {
            let time = parse_feed_time(row.get(time_col)?.as_str()?)?;
            let kp = value_as_f64(row.get(kp_col)?)?;
            Some(KpReading { time, kp })
        })
        .collect();

    let keep = readings.len().saturating_sub(8);
    readings.drain(..keep);
    readings
}

/// Decode the newest complete row of a plasma table.
fn decode_plasma_table(rows: &[Vec<Option<String>>]) -> Option<SolarWind> {
    let (header, body) = rows.split_first()?;
    let density = find_named_column(header, "density")?;
    let speed = find_named_column(header, "speed")?;
    let temperature = find_named_column(header, "temperature")?;

    body.iter().rev().find_map(|row| {
        Some(SolarWind {
            speed: cell_as_f64(row, speed)?,
            density: cell_as_f64(row, density)?,
            temperature: cell_as_f64(row, temperature)?,
        })
    })
}

/// Decode the newest complete row of a magnetometer table.
fn decode_mag_table(rows: &[Vec<Option<String>>]) -> Option<MagneticField> {
    let (header, body) = rows.split_first()?;
    let bx = find_named_column(header, "bx_gsm")?;
    let by = find_named_column(header, "by_gsm")?;
    let bz = find_named_column(header, "bz_gsm")?;
    let bt = find_named_column(header, "bt")?;

    body.iter().rev().find_map(|row| {
        Some(MagneticField {
            bx: cell_as_f64(row, bx)?,
            by: cell_as_f64(row, by)?,
            bz: cell_as_f64(row, bz)?,
            bt: cell_as_f64(row, bt)?,
        })
    })
}

/// Keep only the most recent observation day and regions with a number.
fn decode_regions(rows: Vec<RegionRow>) -> Vec<ActiveRegion> {
    let latest_date = rows
        .iter()
        .filter_map(|r| r.observed_date.clone())
        .max();

    rows.into_iter()
        .filter(|r| r.observed_date == latest_date)
        .filter_map(|r| {
            Some(ActiveRegion {
                region_number: r.region?,
                location: r.location,
                magnetic_class: r.mag_class,
                number_spots: r.number_spots,
                flare_prob_c: r.c_flare_probability.unwrap_or(0.0),
                flare_prob_m: r.m_flare_probability.unwrap_or(0.0),
                flare_prob_x: r.x_flare_probability.unwrap_or(0.0),
                proton_prob: r.proton_probability.unwrap_or(0.0),
            })
        })
        .collect()
}

fn decode_alerts(rows: Vec<AlertRow>) -> Vec<ProductMessage> {
    rows.into_iter()
        .filter_map(|r| {
            let message = r.message?;
            let issued = r.issue_datetime.as_deref().unwrap_or("unknown");
            let product = r.product_id.clone();
            Some(ProductMessage {
                id: format!("{}:{issued}", product.as_deref().unwrap_or("?")),
                product_id: product,
                issue_time: r.issue_datetime.as_deref().and_then(parse_feed_time),
                message,
            })
        })
        .collect()
}

/// Turn the scale document's current entry into "G1"-style labels.
fn decode_scales(doc: &Value) -> (Option<String>, Option<String>, Option<String>) {
    let current = &doc["0"];
    let label = |key: &str| {
        current[key]["Scale"]
            .as_str()
            .map(|level| format!("{key}{level}"))
    };
    (label("G"), label("S"), label("R"))
}

fn find_column(header: &[Value], name: &str) -> Option<usize> {
    header.iter().position(|v| v.as_str() == Some(name))
}

fn find_named_column(header: &[Option<String>], name: &str) -> Option<usize> {
    header.iter().position(|v| v.as_deref() == Some(name))
}

fn cell_as_f64(row: &[Option<String>], index: usize) -> Option<f64> {
    row.get(index)?.as_deref()?.parse().ok()
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(raw: serde_json::Value) -> Vec<Vec<Option<String>>> {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_decode_kp_table_keeps_last_eight() {
        let mut rows = vec![vec![json!("time_tag"), json!("Kp"), json!("a_running")]];
        for hour in 0..12 {
            rows.push(vec![
                json!(format!("2026-08-01T{hour:02}:00:00")),
                json!(format!("{}.33", hour % 9)),
                json!("10"),
            ]);
        }
        let readings = decode_kp_table(&rows);
        assert_eq!(readings.len(), 8);
        assert_eq!(
            readings.last().unwrap().time.format("%H").to_string(),
            "11"
        );
    }

    #[test]
    fn test_decode_plasma_skips_incomplete_rows() {
        let rows = table(json!([
            ["time_tag", "density", "speed", "temperature"],
            ["2026-08-01T00:00:00", "4.5", "350.1", "98000"],
            ["2026-08-01T00:05:00", null, "360.0", "99000"]
        ]));
        let wind = decode_plasma_table(&rows).unwrap();
        // The newest row is missing density, so the older complete one wins.
        assert_eq!(wind.speed, 350.1);
        assert_eq!(wind.density, 4.5);
    }

    #[test]
    fn test_decode_mag_reads_named_columns() {
        let rows = table(json!([
            ["time_tag", "bx_gsm", "by_gsm", "bz_gsm", "lon_gsm", "lat_gsm", "bt"],
            ["2026-08-01T00:00:00", "1.2", "-3.4", "-12.5", "100", "10", "13.0"]
        ]));
        let mag = decode_mag_table(&rows).unwrap();
        assert_eq!(mag.bz, -12.5);
        assert_eq!(mag.bt, 13.0);
    }

    #[test]
    fn test_decode_scales() {
        let doc = json!({
            "0": {
                "DateStamp": "2026-08-01",
                "G": {"Scale": "1", "Text": "Minor"},
                "S": {"Scale": null},
                "R": {"Scale": "0"}
            }
        });
        let (g, s, r) = decode_scales(&doc);
        assert_eq!(g.as_deref(), Some("G1"));
        assert_eq!(s, None);
        assert_eq!(r.as_deref(), Some("R0"));
    }

    #[test]
    fn test_decode_regions_latest_day_only() {
        let rows = vec![
            RegionRow {
                observed_date: Some("2026-07-31".into()),
                region: Some(3660),
                location: None,
                mag_class: None,
                number_spots: None,
                c_flare_probability: None,
                m_flare_probability: None,
                x_flare_probability: None,
                proton_probability: None,
            },
            RegionRow {
                observed_date: Some("2026-08-01".into()),
                region: Some(3664),
                location: Some("N15W30".into()),
                mag_class: Some("BG".into()),
                number_spots: Some(12),
                c_flare_probability: Some(60.0),
                m_flare_probability: Some(35.0),
                x_flare_probability: Some(5.0),
                proton_probability: Some(1.0),
            },
        ];
        let regions = decode_regions(rows);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].region_number, 3664);
        assert_eq!(regions[0].flare_prob_m, 35.0);
    }
}
