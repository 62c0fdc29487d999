//! Resilient multi-source fetching.
//!
//! One fetcher per upstream source, all invoked concurrently with
//! independent deadlines. A failing source yields a [`FetchError`] that the
//! snapshot assembler turns into substitutes and a health entry; it never
//! aborts the tick.

pub mod donki;
pub mod swpc;

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::CheckerConfig;
use crate::model::{
    ActiveRegion, CmeSignature, FlareEvent, HssEvent, IpsEvent, KpReading, MagneticField,
    MpcEvent, ProductMessage, SepEvent, SolarWind, StormEvent,
};

/// Errors a single fetcher can produce.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("decode failed for {url}: {detail}")]
    Decode { url: String, detail: String },

    #[error("all feeds for this source failed: {0}")]
    AllFeedsFailed(String),
}

/// The five upstream sources tracked in `dataHealth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceId {
    Geomag,
    Xray,
    SolarWind,
    Donki,
    SwpcProducts,
}

impl SourceId {
    /// All sources, in health-report order.
    pub const ALL: [SourceId; 5] = [
        SourceId::Geomag,
        SourceId::Xray,
        SourceId::SolarWind,
        SourceId::Donki,
        SourceId::SwpcProducts,
    ];

    /// Health-map key for this source.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Geomag => "geomag",
            Self::Xray => "xray",
            Self::SolarWind => "solar-wind",
            Self::Donki => "donki",
            Self::SwpcProducts => "swpc-products",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the geomagnetic source.
#[derive(Debug, Clone, Default)]
pub struct GeomagData {
    pub kp_now: Option<f64>,
    /// Recent 3-hourly readings, newest last, at most 8.
    pub kp_recent: Vec<KpReading>,
    pub g_scale: Option<String>,
    pub s_scale: Option<String>,
    pub r_scale: Option<String>,
}

/// Output of the GOES X-ray source.
#[derive(Debug, Clone, Default)]
pub struct XrayData {
    /// Latest long-band flux, W/m².
    pub flux: Option<f64>,
}

/// Output of the solar-wind source (plasma + magnetometer).
#[derive(Debug, Clone, Default)]
pub struct WindData {
    pub realtime_wind: Option<SolarWind>,
    pub weekly_wind: Option<SolarWind>,
    pub realtime_mag: Option<MagneticField>,
    pub weekly_mag: Option<MagneticField>,
}

/// Output of the DONKI event catalog source.
#[derive(Debug, Clone, Default)]
pub struct DonkiData {
    pub cmes: Vec<CmeSignature>,
    pub flares: Vec<FlareEvent>,
    pub storms: Vec<StormEvent>,
    pub hss: Vec<HssEvent>,
    pub seps: Vec<SepEvent>,
    pub ips: Vec<IpsEvent>,
    pub mpc: Vec<MpcEvent>,
}

/// Output of the SWPC products source (regions, alert messages, forecast).
#[derive(Debug, Clone, Default)]
pub struct ProductData {
    pub regions: Vec<ActiveRegion>,
    pub alerts: Vec<ProductMessage>,
    pub forecast_3day: Option<String>,
}

/// Everything one tick fetched, successful or not.
#[derive(Debug)]
pub struct FetchResults {
    pub geomag: Result<GeomagData, FetchError>,
    pub xray: Result<XrayData, FetchError>,
    pub wind: Result<WindData, FetchError>,
    pub donki: Result<DonkiData, FetchError>,
    pub products: Result<ProductData, FetchError>,
    pub fetched_at: DateTime<Utc>,
}

/// The fetcher set for one checker invocation.
pub struct FetchSet {
    client: Client,
    swpc_base: String,
    donki_base: String,
    timeout: Duration,
}

impl FetchSet {
    /// Build the fetcher set from configuration.
    pub fn new(config: &CheckerConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("heliowatch/", env!("CARGO_PKG_VERSION")))
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            client,
            swpc_base: config.swpc_base.trim_end_matches('/').to_string(),
            donki_base: config.donki_base.trim_end_matches('/').to_string(),
            timeout: config.fetch_timeout,
        })
    }

    /// Run all five fetchers concurrently. Never fails as a whole.
    pub async fn fetch_all(&self) -> FetchResults {
        let (geomag, xray, wind, donki, products) = tokio::join!(
            self.guarded(SourceId::Geomag, swpc::fetch_geomag(self)),
            self.guarded(SourceId::Xray, swpc::fetch_xray(self)),
            self.guarded(SourceId::SolarWind, swpc::fetch_solar_wind(self)),
            self.guarded(SourceId::Donki, donki::fetch_recent(self)),
            self.guarded(SourceId::SwpcProducts, swpc::fetch_products(self)),
        );

        FetchResults {
            geomag,
            xray,
            wind,
            donki,
            products,
            fetched_at: Utc::now(),
        }
    }

    /// Apply the per-source deadline and log the outcome.
    async fn guarded<T>(
        &self,
        source: SourceId,
        fut: impl std::future::Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        // Each feed request already carries the client timeout; this outer
        // deadline bounds multi-request sources as a unit.
        let deadline = self.timeout * 3;
        let result = match tokio::time::timeout(deadline, fut).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout(deadline)),
        };
        match &result {
            Ok(_) => debug!(source = %source, "fetch ok"),
            Err(e) => debug!(source = %source, error = %e, "fetch failed"),
        }
        result
    }

    /// GET a JSON document.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        response.json::<T>().await.map_err(|e| FetchError::Decode {
            url,
            detail: e.to_string(),
        })
    }

    /// GET a plain-text document.
    pub(crate) async fn get_text(&self, url: String) -> Result<String, FetchError> {
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }

    pub(crate) fn swpc_url(&self, path: &str) -> String {
        format!("{}{path}", self.swpc_base)
    }

    pub(crate) fn donki_url(&self, resource: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/{resource}?startDate={}&endDate={}",
            self.donki_base,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        )
    }
}

/// Parse the assorted timestamp shapes the upstream feeds use.
///
/// Accepts `2026-08-01T12:09Z`, `2026-08-01T12:09:30Z`,
/// `2026-08-01T12:09:30`, and `2026-08-01 12:09:30.000`.
#[must_use]
pub fn parse_feed_time(raw: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%MZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_time_variants() {
        for raw in [
            "2026-08-01T12:09Z",
            "2026-08-01T12:09:30Z",
            "2026-08-01T12:09:30",
            "2026-08-01 12:09:30.000",
        ] {
            let parsed = parse_feed_time(raw);
            assert!(parsed.is_some(), "failed to parse {raw}");
            assert_eq!(parsed.unwrap().format("%Y-%m-%d").to_string(), "2026-08-01");
        }
        assert!(parse_feed_time("not a time").is_none());
    }

    #[test]
    fn test_source_keys_are_stable() {
        let keys: Vec<&str> = SourceId::ALL.iter().map(SourceId::as_str).collect();
        assert_eq!(
            keys,
            ["geomag", "xray", "solar-wind", "donki", "swpc-products"]
        );
    }
}
