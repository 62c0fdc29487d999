//! Offline base-rate computation.
//!
//! Samples random windows across a multi-year event history and counts
//! how many contain at least one significant event (M+ flare, Kp >= 5
//! storm, Earth-directed CME). The live pipeline only ever reads the
//! persisted result.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use tracing::info;

use crate::evaluate::impact::flare_class_letter;
use crate::fetch::{donki, FetchSet};

/// How many days of history each DONKI request covers.
const CHUNK_DAYS: i64 = 120;

/// Result of a base-rate run.
#[derive(Debug, Clone, Copy)]
pub struct BaseRateOutcome {
    pub base_rate: f64,
    pub sample_windows: u64,
    pub events_considered: usize,
    pub span_days: i64,
}

/// Fetch the multi-year history and sample the base rate.
pub async fn compute_base_rate(
    set: &FetchSet,
    years: u32,
    samples: u64,
    window_hours: i64,
) -> Result<BaseRateOutcome> {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(i64::from(years) * 365);

    let events = fetch_significant_events(set, start, end).await?;
    info!(
        events = events.len(),
        span_days = (end - start).num_days(),
        "history loaded for base-rate sampling"
    );

    let span_start = start
        .and_hms_opt(0, 0, 0)
        .context("invalid span start")?
        .and_utc();
    let span_end = end.and_hms_opt(0, 0, 0).context("invalid span end")?.and_utc();

    let base_rate = sample_windows(
        &events,
        span_start,
        span_end,
        Duration::hours(window_hours),
        samples,
        &mut rand::thread_rng(),
    )
    .context("history span shorter than the verification window")?;

    Ok(BaseRateOutcome {
        base_rate,
        sample_windows: samples,
        events_considered: events.len(),
        span_days: (end - start).num_days(),
    })
}

/// Timestamps of every significant event in the range.
async fn fetch_significant_events(
    set: &FetchSet,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DateTime<Utc>>> {
    let mut events = Vec::new();
    let mut chunk_start = start;

    while chunk_start < end {
        let chunk_end = (chunk_start + Duration::days(CHUNK_DAYS)).min(end);

        let (flares, storms, cmes) = tokio::join!(
            donki::flares_between(set, chunk_start, chunk_end),
            donki::storms_between(set, chunk_start, chunk_end),
            donki::cmes_between(set, chunk_start, chunk_end),
        );

        for flare in flares.with_context(|| format!("flare history {chunk_start}"))? {
            let significant = flare
                .class_type
                .as_deref()
                .and_then(flare_class_letter)
                .is_some_and(|letter| letter == 'M' || letter == 'X');
            if significant {
                if let Some(t) = flare.event_time() {
                    events.push(t);
                }
            }
        }
        for storm in storms.with_context(|| format!("storm history {chunk_start}"))? {
            if storm.max_kp.is_some_and(|kp| kp >= 5.0) {
                if let Some(t) = storm.start_time {
                    events.push(t);
                }
            }
        }
        for cme in cmes.with_context(|| format!("CME history {chunk_start}"))? {
            if cme.earth_directed {
                if let Some(t) = cme.start_time {
                    events.push(t);
                }
            }
        }

        chunk_start = chunk_end;
    }

    events.sort_unstable();
    Ok(events)
}

/// Fraction of `samples` random windows containing at least one event.
/// Returns `None` when the span cannot fit a single window.
#[must_use]
pub fn sample_windows(
    events: &[DateTime<Utc>],
    span_start: DateTime<Utc>,
    span_end: DateTime<Utc>,
    window: Duration,
    samples: u64,
    rng: &mut impl Rng,
) -> Option<f64> {
    let latest_start = span_end - window;
    if latest_start <= span_start || samples == 0 {
        return None;
    }
    let range_secs = (latest_start - span_start).num_seconds();

    let mut containing = 0u64;
    for _ in 0..samples {
        let offset = rng.gen_range(0..=range_secs);
        let window_start = span_start + Duration::seconds(offset);
        let window_end = window_start + window;

        // Events are sorted; find the first at or after the window start.
        let idx = events.partition_point(|t| *t < window_start);
        if events.get(idx).is_some_and(|t| *t <= window_end) {
            containing += 1;
        }
    }

    Some(containing as f64 / samples as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ts(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    #[test]
    fn test_no_events_gives_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let rate = sample_windows(
            &[],
            ts("2020-01-01T00:00:00Z"),
            ts("2025-01-01T00:00:00Z"),
            Duration::hours(48),
            500,
            &mut rng,
        )
        .unwrap();
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn test_saturated_history_gives_one() {
        // An event every day means every 48h window contains one.
        let start = ts("2024-01-01T00:00:00Z");
        let events: Vec<_> = (0..400).map(|d| start + Duration::days(d)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let rate = sample_windows(
            &events,
            start,
            start + Duration::days(400),
            Duration::hours(48),
            500,
            &mut rng,
        )
        .unwrap();
        assert_eq!(rate, 1.0);
    }

    #[test]
    fn test_sparse_history_is_between() {
        // One event per 20 days: a 48h window hits roughly 10% of the time.
        let start = ts("2020-01-01T00:00:00Z");
        let events: Vec<_> = (0..100).map(|i| start + Duration::days(i * 20)).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let rate = sample_windows(
            &events,
            start,
            start + Duration::days(2000),
            Duration::hours(48),
            4000,
            &mut rng,
        )
        .unwrap();
        assert!(rate > 0.05 && rate < 0.2, "rate was {rate}");
    }

    #[test]
    fn test_span_shorter_than_window() {
        let start = ts("2026-01-01T00:00:00Z");
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sample_windows(
            &[],
            start,
            start + Duration::hours(24),
            Duration::hours(48),
            100,
            &mut rng,
        )
        .is_none());
    }
}
