//! End-to-end pipeline scenarios.
//!
//! Each test drives the real pipeline (assemble, evaluate, filter,
//! dispatch, state transition, save, verify) with synthetic fetch results
//! against a temp data directory, then asserts on the persisted state and
//! the alerts a recording channel saw.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use heliowatch_checker::config::CheckerConfig;
use heliowatch_checker::fetch::{
    DonkiData, FetchResults, GeomagData, ProductData, WindData, XrayData,
};
use heliowatch_checker::model::{CmeSignature, FlareEvent, MagneticField, SolarWind};
use heliowatch_checker::pipeline::Checker;
use heliowatch_checker::predict::{
    FilePredictionStorage, PredictionState, PredictionStatus, PredictionStorage,
};
use heliowatch_checker::state::{CheckerState, StateStore};
use heliowatch_notify::{Alert, AlertKind, ChannelError, DeliveryChannel, Dispatcher, Urgency};

/// Channel that records everything it is asked to deliver.
struct RecordingChannel {
    id: &'static str,
    seen: Arc<Mutex<Vec<Alert>>>,
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn id(&self) -> &'static str {
        self.id
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        self.seen.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// A checker wired against a temp dir plus handles for assertions.
struct Harness {
    _dir: TempDir,
    checker: Checker,
    store: StateStore,
    prediction_path: std::path::PathBuf,
    seen: Arc<Mutex<Vec<Alert>>>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = CheckerConfig::with_defaults(dir.path());
        let store = StateStore::new(&config);
        let prediction_path = config.prediction_path();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(Dispatcher::default_routing());
        dispatcher.register(Arc::new(RecordingChannel {
            id: "desktop",
            seen: seen.clone(),
        }));
        dispatcher.register(Arc::new(RecordingChannel {
            id: "signal",
            seen: seen.clone(),
        }));

        let storage = Box::new(FilePredictionStorage::new(prediction_path.clone()));
        Self {
            checker: Checker::new(config, dispatcher, storage),
            store,
            prediction_path,
            seen,
            _dir: dir,
        }
    }

    async fn tick(&self, state: &mut CheckerState, results: FetchResults, now: DateTime<Utc>) {
        // Noon local hour: quiet hours are disabled by default anyway.
        self.checker
            .process_tick(results, state, &self.store, now, 12)
            .await;
    }

    /// Alerts of a given kind the channels saw, deduplicated across the
    /// signal and desktop routes.
    fn seen_of_kind(&self, kind: AlertKind) -> Vec<Alert> {
        let mut seen: Vec<Alert> = Vec::new();
        for alert in self.seen.lock().unwrap().iter() {
            if alert.kind == kind && !seen.iter().any(|s| s.id == alert.id) {
                seen.push(alert.clone());
            }
        }
        seen
    }

    fn seen_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// All five sources healthy, with the given basics.
fn quiet_results(kp: f64, bz: f64, speed: f64, density: f64) -> FetchResults {
    FetchResults {
        geomag: Ok(GeomagData {
            kp_now: Some(kp),
            ..GeomagData::default()
        }),
        xray: Ok(XrayData { flux: Some(1.5e-7) }),
        wind: Ok(WindData {
            realtime_wind: Some(SolarWind {
                speed,
                density,
                temperature: 1e5,
            }),
            realtime_mag: Some(MagneticField {
                bx: 1.0,
                by: 0.0,
                bz,
                bt: bz.abs() + 2.0,
            }),
            weekly_wind: None,
            weekly_mag: None,
        }),
        donki: Ok(DonkiData::default()),
        products: Ok(ProductData::default()),
        fetched_at: Utc::now(),
    }
}

fn cme(id: &str, predicted_kp: Option<f64>, arrival: Option<DateTime<Utc>>) -> CmeSignature {
    CmeSignature {
        id: id.to_string(),
        start_time: Some(Utc::now() - Duration::hours(6)),
        speed: Some(1100.0),
        predicted_kp,
        predicted_arrival: arrival,
        earth_directed: true,
    }
}

#[tokio::test]
async fn scenario_first_run_quiet_sky() {
    let harness = Harness::new();
    let mut state = harness.store.load();
    let now = Utc::now();

    harness
        .tick(&mut state, quiet_results(2.0, -1.0, 350.0, 5.0), now)
        .await;

    assert_eq!(harness.seen_count(), 0);

    let saved = harness.store.load();
    assert_eq!(saved.last_kp, Some(2.0));
    assert!(!saved.kp_was_above5);
    assert_eq!(saved.data_health.len(), 5);
    assert!(saved.data_health.values().all(|h| h.ok));
    assert_eq!(saved.last_run_at, Some(now));
}

#[tokio::test]
async fn scenario_kp_crosses_storm_threshold() {
    let harness = Harness::new();
    let mut state = CheckerState {
        last_kp: Some(4.0),
        ..CheckerState::default()
    };
    let now = Utc::now();

    harness
        .tick(&mut state, quiet_results(5.3, -1.0, 350.0, 5.0), now)
        .await;

    let alerts = harness.seen_of_kind(AlertKind::KpThreshold);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].title, "Kp 5.3 — G1 Storm Threshold");
    assert_eq!(alerts[0].urgency, Urgency::High);

    let saved = harness.store.load();
    assert!(saved.kp_was_above5);
    assert!(saved.last_cooldowns.contains_key("kp-threshold"));
    assert_eq!(saved.alerts_sent.len(), 1);
}

#[tokio::test]
async fn scenario_recrossing_suppressed_by_cooldown() {
    let harness = Harness::new();
    let mut state = CheckerState {
        last_kp: Some(4.0),
        ..CheckerState::default()
    };
    let first_tick = Utc::now() - Duration::minutes(30);

    harness
        .tick(&mut state, quiet_results(5.3, -1.0, 350.0, 5.0), first_tick)
        .await;
    assert_eq!(harness.seen_of_kind(AlertKind::KpThreshold).len(), 1);

    // Kp dipped to 4.9 between ticks, then re-crossed half an hour later.
    state.last_kp = Some(4.9);
    state.kp_was_above5 = false;
    let second_tick = first_tick + Duration::minutes(30);

    harness
        .tick(&mut state, quiet_results(5.4, -1.0, 350.0, 5.0), second_tick)
        .await;

    // Still exactly one dispatched kp alert; the re-cross was swallowed.
    assert_eq!(harness.seen_of_kind(AlertKind::KpThreshold).len(), 1);
    let saved = harness.store.load();
    assert_eq!(saved.last_kp, Some(5.4));
    assert_eq!(saved.alerts_sent.len(), 1);
}

#[tokio::test]
async fn scenario_new_earth_directed_cme() {
    let harness = Harness::new();
    let mut state = harness.store.load();
    let now = Utc::now();
    let arrival = now + Duration::hours(18);

    let mut results = quiet_results(2.0, -1.0, 350.0, 5.0);
    results.donki = Ok(DonkiData {
        cmes: vec![cme("X1", Some(8.0), Some(arrival))],
        ..DonkiData::default()
    });

    harness.tick(&mut state, results, now).await;

    let alerts = harness.seen_of_kind(AlertKind::CmeEarth);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].urgency, Urgency::Critical);
    assert!(alerts[0].body.contains("~18h"));
    assert!(alerts[0].body.contains("G4 storm"));

    let saved = harness.store.load();
    assert_eq!(saved.known_cmes.len(), 1);
    assert_eq!(saved.known_cmes[0].id, "X1");
    assert_eq!(saved.known_cmes[0].predicted_kp, Some(8.0));
    assert_eq!(saved.known_cmes[0].predicted_arrival, Some(arrival));
}

#[tokio::test]
async fn scenario_cme_forecast_revision() {
    let harness = Harness::new();
    let mut state = harness.store.load();
    let t0 = Utc::now() - Duration::hours(2);

    let mut results = quiet_results(2.0, -1.0, 350.0, 5.0);
    results.donki = Ok(DonkiData {
        cmes: vec![cme("X1", Some(8.0), None)],
        ..DonkiData::default()
    });
    harness.tick(&mut state, results, t0).await;
    assert_eq!(harness.seen_of_kind(AlertKind::CmeEarth).len(), 1);

    // Downward revision: 8 -> 6 stays silent.
    let mut downgraded = state.clone();
    let mut results = quiet_results(2.0, -1.0, 350.0, 5.0);
    results.donki = Ok(DonkiData {
        cmes: vec![cme("X1", Some(6.0), None)],
        ..DonkiData::default()
    });
    harness
        .tick(&mut downgraded, results, t0 + Duration::hours(1))
        .await;
    assert!(harness.seen_of_kind(AlertKind::CmeRevision).is_empty());

    // Upward revision: 8 -> 10 alerts critically.
    let mut results = quiet_results(2.0, -1.0, 350.0, 5.0);
    results.donki = Ok(DonkiData {
        cmes: vec![cme("X1", Some(10.0), None)],
        ..DonkiData::default()
    });
    harness
        .tick(&mut state, results, t0 + Duration::hours(1))
        .await;

    let revisions = harness.seen_of_kind(AlertKind::CmeRevision);
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].urgency, Urgency::Critical);
}

#[tokio::test]
async fn scenario_all_clear_fires_once() {
    let harness = Harness::new();
    let mut state = CheckerState {
        last_kp: Some(6.1),
        kp_was_above5: true,
        ..CheckerState::default()
    };
    let now = Utc::now();

    harness
        .tick(&mut state, quiet_results(3.5, -1.0, 350.0, 5.0), now)
        .await;

    let all_clears = harness.seen_of_kind(AlertKind::AllClear);
    assert_eq!(all_clears.len(), 1);
    assert_eq!(all_clears[0].urgency, Urgency::Moderate);

    // Next tick, still calm: the recovery must not repeat.
    harness
        .tick(
            &mut state,
            quiet_results(3.0, -1.0, 350.0, 5.0),
            now + Duration::minutes(15),
        )
        .await;
    assert_eq!(harness.seen_of_kind(AlertKind::AllClear).len(), 1);

    let saved = harness.store.load();
    assert!(!saved.kp_was_above5);
}

#[tokio::test]
async fn scenario_prediction_verification() {
    let harness = Harness::new();
    let now = Utc::now();
    let submitted = now - Duration::hours(48) - Duration::minutes(1);

    // A prediction whose window closed a minute ago.
    let mut predictions = PredictionState::default();
    predictions.submit(Some("something big".into()), submitted);
    FilePredictionStorage::new(harness.prediction_path.clone())
        .save(&predictions)
        .await
        .unwrap();

    // An M2.1 flare peaked inside the window.
    let flare_time = submitted + Duration::hours(12);
    let mut results = quiet_results(2.0, -1.0, 350.0, 5.0);
    results.donki = Ok(DonkiData {
        flares: vec![FlareEvent {
            id: "2026-08-01T10:00:00-FLR-001".into(),
            class_type: Some("M2.1".into()),
            begin_time: Some(flare_time),
            peak_time: Some(flare_time),
            source_location: Some("N15W30".into()),
            active_region: Some(3664),
        }],
        ..DonkiData::default()
    });

    let mut state = harness.store.load();
    harness.tick(&mut state, results, now).await;

    let reloaded = FilePredictionStorage::new(harness.prediction_path.clone())
        .load()
        .await
        .unwrap();
    let prediction = &reloaded.predictions[0];
    assert_eq!(prediction.status, PredictionStatus::Hit);
    assert_eq!(prediction.matched_events.len(), 1);
    assert_eq!(prediction.matched_events[0].event_type, "flare");
    assert_eq!(prediction.matched_events[0].description, "M2.1 Flare");
    assert!(prediction.verified_at.unwrap() >= prediction.window_end);

    let notices = harness.seen_of_kind(AlertKind::PredictionResult);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].urgency, Urgency::Info);
    assert!(notices[0].title.contains("Hit"));
}

#[tokio::test]
async fn scenario_failed_source_keeps_tick_alive() {
    let harness = Harness::new();
    let mut state = CheckerState {
        last_kp: Some(4.0),
        ..CheckerState::default()
    };
    let now = Utc::now();

    let mut results = quiet_results(5.3, -1.0, 350.0, 5.0);
    results.donki = Err(heliowatch_checker::fetch::FetchError::AllFeedsFailed(
        "donki catalog".into(),
    ));

    harness.tick(&mut state, results, now).await;

    // The Kp alert still went out despite the dead source.
    assert_eq!(harness.seen_of_kind(AlertKind::KpThreshold).len(), 1);
    let saved = harness.store.load();
    assert!(!saved.data_health["donki"].ok);
    assert!(saved.data_health["geomag"].ok);
}

#[tokio::test]
async fn scenario_info_alerts_batched() {
    let harness = Harness::new();
    let mut state = harness.store.load();
    let now = Utc::now();

    // Two fresh watch-worthy regions produce two info alerts, which the
    // dispatcher merges into one digest.
    let region = |n: u32| heliowatch_checker::model::ActiveRegion {
        region_number: n,
        location: Some("N15W30".into()),
        magnetic_class: Some("BG".into()),
        number_spots: Some(10),
        flare_prob_c: 60.0,
        flare_prob_m: 40.0,
        flare_prob_x: 2.0,
        proton_prob: 1.0,
    };
    let mut results = quiet_results(2.0, -1.0, 350.0, 5.0);
    results.products = Ok(ProductData {
        regions: vec![region(3664), region(3667)],
        ..ProductData::default()
    });

    harness.tick(&mut state, results, now).await;

    let digests = harness.seen_of_kind(AlertKind::InfoDigest);
    assert_eq!(digests.len(), 1);
    assert_eq!(digests[0].title, "2 Space Weather Updates");
    assert!(harness.seen_of_kind(AlertKind::ActiveRegion).is_empty());

    // State remembers the original alerts, not the synthetic digest.
    let saved = harness.store.load();
    assert_eq!(saved.alerts_sent.len(), 2);
    assert!(saved
        .alerts_sent
        .iter()
        .all(|a| a.kind == AlertKind::ActiveRegion));
    assert_eq!(saved.known_region_numbers.len(), 2);
}
