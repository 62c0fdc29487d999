//! The per-tick pipeline.
//!
//! One invocation: truncate logs, take the lock, load state, fetch,
//! assemble, evaluate, filter, dispatch, fold into state, save, verify
//! predictions, release. The external scheduler provides the cadence.

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use tracing::{info, warn};

use heliowatch_notify::{Alert, AlertKind, Dispatcher, Urgency};

use crate::config::CheckerConfig;
use crate::evaluate;
use crate::fetch::{FetchResults, FetchSet};
use crate::filter;
use crate::lock::{Acquisition, LockManager};
use crate::logs;
use crate::model::Snapshot;
use crate::predict::{Prediction, PredictionStatus, PredictionStorage, SubmitOutcome};
use crate::snapshot::assemble;
use crate::state::StateStore;

/// What one tick did.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Another live checker held the lock; nothing ran.
    pub lock_busy: bool,
    /// Healthy sources out of five.
    pub sources_ok: usize,
    /// Candidate alerts out of the evaluator.
    pub candidates: usize,
    /// Alerts that survived cooldowns and quiet hours.
    pub dispatched: usize,
    /// Channel sends that succeeded.
    pub delivered: usize,
    /// Predictions decided this tick.
    pub verified: usize,
}

/// The checker, wired once per invocation.
pub struct Checker {
    config: CheckerConfig,
    dispatcher: Dispatcher,
    predictions: Box<dyn PredictionStorage>,
}

impl Checker {
    #[must_use]
    pub fn new(
        config: CheckerConfig,
        dispatcher: Dispatcher,
        predictions: Box<dyn PredictionStorage>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            predictions,
        }
    }

    /// Run one full tick against the live feeds.
    pub async fn run_tick(&self) -> Result<TickSummary> {
        let now = Utc::now();
        let local_hour = chrono::Local::now().hour();

        if let Err(e) = logs::truncate_oversized(&self.config.log_path(), self.config.max_log_size)
        {
            warn!(error = %e, "log truncation failed, continuing");
        }

        let manager = LockManager::new(self.config.lock_path(), self.config.lock_timeout);
        let guard = match manager.acquire(now)? {
            Acquisition::Busy { holder_pid, age } => {
                info!(
                    holder_pid,
                    age_secs = age.as_secs(),
                    "another checker is running, skipping this tick"
                );
                return Ok(TickSummary {
                    lock_busy: true,
                    ..TickSummary::default()
                });
            }
            Acquisition::Acquired(guard) => guard,
        };

        let store = StateStore::new(&self.config);
        let mut state = store.load();

        let summary = match FetchSet::new(&self.config) {
            Ok(fetch_set) => {
                let results = fetch_set.fetch_all().await;
                let summary = self
                    .process_tick(results, &mut state, &store, now, local_hour)
                    .await;
                guard.release()?;
                summary
            }
            Err(e) => {
                // Even a tick that cannot fetch stamps its run time.
                state.last_run_at = Some(now);
                if let Err(save_err) = store.save(&mut state) {
                    warn!(error = %save_err, "state save failed after fetch setup failure");
                }
                guard.release()?;
                return Err(e.into());
            }
        };

        Ok(summary)
    }

    /// Everything after the fetch fan-in. Exposed separately so tests can
    /// drive the pipeline with synthetic fetch results.
    pub async fn process_tick(
        &self,
        results: FetchResults,
        state: &mut crate::state::CheckerState,
        store: &StateStore,
        now: DateTime<Utc>,
        local_hour: u32,
    ) -> TickSummary {
        let assembled = assemble(&results, state, now);
        let sources_ok = assembled.health.values().filter(|h| h.ok).count();

        let candidates = evaluate::evaluate(
            &assembled.snapshot,
            &assembled.regions,
            state,
            &self.config,
            now,
        );
        let candidate_count = candidates.len();

        let filtered = filter::apply(candidates, state, &self.config, now, local_hour);
        info!(
            candidates = candidate_count,
            dispatching = filtered.len(),
            sources_ok,
            "tick evaluated"
        );

        let delivery = self.dispatcher.dispatch_all(&filtered).await;

        state.apply_tick(
            &assembled.snapshot,
            &assembled.regions,
            &filtered,
            assembled.health,
            now,
        );

        // A failed save keeps the prior file; the tick is still complete.
        if let Err(e) = store.save(state) {
            warn!(error = %e, "state save failed, prior state file kept");
        }

        // Verification must not touch checker state; its failures stay its own.
        let verified = match self.verify_predictions(state, &assembled.snapshot, now).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "prediction verification failed, continuing");
                0
            }
        };

        TickSummary {
            lock_busy: false,
            sources_ok,
            candidates: candidate_count,
            dispatched: filtered.len(),
            delivered: delivery.delivered,
            verified,
        }
    }

    /// Verify due predictions and notify the user of results.
    async fn verify_predictions(
        &self,
        state: &crate::state::CheckerState,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut predictions = self.predictions.load().await?;
        let decided = predictions.verify_due(state, snapshot, now);
        if decided.is_empty() {
            return Ok(0);
        }
        self.predictions.save(&predictions).await?;

        let notifications: Vec<Alert> = decided.iter().map(|p| result_alert(p, now)).collect();
        self.dispatcher.dispatch_all(&notifications).await;

        Ok(decided.len())
    }

    /// Submit a prediction through the configured storage.
    pub async fn submit_prediction(&self, note: Option<String>) -> Result<SubmitOutcome> {
        let mut predictions = self.predictions.load().await?;
        let outcome = predictions.submit(note, Utc::now());
        if matches!(outcome, SubmitOutcome::Accepted(_)) {
            self.predictions.save(&predictions).await?;
        }
        Ok(outcome)
    }

    #[must_use]
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }
}

/// User-facing notification for a freshly decided prediction.
fn result_alert(prediction: &Prediction, now: DateTime<Utc>) -> Alert {
    let (verdict, body) = match prediction.status {
        PredictionStatus::Hit => {
            let events: Vec<String> = prediction
                .matched_events
                .iter()
                .map(|e| e.description.clone())
                .collect();
            (
                "Hit",
                format!(
                    "{} event(s) inside your {}h window: {}.",
                    prediction.matched_events.len(),
                    prediction.window_hours,
                    events.join("; ")
                ),
            )
        }
        PredictionStatus::Miss => (
            "Miss",
            format!(
                "No significant events inside your {}h window.",
                prediction.window_hours
            ),
        ),
        PredictionStatus::Pending => ("Pending", String::new()),
    };

    let mut body = body;
    if let Some(note) = &prediction.note {
        body = format!("\u{201c}{note}\u{201d} — {body}");
    }

    Alert {
        id: format!("prediction-result-{}", prediction.id),
        kind: AlertKind::PredictionResult,
        urgency: Urgency::Info,
        title: format!("Prediction Verified — {verdict}"),
        body,
        timestamp: now,
        source_event_id: Some(prediction.id.clone()),
    }
}
