//! Alert delivery for the heliowatch checker.
//!
//! This crate owns the alert model and a fire-and-try delivery layer:
//! each alert is routed by urgency to an ordered list of channels, and a
//! failing channel is logged without aborting the tick.
//!
//! # Usage
//!
//! ```no_run
//! use heliowatch_notify::Dispatcher;
//! use std::sync::Arc;
//!
//! # async fn run(alerts: Vec<heliowatch_notify::Alert>) {
//! let dispatcher = Dispatcher::from_env(Dispatcher::default_routing());
//! let summary = dispatcher.dispatch_all(&alerts).await;
//! println!("delivered {} of {}", summary.delivered, summary.attempted);
//! # }
//! ```

pub mod alert;
pub mod channels;
pub mod error;

pub use alert::{Alert, AlertKind, Urgency};
pub use channels::desktop::DesktopChannel;
pub use channels::signal::SignalChannel;
pub use channels::DeliveryChannel;
pub use error::ChannelError;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Outcome of dispatching one tick's alerts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchSummary {
    /// Channel sends attempted.
    pub attempted: usize,
    /// Channel sends that succeeded.
    pub delivered: usize,
}

/// Routes alerts to delivery channels by urgency.
pub struct Dispatcher {
    channels: HashMap<&'static str, Arc<dyn DeliveryChannel>>,
    routing: HashMap<Urgency, Vec<String>>,
}

impl Dispatcher {
    /// Create a dispatcher with the given routing table and no channels.
    #[must_use]
    pub fn new(routing: HashMap<Urgency, Vec<String>>) -> Self {
        Self {
            channels: HashMap::new(),
            routing,
        }
    }

    /// Create a dispatcher with the standard channels, auto-detected from
    /// environment variables. Unconfigured channels stay registered but
    /// disabled, so routing entries for them are skipped quietly.
    #[must_use]
    pub fn from_env(routing: HashMap<Urgency, Vec<String>>) -> Self {
        let mut dispatcher = Self::new(routing);
        dispatcher.register(Arc::new(SignalChannel::from_env()));
        dispatcher.register(Arc::new(DesktopChannel::from_env()));
        dispatcher
    }

    /// The default urgency routing table.
    #[must_use]
    pub fn default_routing() -> HashMap<Urgency, Vec<String>> {
        HashMap::from([
            (
                Urgency::Critical,
                vec!["signal".to_string(), "desktop".to_string()],
            ),
            (
                Urgency::High,
                vec!["signal".to_string(), "desktop".to_string()],
            ),
            (Urgency::Moderate, vec!["desktop".to_string()]),
            (Urgency::Info, vec!["desktop".to_string()]),
        ])
    }

    /// Register a channel under its own id.
    pub fn register(&mut self, channel: Arc<dyn DeliveryChannel>) {
        self.channels.insert(channel.id(), channel);
    }

    /// Number of enabled channels.
    #[must_use]
    pub fn enabled_channels(&self) -> usize {
        self.channels.values().filter(|c| c.enabled()).count()
    }

    /// Dispatch one tick's alerts.
    ///
    /// Non-info alerts go out individually in the order given. A single
    /// info alert also goes out alone; two or more info alerts are merged
    /// into one synthetic digest so a busy tick does not flood the user.
    pub async fn dispatch_all(&self, alerts: &[Alert]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let (info, rest): (Vec<&Alert>, Vec<&Alert>) =
            alerts.iter().partition(|a| a.urgency == Urgency::Info);

        for alert in rest {
            self.dispatch_one(alert, &mut summary).await;
        }

        match info.len() {
            0 => {}
            1 => self.dispatch_one(info[0], &mut summary).await,
            n => {
                let merged = Self::batch_info(&info, n);
                self.dispatch_one(&merged, &mut summary).await;
            }
        }

        summary
    }

    /// Merge several info alerts into one digest alert.
    fn batch_info(info: &[&Alert], n: usize) -> Alert {
        let titles: Vec<&str> = info.iter().map(|a| a.title.as_str()).collect();
        Alert::for_condition(
            AlertKind::InfoDigest,
            Urgency::Info,
            format!("{n} Space Weather Updates"),
            titles.join(" · "),
            Utc::now(),
        )
    }

    async fn dispatch_one(&self, alert: &Alert, summary: &mut DispatchSummary) {
        let Some(route) = self.routing.get(&alert.urgency) else {
            warn!(urgency = %alert.urgency, "No route configured for urgency");
            return;
        };

        for channel_id in route {
            let Some(channel) = self.channels.get(channel_id.as_str()) else {
                warn!(channel = %channel_id, "Route names an unregistered channel");
                continue;
            };
            if !channel.enabled() {
                debug!(channel = %channel_id, "Channel disabled, skipping");
                continue;
            }

            summary.attempted += 1;
            match channel.deliver(alert).await {
                Ok(()) => {
                    debug!(channel = %channel_id, alert = %alert.id, "Alert delivered");
                    summary.delivered += 1;
                }
                Err(e) => {
                    error!(
                        channel = %channel_id,
                        alert = %alert.id,
                        error = %e,
                        "Failed to deliver alert"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingChannel {
        id: &'static str,
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingChannel {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                seen: Mutex::new(vec![]),
                fail: false,
            })
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                seen: Mutex::new(vec![]),
                fail: true,
            })
        }
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
            self.seen.lock().unwrap().push(alert.title.clone());
            if self.fail {
                return Err(ChannelError::NotConfigured("boom".into()));
            }
            Ok(())
        }
    }

    fn info_alert(title: &str) -> Alert {
        Alert::for_condition(
            AlertKind::ActiveRegion,
            Urgency::Info,
            title.to_string(),
            String::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_single_info_goes_out_alone() {
        let channel = RecordingChannel::new("desktop");
        let mut dispatcher = Dispatcher::new(Dispatcher::default_routing());
        dispatcher.register(channel.clone());

        let summary = dispatcher.dispatch_all(&[info_alert("only one")]).await;

        assert_eq!(summary.delivered, 1);
        assert_eq!(*channel.seen.lock().unwrap(), vec!["only one".to_string()]);
    }

    #[tokio::test]
    async fn test_multiple_info_alerts_are_batched() {
        let channel = RecordingChannel::new("desktop");
        let mut dispatcher = Dispatcher::new(Dispatcher::default_routing());
        dispatcher.register(channel.clone());

        let alerts = vec![info_alert("Region 3664"), info_alert("Region 3667")];
        let summary = dispatcher.dispatch_all(&alerts).await;

        assert_eq!(summary.delivered, 1);
        let seen = channel.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], "2 Space Weather Updates");
    }

    #[tokio::test]
    async fn test_batched_body_joins_titles() {
        let a = info_alert("one");
        let b = info_alert("two");
        let merged = Dispatcher::batch_info(&[&a, &b], 2);
        assert_eq!(merged.body, "one · two");
        assert_eq!(merged.urgency, Urgency::Info);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_stop_others() {
        let bad = RecordingChannel::failing("signal");
        let good = RecordingChannel::new("desktop");
        let mut dispatcher = Dispatcher::new(Dispatcher::default_routing());
        dispatcher.register(bad);
        dispatcher.register(good.clone());

        let alert = Alert::for_condition(
            AlertKind::KpThreshold,
            Urgency::Critical,
            "Kp 8.0".into(),
            String::new(),
            Utc::now(),
        );
        let summary = dispatcher.dispatch_all(&[alert]).await;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(good.seen.lock().unwrap().len(), 1);
    }
}
