//! Signal messenger channel via a local signal-cli REST endpoint.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::alert::Alert;
use crate::error::ChannelError;
use crate::DeliveryChannel;

/// Environment variable for the signal-cli REST base URL.
const ENV_SIGNAL_API_URL: &str = "SIGNAL_API_URL";
/// Environment variable for the sending account number.
const ENV_SIGNAL_NUMBER: &str = "SIGNAL_NUMBER";
/// Environment variable for comma-separated recipient numbers.
const ENV_SIGNAL_RECIPIENTS: &str = "SIGNAL_RECIPIENTS";

const DEFAULT_API_URL: &str = "http://127.0.0.1:8686";

/// Request body for the signal-cli `/v2/send` endpoint.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: String,
    number: &'a str,
    recipients: &'a [String],
}

/// Signal messenger delivery channel.
pub struct SignalChannel {
    api_url: String,
    number: Option<String>,
    recipients: Vec<String>,
    client: reqwest::Client,
}

impl SignalChannel {
    /// Create a Signal channel from environment variables.
    ///
    /// The channel is disabled unless both `SIGNAL_NUMBER` and
    /// `SIGNAL_RECIPIENTS` are set.
    #[must_use]
    pub fn from_env() -> Self {
        let api_url =
            std::env::var(ENV_SIGNAL_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let number = std::env::var(ENV_SIGNAL_NUMBER).ok();
        let recipients: Vec<String> = std::env::var(ENV_SIGNAL_RECIPIENTS)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if number.is_some() && !recipients.is_empty() {
            debug!("Signal delivery enabled");
        } else {
            debug!("Signal delivery disabled (SIGNAL_NUMBER / SIGNAL_RECIPIENTS not set)");
        }

        Self {
            api_url,
            number,
            recipients,
            client: reqwest::Client::new(),
        }
    }

    /// Create a Signal channel with explicit settings.
    #[must_use]
    pub fn new(api_url: String, number: String, recipients: Vec<String>) -> Self {
        Self {
            api_url,
            number: Some(number),
            recipients,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(alert: &Alert) -> String {
        format!(
            "[{}] {}\n{}",
            alert.urgency.as_str().to_uppercase(),
            alert.title,
            alert.body
        )
    }
}

#[async_trait]
impl DeliveryChannel for SignalChannel {
    fn id(&self) -> &'static str {
        "signal"
    }

    fn enabled(&self) -> bool {
        self.number.is_some() && !self.recipients.is_empty()
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        let number = self
            .number
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured("SIGNAL_NUMBER not set".to_string()))?;

        let request = SendRequest {
            message: Self::format_message(alert),
            number,
            recipients: &self.recipients,
        };

        let response = self
            .client
            .post(format!("{}/v2/send", self.api_url))
            .timeout(Duration::from_secs(15))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".into());
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        debug!(alert = %alert.id, "Signal message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertKind, Urgency};
    use chrono::Utc;

    #[test]
    fn test_message_format() {
        let alert = Alert::for_condition(
            AlertKind::KpThreshold,
            Urgency::High,
            "Kp 5.3 — G1 Storm Threshold".into(),
            "Aurora possible at high latitudes.".into(),
            Utc::now(),
        );
        let msg = SignalChannel::format_message(&alert);
        assert!(msg.starts_with("[HIGH] Kp 5.3"));
        assert!(msg.contains("Aurora possible"));
    }

    #[test]
    fn test_disabled_without_recipients() {
        let channel = SignalChannel {
            api_url: DEFAULT_API_URL.into(),
            number: Some("+15550000000".into()),
            recipients: vec![],
            client: reqwest::Client::new(),
        };
        assert!(!channel.enabled());
    }
}
