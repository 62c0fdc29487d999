//! Desktop notification channel via `notify-send`.

use async_trait::async_trait;
use tracing::debug;

use crate::alert::{Alert, Urgency};
use crate::error::ChannelError;
use crate::DeliveryChannel;

/// Environment variable that disables desktop notifications.
const ENV_DESKTOP_DISABLED: &str = "HELIOWATCH_DESKTOP_DISABLED";

/// Desktop notification channel.
///
/// Shells out to `notify-send`, which talks to whatever notification
/// daemon the user's session runs.
pub struct DesktopChannel {
    binary: String,
    disabled: bool,
}

impl DesktopChannel {
    /// Create a desktop channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_DESKTOP_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            debug!("Desktop notifications disabled via HELIOWATCH_DESKTOP_DISABLED");
        }

        Self {
            binary: "notify-send".to_string(),
            disabled,
        }
    }

    /// Create a desktop channel with an explicit helper binary.
    #[must_use]
    pub fn with_binary(binary: String) -> Self {
        Self {
            binary,
            disabled: false,
        }
    }

    /// Map alert urgency onto the notify-send urgency level.
    const fn urgency_level(urgency: Urgency) -> &'static str {
        match urgency {
            Urgency::Critical | Urgency::High => "critical",
            Urgency::Moderate => "normal",
            Urgency::Info => "low",
        }
    }
}

#[async_trait]
impl DeliveryChannel for DesktopChannel {
    fn id(&self) -> &'static str {
        "desktop"
    }

    fn enabled(&self) -> bool {
        !self.disabled
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        let status = tokio::process::Command::new(&self.binary)
            .arg("-u")
            .arg(Self::urgency_level(alert.urgency))
            .arg("-a")
            .arg("heliowatch")
            .arg(&alert.title)
            .arg(&alert.body)
            .status()
            .await?;

        if !status.success() {
            return Err(ChannelError::Rejected {
                status: u16::try_from(status.code().unwrap_or(-1)).unwrap_or(0),
                detail: "notify-send exited with failure".to_string(),
            });
        }

        debug!(alert = %alert.id, "Desktop notification shown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_mapping() {
        assert_eq!(DesktopChannel::urgency_level(Urgency::Critical), "critical");
        assert_eq!(DesktopChannel::urgency_level(Urgency::High), "critical");
        assert_eq!(DesktopChannel::urgency_level(Urgency::Moderate), "normal");
        assert_eq!(DesktopChannel::urgency_level(Urgency::Info), "low");
    }
}
