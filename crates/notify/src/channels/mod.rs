//! Delivery channel implementations.

pub mod desktop;
pub mod signal;

use async_trait::async_trait;

use crate::alert::Alert;
use crate::error::ChannelError;

/// Trait for alert delivery channels (Signal, desktop, etc.).
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Routing id of this channel ("signal", "desktop").
    fn id(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Deliver one alert through this channel.
    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError>;
}
