//! Delivery channel seam.
//!
//! Concrete transports (push gateway, SMS provider, SMTP) live outside this
//! crate and plug in through [`DeliveryChannel`].

use async_trait::async_trait;

use super::types::{Channel, Notification};
use crate::error::Result;

/// A transport for one [`Channel`] kind.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// The channel kind this transport serves.
    fn kind(&self) -> Channel;

    /// Deliver one notification. Failures should be reported as
    /// [`crate::error::EngineError::Delivery`].
    async fn deliver(&self, owner: &str, notification: &Notification) -> Result<()>;
}

/// Writes every delivery to the tracing log. Stands in for a real transport.
#[derive(Debug, Clone, Copy)]
pub struct LogChannel {
    kind: Channel,
}

impl LogChannel {
    pub fn new(kind: Channel) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn kind(&self) -> Channel {
        self.kind
    }

    async fn deliver(&self, owner: &str, notification: &Notification) -> Result<()> {
        tracing::info!(
            channel = %self.kind,
            owner = %owner,
            kind = %notification.kind,
            priority = %notification.priority,
            title = %notification.title,
            "notification delivered"
        );
        Ok(())
    }
}
