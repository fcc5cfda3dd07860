//! Notification backends that can be registered as event handlers.

pub mod console;
pub mod slack;

pub use console::ConsoleNotifier;
pub use slack::Slack;

use serde_json::Value;
use std::fmt::Debug;
use tracing::info;

use crate::error::ConfigResult;

/// Delivers a chat payload to a webhook url.
///
/// Network delivery belongs to the embedding application; notifiers only
/// build payloads and hand them over.
pub trait WebhookTransport: Send + Sync + Debug {
    fn post(&self, url: &str, payload: &Value) -> ConfigResult<()>;
}

/// Records payloads in the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl WebhookTransport for LogTransport {
    fn post(&self, url: &str, payload: &Value) -> ConfigResult<()> {
        // The url embeds the webhook secret; log the host only.
        let host = url.split('/').nth(2).unwrap_or_default();
        info!(webhook_host = host, payload = %payload, "Webhook notification");
        Ok(())
    }
}
