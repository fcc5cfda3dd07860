//! Bridge from the deprecated `slack_token` setting to the handler list.

use std::sync::Arc;
use tracing::warn;

use crate::error::ConfigResult;
use crate::events::EventHandler;
use crate::masks::PasswordMasks;
use crate::notification::Slack;

/// Settings a synthesized notifier inherits from the configuration.
#[derive(Debug, Clone, Default)]
pub struct NotifierSettings {
    pub base_url: String,
    pub password_masks: PasswordMasks,
}

/// Translates a legacy Slack token into at most one handler.
///
/// A missing or blank token yields an empty list. Only constructs the
/// handler, nothing is sent.
pub fn legacy_event_handlers(
    token: Option<&str>,
    settings: &NotifierSettings,
) -> ConfigResult<Vec<Arc<dyn EventHandler>>> {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        return Ok(Vec::new());
    };

    warn!("`slack_token` is deprecated, configure `event_handlers` instead");

    let slack = Slack::new(token)?
        .with_base_url(settings.base_url.clone())
        .with_password_masks(settings.password_masks.clone());

    Ok(vec![Arc::new(slack)])
}
