use std::any::Any;
use tracing::{info, warn};

use crate::error::ConfigResult;
use crate::events::{EventHandler, PipelineEvent, format_node_path};
use crate::masks::PasswordMasks;

/// Echoes lifecycle events into the tracing log.
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier {
    masks: PasswordMasks,
}

impl ConsoleNotifier {
    pub fn new(masks: PasswordMasks) -> Self {
        Self { masks }
    }
}

impl EventHandler for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    fn handle_event(&self, event: &PipelineEvent) -> ConfigResult<()> {
        let node = format_node_path(event.node_path());

        match event {
            PipelineEvent::Output {
                message, is_error, ..
            } => {
                let message = self.masks.mask(message);
                if *is_error {
                    warn!(node = %node, "{}", message.trim_end());
                } else {
                    info!(node = %node, "{}", message.trim_end());
                }
            }
            _ if event.is_failure() => warn!(node = %node, event = event.kind(), "failed"),
            _ => info!(node = %node, event = event.kind()),
        }

        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_accepts_every_event() {
        let console = ConsoleNotifier::new(PasswordMasks::new(["pw"]));
        let now = chrono::Utc::now();
        let events = [
            PipelineEvent::output(vec!["etl".into()], "pw leaked", true),
            PipelineEvent::NodeStarted {
                node_path: vec!["etl".into()],
                start_time: now,
                is_pipeline: true,
            },
            PipelineEvent::RunFinished {
                node_path: vec![],
                end_time: now,
                succeeded: false,
                interactively_started: false,
            },
        ];

        for event in &events {
            assert!(console.handle_event(event).is_ok());
        }
        assert_eq!(console.name(), "console");
    }
}
