//! Slack incoming-webhook notifier.
//!
//! Announces failed nodes (together with the output they produced) and the
//! start and end of runs that were started interactively. The token is the
//! trailing part of the webhook url (`T000/B000/XXXX`), as shown in the
//! channel's "Incoming WebHooks" configuration.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{LogTransport, WebhookTransport};
use crate::error::{ConfigError, ConfigResult};
use crate::events::{EventHandler, OutputFormat, PipelineEvent, format_node_path};
use crate::masks::PasswordMasks;

const WEBHOOK_BASE: &str = "https://hooks.slack.com/services/";

/// Output lines kept per node; older lines are dropped first.
const MAX_BUFFERED_LINES: usize = 100;

#[derive(Debug, Clone)]
struct OutputLine {
    message: String,
    format: OutputFormat,
    is_error: bool,
}

pub struct Slack {
    token: String,
    webhook_url: String,
    base_url: String,
    masks: PasswordMasks,
    transport: Arc<dyn WebhookTransport>,
    node_output: Mutex<HashMap<Vec<String>, Vec<OutputLine>>>,
}

impl Slack {
    pub fn new(token: impl Into<String>) -> ConfigResult<Self> {
        let token = token.into();
        validate_token(&token)?;

        Ok(Self {
            webhook_url: format!("{WEBHOOK_BASE}{token}"),
            token,
            base_url: String::new(),
            masks: PasswordMasks::default(),
            transport: Arc::new(LogTransport),
            node_output: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_password_masks(mut self, masks: PasswordMasks) -> Self {
        self.masks = masks;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn WebhookTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn password_masks(&self) -> &PasswordMasks {
        &self.masks
    }

    /// Forgets the output of every node below `run_path`, finished or not.
    fn discard_run_output(&self, run_path: &[String]) {
        self.node_output
            .lock()
            .retain(|node_path, _| !node_path.starts_with(run_path));
    }

    fn node_link(&self, node_path: &[String]) -> String {
        let label = if node_path.is_empty() {
            "root".to_string()
        } else {
            format_node_path(node_path)
        };
        if self.base_url.is_empty() {
            return label;
        }
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            format_node_path(node_path)
        );
        format!("<{url}|{label}>")
    }

    fn send(&self, payload: &Value) -> ConfigResult<()> {
        self.transport.post(&self.webhook_url, payload)
    }

    fn failure_message(&self, node_path: &[String], output: &[OutputLine]) -> Value {
        let mut blocks = vec![json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(":hankey: {} failed", self.node_link(node_path)),
            }
        })];

        let (errors, regular): (Vec<&OutputLine>, Vec<&OutputLine>) =
            output.iter().partition(|line| line.is_error);
        for (title, lines) in [("Output", regular), ("Error", errors)] {
            if lines.is_empty() {
                continue;
            }
            let text = lines
                .iter()
                .map(|line| self.render_line(line))
                .collect::<Vec<_>>()
                .join("\n");
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*{title}*\n```{text}```") }
            }));
        }

        json!({ "blocks": blocks })
    }

    fn render_line(&self, line: &OutputLine) -> String {
        let message = self.masks.mask(&line.message);
        match line.format {
            OutputFormat::Italics => format!("_{}_", message.trim_end()),
            OutputFormat::Standard | OutputFormat::Verbatim => message.trim_end().to_string(),
        }
    }
}

impl EventHandler for Slack {
    fn name(&self) -> &str {
        "slack"
    }

    fn handle_event(&self, event: &PipelineEvent) -> ConfigResult<()> {
        match event {
            PipelineEvent::Output {
                node_path,
                message,
                format,
                is_error,
                ..
            } => {
                let mut buffers = self.node_output.lock();
                let lines = buffers.entry(node_path.clone()).or_default();
                lines.push(OutputLine {
                    message: message.clone(),
                    format: *format,
                    is_error: *is_error,
                });
                if lines.len() > MAX_BUFFERED_LINES {
                    let excess = lines.len() - MAX_BUFFERED_LINES;
                    lines.drain(..excess);
                }
                Ok(())
            }

            PipelineEvent::NodeFinished {
                node_path,
                succeeded,
                ..
            } => {
                let output = self.node_output.lock().remove(node_path).unwrap_or_default();
                if *succeeded {
                    return Ok(());
                }
                debug!(node = %format_node_path(node_path), "Announcing failed node");
                self.send(&self.failure_message(node_path, &output))
            }

            PipelineEvent::RunStarted {
                node_path,
                interactively_started: true,
                user,
                ..
            } => {
                let who = user.as_deref().unwrap_or("Someone");
                let text = format!(
                    ":hatching_chick: {who} manually started {}",
                    self.node_link(node_path)
                );
                self.send(&json!({ "text": text }))
            }

            PipelineEvent::RunFinished {
                node_path,
                interactively_started,
                succeeded,
                ..
            } => {
                self.discard_run_output(node_path);
                if !*interactively_started {
                    return Ok(());
                }
                let text = if *succeeded {
                    format!(":tada: {} succeeded", self.node_link(node_path))
                } else {
                    format!(":baby_chick: {} failed", self.node_link(node_path))
                };
                self.send(&json!({ "text": text }))
            }

            PipelineEvent::RunStarted { .. } | PipelineEvent::NodeStarted { .. } => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Slack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slack")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("masks", &self.masks)
            .field("buffered_nodes", &self.node_output.lock().len())
            .finish_non_exhaustive()
    }
}

fn validate_token(token: &str) -> ConfigResult<()> {
    if token.trim().is_empty() {
        return Err(ConfigError::invalid_slack_token("token is empty"));
    }
    if let Some(bad) = token
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#'))
    {
        return Err(ConfigError::invalid_slack_token(format!(
            "token contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        posts: Mutex<Vec<(String, Value)>>,
    }

    impl WebhookTransport for RecordingTransport {
        fn post(&self, url: &str, payload: &Value) -> ConfigResult<()> {
            self.posts.lock().push((url.to_string(), payload.clone()));
            Ok(())
        }
    }

    fn path(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    fn finished(node_path: Vec<String>, succeeded: bool) -> PipelineEvent {
        let now = Utc::now();
        PipelineEvent::NodeFinished {
            node_path,
            start_time: now,
            end_time: now,
            is_pipeline: false,
            succeeded,
        }
    }

    fn slack_with_recorder() -> (Slack, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let slack = Slack::new("T000/B000/XXXX")
            .unwrap()
            .with_base_url("http://localhost:5000/pipelines/")
            .with_password_masks(PasswordMasks::new(["s3cret"]))
            .with_transport(transport.clone());
        (slack, transport)
    }

    #[test]
    fn test_webhook_url_from_token() {
        let slack = Slack::new("T000/B000/XXXX").unwrap();
        assert_eq!(
            slack.webhook_url(),
            "https://hooks.slack.com/services/T000/B000/XXXX"
        );
        assert_eq!(slack.token(), "T000/B000/XXXX");
    }

    #[test]
    fn test_invalid_tokens_are_rejected() {
        for token in ["", "   ", "T0 00", "T000?x=1", "T000#frag"] {
            let err = Slack::new(token).unwrap_err();
            assert!(err.is_construction_error(), "token {token:?}");
        }
    }

    #[test]
    fn test_failed_node_posts_masked_output() {
        let (slack, transport) = slack_with_recorder();
        let node = path(&["etl", "load"]);

        slack
            .handle_event(&PipelineEvent::output(node.clone(), "connecting with s3cret", false))
            .unwrap();
        slack
            .handle_event(&PipelineEvent::output(node.clone(), "relation missing", true))
            .unwrap();
        slack.handle_event(&finished(node, false)).unwrap();

        let posts = transport.posts.lock();
        assert_eq!(posts.len(), 1);
        let (url, payload) = &posts[0];
        assert_eq!(url, "https://hooks.slack.com/services/T000/B000/XXXX");

        let rendered = payload.to_string();
        assert!(rendered.contains("<http://localhost:5000/pipelines/etl/load|etl/load> failed"));
        assert!(rendered.contains("connecting with ***"));
        assert!(rendered.contains("relation missing"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_successful_node_is_silent_and_clears_buffer() {
        let (slack, transport) = slack_with_recorder();
        let node = path(&["etl"]);

        slack
            .handle_event(&PipelineEvent::output(node.clone(), "first attempt", false))
            .unwrap();
        slack.handle_event(&finished(node.clone(), true)).unwrap();
        slack.handle_event(&finished(node, false)).unwrap();

        let posts = transport.posts.lock();
        assert_eq!(posts.len(), 1);
        assert!(!posts[0].1.to_string().contains("first attempt"));
    }

    #[test]
    fn test_output_buffer_keeps_latest_lines() {
        let (slack, transport) = slack_with_recorder();
        let node = path(&["etl"]);

        for i in 0..(MAX_BUFFERED_LINES + 5) {
            slack
                .handle_event(&PipelineEvent::output(node.clone(), format!("line-{i}"), false))
                .unwrap();
        }
        slack.handle_event(&finished(node, false)).unwrap();

        let rendered = transport.posts.lock()[0].1.to_string();
        assert!(!rendered.contains("line-4\\n"));
        assert!(rendered.contains("line-5\\n"));
        assert!(rendered.contains(&format!("line-{}", MAX_BUFFERED_LINES + 4)));
    }

    #[test]
    fn test_interactive_runs_are_announced() {
        let (slack, transport) = slack_with_recorder();
        let now = Utc::now();

        slack
            .handle_event(&PipelineEvent::RunStarted {
                node_path: path(&["etl"]),
                start_time: now,
                pid: 1,
                is_root_pipeline: false,
                node_ids: vec![],
                interactively_started: true,
                user: Some("alice".to_string()),
            })
            .unwrap();
        slack
            .handle_event(&PipelineEvent::RunFinished {
                node_path: path(&["etl"]),
                end_time: now,
                succeeded: true,
                interactively_started: true,
            })
            .unwrap();
        slack
            .handle_event(&PipelineEvent::RunFinished {
                node_path: path(&["etl"]),
                end_time: now,
                succeeded: true,
                interactively_started: false,
            })
            .unwrap();

        let posts = transport.posts.lock();
        assert_eq!(posts.len(), 2);
        assert!(posts[0].1["text"].as_str().unwrap().contains("alice manually started"));
        assert!(posts[1].1["text"].as_str().unwrap().contains("succeeded"));
    }

    #[test]
    fn test_run_end_drops_unfinished_output() {
        let (slack, transport) = slack_with_recorder();
        let now = Utc::now();

        for run in 0..50 {
            let run_id = format!("run-{run}");
            let run_path = path(&["etl", run_id.as_str()]);
            let mut node = run_path.clone();
            node.push("load".to_string());
            slack
                .handle_event(&PipelineEvent::output(node, "interrupted", false))
                .unwrap();
            slack
                .handle_event(&PipelineEvent::RunFinished {
                    node_path: run_path,
                    end_time: now,
                    succeeded: false,
                    interactively_started: false,
                })
                .unwrap();
        }

        assert!(slack.node_output.lock().is_empty());
        assert!(transport.posts.lock().is_empty());
    }

    #[test]
    fn test_run_end_keeps_output_of_other_runs() {
        let (slack, _transport) = slack_with_recorder();

        slack
            .handle_event(&PipelineEvent::output(path(&["etl", "load"]), "a", false))
            .unwrap();
        slack
            .handle_event(&PipelineEvent::output(path(&["reports"]), "b", false))
            .unwrap();
        slack
            .handle_event(&PipelineEvent::RunFinished {
                node_path: path(&["etl"]),
                end_time: Utc::now(),
                succeeded: true,
                interactively_started: false,
            })
            .unwrap();

        let buffers = slack.node_output.lock();
        assert_eq!(buffers.len(), 1);
        assert!(buffers.contains_key(&path(&["reports"])));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let slack = Slack::new("T000/B000/SECRETXYZ").unwrap();
        let rendered = format!("{slack:?}");

        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("SECRETXYZ"));
        assert!(!rendered.contains("hooks.slack.com"));
    }
}
