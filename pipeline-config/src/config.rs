//! src/config.rs
//! ============================================================================
//! # PipelineConfig: Configuration of data integration pipelines
//!
//! Every setting the pipeline engine reads is a zero-argument provider
//! function with a total default. The embedding application replaces
//! providers at startup, one option at a time, and hands the finished
//! config to the engine by reference:
//!
//! ```rust,ignore
//! let config = PipelineConfig::new()
//!     .with_max_number_of_parallel_tasks(|| 4)
//!     .with_base_url(|| "https://etl.example.com/pipelines".into());
//! assert_eq!(config.max_number_of_parallel_tasks(), 4);
//! ```
//!
//! Values are never cached: each accessor call invokes the current provider.
//! The only memoized value is the event handler list, see
//! [`PipelineConfig::event_handlers`].

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::deprecation::{NotifierSettings, legacy_event_handlers};
use crate::error::ConfigResult;
use crate::events::EventHandler;
use crate::masks::PasswordMasks;
use crate::pipeline::{PipelineHandle, RootPipeline};
use crate::resolver::{EventHandlerResolver, HandlerFactory, ResolvedHandlers};

pub const DEFAULT_DB_ALIAS: &str = "dwh-etl";
pub const DEFAULT_BASH_COMMAND: &str = "/usr/bin/env bash -o pipefail";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/pipelines";
pub const DEFAULT_RUN_LOG_RETENTION_DAYS: u32 = 30;

/// A replaceable, side-effect-free source of one configuration value.
pub type Provider<T> = Arc<dyn Fn() -> T + Send + Sync>;

macro_rules! config_options {
    ($(
        $(#[$meta:meta])*
        $name:ident, $setter:ident: $ty:ty = $default:expr;
    )+) => {
        struct Providers {
            $( $name: Provider<$ty>, )+
        }

        impl Default for Providers {
            fn default() -> Self {
                Self {
                    $( $name: Arc::new(|| -> $ty { $default }), )+
                }
            }
        }

        impl PipelineConfig {
            $(
                $(#[$meta])*
                #[must_use]
                pub fn $name(&self) -> $ty {
                    (self.providers.$name)()
                }

                #[doc = concat!("Replaces the provider of [`Self::", stringify!($name), "`].")]
                #[must_use]
                pub fn $setter<F>(mut self, provider: F) -> Self
                where
                    F: Fn() -> $ty + Send + Sync + 'static,
                {
                    self.providers.$name = Arc::new(provider);
                    self.discard_resolved_handlers();
                    self
                }
            )+
        }
    };
}

config_options! {
    /// A pipeline that contains all other pipelines of the project
    root_pipeline, with_root_pipeline: PipelineHandle = default_root_pipeline();

    /// Where to find local data files
    data_dir, with_data_dir: PathBuf = default_data_dir();

    /// The alias of the database used when a task does not name one
    default_db_alias, with_default_db_alias: String = DEFAULT_DB_ALIAS.to_string();

    /// How many times a task is retried when it fails
    default_task_max_retries, with_default_task_max_retries: u32 = 0;

    /// Ignore data before this date
    first_date, with_first_date: NaiveDate = date_or_min(2000, 1, 1);

    /// Ignore data after this date
    last_date, with_last_date: NaiveDate = date_or_max(3000, 1, 1);

    /// How many tasks can run in parallel at maximum
    max_number_of_parallel_tasks, with_max_number_of_parallel_tasks: usize = num_cpus::get().max(1);

    /// The command used for running bash, should include the `pipefail` option
    bash_command_string, with_bash_command_string: String = DEFAULT_BASH_COMMAND.to_string();

    /// How often system statistics are collected
    system_statistics_collection_period, with_system_statistics_collection_period: Duration =
        Duration::from_secs(1);

    /// How many days to keep node run times, output logs and system statistics
    run_log_retention_in_days, with_run_log_retention_in_days: u32 = DEFAULT_RUN_LOG_RETENTION_DAYS;

    /// When false, runs cannot be started from the web UI
    allow_run_from_web_ui, with_allow_run_from_web_ui: bool = true;

    /// External url of the web UI, used for linking nodes in notifications
    base_url, with_base_url: String = DEFAULT_BASE_URL.to_string();

    /// Deprecated, configure [`PipelineConfig::with_event_handlers`] instead.
    ///
    /// When set, failed nodes are announced to this Slack incoming webhook.
    /// The token is the trailing part of the webhook url (`T000/B000/XXXX`).
    slack_token, with_slack_token: Option<String> = None;

    /// Passwords which should be masked in the UI and in logs
    password_masks, with_password_masks: PasswordMasks = PasswordMasks::default();

    /// Value of the `Access-Control-Allow-Origin` header of the execution
    /// stream. `None` sends no header, `*` allows any origin.
    allowed_execution_origins, with_allowed_execution_origins: Option<String> = None;

    /// Host that executes pipelines, e.g. `http://localhost:8080`. `None` runs locally.
    execution_host_url, with_execution_host_url: Option<String> = None;
}

fn default_root_pipeline() -> PipelineHandle {
    Arc::new(RootPipeline::default())
}

fn default_data_dir() -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join("data"))
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn date_or_min(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn date_or_max(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MAX)
}

/// Configuration handed to the pipeline engine.
pub struct PipelineConfig {
    providers: Providers,
    event_handlers: Option<HandlerFactory>,
    resolver: EventHandlerResolver,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: Providers::default(),
            event_handlers: None,
            resolver: EventHandlerResolver::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the handlers that listen to pipeline events, e.g. chat bots
    /// announcing failed runs. Takes precedence over `slack_token`.
    #[must_use]
    pub fn with_event_handlers<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ConfigResult<Vec<Arc<dyn EventHandler>>> + Send + Sync + 'static,
    {
        self.event_handlers = Some(Arc::new(factory));
        self.discard_resolved_handlers();
        self
    }

    // A replaced provider may feed the legacy fallback, so a list built
    // before the replacement is stale.
    fn discard_resolved_handlers(&self) {
        if self.resolver.is_resolved() {
            self.resolver.reset();
        }
    }

    pub fn has_event_handler_override(&self) -> bool {
        self.event_handlers.is_some()
    }

    /// The active event handlers.
    ///
    /// Resolved on first call and cached until the config is rebuilt with a
    /// `with_*` setter or [`Self::reset_event_handlers`] is called. Later
    /// changes in what an installed provider returns are not observed. Concurrent first callers share one construction.
    /// A construction error is returned to the caller and nothing is cached.
    pub fn event_handlers(&self) -> ConfigResult<ResolvedHandlers> {
        self.resolver.resolve_with(|| match &self.event_handlers {
            Some(factory) => factory(),
            None => legacy_event_handlers(self.slack_token().as_deref(), &self.notifier_settings()),
        })
    }

    /// Drops the cached handler list; the next call resolves again.
    pub fn reset_event_handlers(&self) {
        self.resolver.reset();
    }

    pub fn notifier_settings(&self) -> NotifierSettings {
        NotifierSettings {
            base_url: self.base_url(),
            password_masks: self.password_masks(),
        }
    }

    /// Evaluates every plain option once.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            root_pipeline: self.root_pipeline().id().to_string(),
            data_dir: self.data_dir(),
            default_db_alias: self.default_db_alias(),
            default_task_max_retries: self.default_task_max_retries(),
            first_date: self.first_date(),
            last_date: self.last_date(),
            max_number_of_parallel_tasks: self.max_number_of_parallel_tasks(),
            bash_command_string: self.bash_command_string(),
            system_statistics_collection_period: self.system_statistics_collection_period(),
            run_log_retention_in_days: self.run_log_retention_in_days(),
            allow_run_from_web_ui: self.allow_run_from_web_ui(),
            base_url: self.base_url(),
            slack_token_configured: self.slack_token().is_some(),
            event_handler_override: self.has_event_handler_override(),
            password_mask_count: self.password_masks().len(),
            allowed_execution_origins: self.allowed_execution_origins(),
            execution_host_url: self.execution_host_url(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("values", &self.snapshot())
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// Point-in-time values of all plain options. Secrets are reduced to
/// presence flags and counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    pub root_pipeline: String,
    pub data_dir: PathBuf,
    pub default_db_alias: String,
    pub default_task_max_retries: u32,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub max_number_of_parallel_tasks: usize,
    pub bash_command_string: String,
    #[serde(with = "humantime_serde")]
    pub system_statistics_collection_period: Duration,
    pub run_log_retention_in_days: u32,
    pub allow_run_from_web_ui: bool,
    pub base_url: String,
    pub slack_token_configured: bool,
    pub event_handler_override: bool,
    pub password_mask_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_execution_origins: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_host_url: Option<String>,
}

impl ConfigSnapshot {
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
