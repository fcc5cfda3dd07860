//! TOML overrides for [`PipelineConfig`].
//!
//! Every key is optional; present keys replace the provider of the matching
//! option with a constant. Unknown keys are rejected so typos do not pass
//! silently. Dates are quoted strings (`first_date = "2020-01-01"`),
//! durations use humantime syntax (`system_statistics_collection_period = "5s"`).
//!
//! The file lives at `$PIPELINE_CONFIG` when set, otherwise in the
//! platform config directory (`$XDG_CONFIG_HOME/pipeline-config/config.toml`
//! on Linux, the equivalent on macOS and Windows).

use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs as TokioFs;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::masks::PasswordMasks;

pub const CONFIG_PATH_ENV: &str = "PIPELINE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_db_alias: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_task_max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_number_of_parallel_tasks: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bash_command_string: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub system_statistics_collection_period: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_log_retention_in_days: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_run_from_web_ui: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Deprecated, kept for existing deployments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_masks: Option<PasswordMasks>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_execution_origins: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_host_url: Option<String>,
}

// Replaces a provider with a constant taken from the file.
macro_rules! apply_constant {
    ($config:ident, $value:expr => $setter:ident) => {
        if let Some(value) = $value {
            $config = $config.$setter(move || value.clone());
        }
    };
    ($config:ident, $value:expr => $setter:ident as optional) => {
        if let Some(value) = $value {
            $config = $config.$setter(move || Some(value.clone()));
        }
    };
}

impl ConfigFile {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub async fn save(&self, path: &Path) -> ConfigResult<()> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            TokioFs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::io(parent, e))?;
        }

        let text = self.to_toml_string()?;
        TokioFs::write(path, text)
            .await
            .map_err(|e| ConfigError::io(path, e))
    }

    /// `$PIPELINE_CONFIG` if set, else `config.toml` in the platform config dir.
    pub fn default_path() -> ConfigResult<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> ConfigResult<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "pipeline-config", "pipeline-config")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Layers the values present in this file over `config`.
    pub fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        apply_constant!(config, self.data_dir => with_data_dir);
        apply_constant!(config, self.default_db_alias => with_default_db_alias);
        apply_constant!(config, self.default_task_max_retries => with_default_task_max_retries);
        apply_constant!(config, self.first_date => with_first_date);
        apply_constant!(config, self.last_date => with_last_date);
        apply_constant!(config, self.max_number_of_parallel_tasks => with_max_number_of_parallel_tasks);
        apply_constant!(config, self.bash_command_string => with_bash_command_string);
        apply_constant!(
            config,
            self.system_statistics_collection_period => with_system_statistics_collection_period
        );
        apply_constant!(config, self.run_log_retention_in_days => with_run_log_retention_in_days);
        apply_constant!(config, self.allow_run_from_web_ui => with_allow_run_from_web_ui);
        apply_constant!(config, self.base_url => with_base_url);
        apply_constant!(config, self.slack_token => with_slack_token as optional);
        apply_constant!(config, self.password_masks => with_password_masks);
        apply_constant!(config, self.allowed_execution_origins => with_allowed_execution_origins as optional);
        apply_constant!(config, self.execution_host_url => with_execution_host_url as optional);
        config
    }
}

impl PipelineConfig {
    /// Defaults layered with the config file at [`ConfigFile::default_path`], if any.
    pub async fn load() -> ConfigResult<Self> {
        Self::load_from(&ConfigFile::default_path()?).await
    }

    pub async fn load_from(path: &Path) -> ConfigResult<Self> {
        let exists = TokioFs::try_exists(path)
            .await
            .map_err(|e| ConfigError::io(path, e))?;

        if exists {
            info!("Loading config from {}", path.display());
            let file = ConfigFile::load(path).await?;
            Ok(file.apply(Self::default()))
        } else {
            info!(
                "No config file found at {}, using default configuration",
                path.display()
            );
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_db_alias = "warehouse"
default_task_max_retries = 2
first_date = "2020-01-01"
max_number_of_parallel_tasks = 6
system_statistics_collection_period = "5s"
allow_run_from_web_ui = false
slack_token = "T000/B000/XXXX"
password_masks = ["hunter2"]
allowed_execution_origins = "*"
"#;

    #[test]
    fn test_parse_and_apply() {
        let file = ConfigFile::from_toml_str(SAMPLE).unwrap();
        let config = file.apply(PipelineConfig::new());

        assert_eq!(config.default_db_alias(), "warehouse");
        assert_eq!(config.default_task_max_retries(), 2);
        assert_eq!(config.first_date(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(config.max_number_of_parallel_tasks(), 6);
        assert_eq!(config.system_statistics_collection_period(), Duration::from_secs(5));
        assert!(!config.allow_run_from_web_ui());
        assert_eq!(config.slack_token().as_deref(), Some("T000/B000/XXXX"));
        assert_eq!(config.password_masks().len(), 1);
        assert_eq!(config.allowed_execution_origins().as_deref(), Some("*"));

        // untouched options keep their defaults
        assert_eq!(config.last_date(), NaiveDate::from_ymd_opt(3000, 1, 1).unwrap());
        assert_eq!(config.run_log_retention_in_days(), 30);
        assert_eq!(config.execution_host_url(), None);
    }

    #[test]
    fn test_empty_file_changes_nothing() {
        let file = ConfigFile::from_toml_str("").unwrap();
        assert_eq!(file, ConfigFile::default());

        let config = file.apply(PipelineConfig::new());
        assert_eq!(config.snapshot(), PipelineConfig::new().snapshot());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = ConfigFile::from_toml_str("max_parallel_tasks = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_save_then_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let file = ConfigFile {
            run_log_retention_in_days: Some(7),
            execution_host_url: Some("http://localhost:8080".to_string()),
            system_statistics_collection_period: Some(Duration::from_secs(2)),
            ..ConfigFile::default()
        };
        file.save(&path).await.unwrap();

        assert_eq!(ConfigFile::load(&path).await.unwrap(), file);

        let config = PipelineConfig::load_from(&path).await.unwrap();
        assert_eq!(config.run_log_retention_in_days(), 7);
        assert_eq!(config.execution_host_url().as_deref(), Some("http://localhost:8080"));
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_from(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.snapshot(), PipelineConfig::new().snapshot());
    }
}
