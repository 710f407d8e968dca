use crate::constants::{ENV_ENVIRONMENT, ENV_SLACK_CHANNEL, ENV_SLACK_TOKEN};
use crate::error::{Result, SorterError};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Root directory backing the filesystem object store
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub slack: SlackConfig,
}

#[derive(Debug, Deserialize)]
pub struct SlackConfig {
    pub channel: Option<String>,
    #[serde(default = "default_slack_retries")]
    pub max_retries: u32,
    #[serde(default = "default_slack_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_environment() -> String {
    "DEVELOPMENT".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_audit_dir() -> String {
    "audit".to_string()
}

fn default_slack_retries() -> u32 {
    3
}

fn default_slack_retry_delay() -> u64 {
    5
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            channel: None,
            max_retries: default_slack_retries(),
            retry_delay_secs: default_slack_retry_delay(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            data_dir: default_data_dir(),
            audit_dir: default_audit_dir(),
            dry_run: false,
            slack: SlackConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            SorterError::Config(format!("Failed to read config file '{config_path}': {e}"))
        })?;

        let mut config: Config = toml::from_str(&config_content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables win over the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(environment) = std::env::var(ENV_ENVIRONMENT) {
            self.environment = environment;
        }
        if let Ok(channel) = std::env::var(ENV_SLACK_CHANNEL) {
            self.slack.channel = Some(channel);
        }
    }

    /// Slack token comes from the environment only, never the config file.
    pub fn slack_token() -> Option<String> {
        std::env::var(ENV_SLACK_TOKEN).ok()
    }
}
