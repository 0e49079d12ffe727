//! Typed controller configuration.
//!
//! Loaded once at startup from the environment; no runtime field injection.
//! A change to the fields flagged by [`SyncConfig::requires_restart`] needs
//! a controller-manager restart to take effect.

use std::time::Duration;

use thiserror::Error;

/// Default number of reconcile workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default liveness threshold in seconds.
pub const DEFAULT_LIVENESS_THRESHOLD_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value '{value}' for {name}")]
    InvalidVar { name: &'static str, value: String },
}

/// Controller configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Master switch; when false the controller manager does not start.
    pub enabled: bool,
    /// Downstream Jenkins service identity this instance is bound to; used
    /// as the `jenkins=<service>` label selector.
    pub jenkins_service: String,
    /// Full resync period in minutes; 0 disables periodic resync.
    pub resync_period_minutes: u64,
    /// Number of reconcile workers.
    pub worker_count: usize,
    /// Jenkins endpoint base URL.
    pub jenkins_url: String,
    /// Jenkins API username.
    pub jenkins_username: String,
    /// Jenkins API token.
    pub jenkins_api_token: String,
    /// Seconds without any observed event before the liveness probe starts
    /// checking whether the resource kind still exists.
    pub liveness_threshold_secs: u64,
}

impl SyncConfig {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_var("SYNC_ENABLED", true)?,
            jenkins_service: require_var("JENKINS_SERVICE")?,
            resync_period_minutes: parse_var("SYNC_RESYNC_PERIOD_MINUTES", 0)?,
            worker_count: parse_var("SYNC_WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            jenkins_url: require_var("JENKINS_URL")?,
            jenkins_username: require_var("JENKINS_USERNAME")?,
            jenkins_api_token: require_var("JENKINS_API_TOKEN")?,
            liveness_threshold_secs: parse_var(
                "SYNC_LIVENESS_THRESHOLD_SECS",
                DEFAULT_LIVENESS_THRESHOLD_SECS,
            )?,
        })
    }

    /// Label selector binding this instance to its Jenkins service.
    pub fn label_selector(&self) -> String {
        format!("jenkins={}", self.jenkins_service)
    }

    /// Resync period as a duration; `None` disables resync.
    pub fn resync_period(&self) -> Option<Duration> {
        if self.resync_period_minutes == 0 {
            None
        } else {
            Some(Duration::from_secs(self.resync_period_minutes * 60))
        }
    }

    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness_threshold_secs)
    }

    /// Whether switching to `next` requires restarting the controller
    /// manager (target service or enablement changed).
    pub fn requires_restart(&self, next: &SyncConfig) -> bool {
        self.enabled != next.enabled || self.jenkins_service != next.jenkins_service
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        Err(_) => Ok(default),
    }
}
