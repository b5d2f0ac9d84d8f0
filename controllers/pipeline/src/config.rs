//! Operator configuration.
//!
//! Settings are read once at startup from environment variables. Lookups go
//! through a closure so tests never touch the process environment.

use crate::error::OperatorError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default interval between full re-lists.
pub const DEFAULT_RESYNC_SECONDS: u64 = 30;

/// Default wait for a freshly registered CRD to become `Established`.
pub const DEFAULT_ESTABLISH_TIMEOUT_SECONDS: u64 = 30;

/// Default number of consecutive list/watch failures tolerated by the engine.
pub const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default cap on the delay between list/watch retries.
pub const DEFAULT_BACKOFF_MAX_SECONDS: u64 = 30;

/// Where cluster credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSource {
    /// In-cluster service account credentials
    Ambient,
    /// Kubeconfig file, used in development mode
    ExplicitPath(PathBuf),
}

/// Resolved operator configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Credential source for the cluster clients
    pub connection: ConnectionSource,
    /// Interval between full re-lists of Pipelines
    pub resync_interval: Duration,
    /// How long to wait for the CRD to be `Established`; `None` skips the wait
    pub establish_timeout: Option<Duration>,
    /// Consecutive list/watch failures before the engine gives up
    pub max_consecutive_failures: u32,
    /// Longest delay between list/watch retries
    pub max_backoff: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionSource::Ambient,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECONDS),
            establish_timeout: Some(Duration::from_secs(DEFAULT_ESTABLISH_TIMEOUT_SECONDS)),
            max_consecutive_failures: DEFAULT_MAX_FAILURES,
            max_backoff: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECONDS),
        }
    }
}

impl OperatorConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::InvalidConfig`] when a variable is set to an
    /// unparsable value.
    pub fn from_env() -> Result<Self, OperatorError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::InvalidConfig`] when a value cannot be parsed
    /// or development mode has no kubeconfig path to use.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OperatorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let development = match lookup("DEVELOPMENT") {
            Some(value) => parse_bool("DEVELOPMENT", &value)?,
            None => false,
        };

        let connection = if development {
            ConnectionSource::ExplicitPath(kubeconfig_path(&lookup)?)
        } else {
            ConnectionSource::Ambient
        };

        let resync_seconds = parse_number("RESYNC_SECONDS", lookup("RESYNC_SECONDS"), DEFAULT_RESYNC_SECONDS)?;
        if resync_seconds == 0 {
            return Err(OperatorError::InvalidConfig(
                "RESYNC_SECONDS must be greater than zero".to_string(),
            ));
        }

        let establish_seconds = parse_number(
            "CRD_ESTABLISH_TIMEOUT_SECONDS",
            lookup("CRD_ESTABLISH_TIMEOUT_SECONDS"),
            DEFAULT_ESTABLISH_TIMEOUT_SECONDS,
        )?;

        let max_failures = parse_number(
            "WATCH_MAX_FAILURES",
            lookup("WATCH_MAX_FAILURES"),
            u64::from(DEFAULT_MAX_FAILURES),
        )?;
        let max_consecutive_failures = u32::try_from(max_failures).map_err(|_| {
            OperatorError::InvalidConfig(format!("WATCH_MAX_FAILURES out of range: {max_failures}"))
        })?;

        let backoff_seconds = parse_number(
            "WATCH_BACKOFF_MAX_SECONDS",
            lookup("WATCH_BACKOFF_MAX_SECONDS"),
            DEFAULT_BACKOFF_MAX_SECONDS,
        )?;
        if backoff_seconds == 0 {
            return Err(OperatorError::InvalidConfig(
                "WATCH_BACKOFF_MAX_SECONDS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            connection,
            resync_interval: Duration::from_secs(resync_seconds),
            establish_timeout: (establish_seconds > 0).then(|| Duration::from_secs(establish_seconds)),
            max_consecutive_failures,
            max_backoff: Duration::from_secs(backoff_seconds),
        })
    }
}

/// Kubeconfig path for development mode: first entry of `KUBECONFIG`, else `$HOME/.kube/config`.
fn kubeconfig_path<F>(lookup: &F) -> Result<PathBuf, OperatorError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("KUBECONFIG").filter(|v| !v.is_empty()) {
        if let Some(first) = env::split_paths(&value).next() {
            return Ok(first);
        }
    }

    lookup("HOME")
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
        .ok_or_else(|| {
            OperatorError::InvalidConfig(
                "DEVELOPMENT is set but neither KUBECONFIG nor HOME is available".to_string(),
            )
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, OperatorError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(OperatorError::InvalidConfig(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}

fn parse_number(key: &str, value: Option<String>, default: u64) -> Result<u64, OperatorError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            OperatorError::InvalidConfig(format!("{key} must be a non-negative integer, got {raw:?}: {e}"))
        }),
    }
}
