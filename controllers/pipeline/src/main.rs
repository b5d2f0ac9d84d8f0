//! Pipeline Operator
//!
//! Registers the `Pipeline` custom resource type and watches Pipelines across
//! all namespaces until the process is told to stop.
//!
//! Exit status is 0 on clean completion or SIGTERM/SIGINT and 1 on any fatal
//! error, which is printed to stderr as `error <phase> operator: <error>`.

mod backoff;
mod clients;
mod config;
mod controller;
mod error;
mod handler;
mod lifecycle;
mod listwatch;
mod operator;
mod pipeline;
mod registrar;

#[cfg(test)]
mod test_utils;

use crate::config::OperatorConfig;
use crate::error::OperatorError;
use crate::lifecycle::{Outcome, ShutdownSignal};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Pipeline Operator");

    let result = start().await;
    if let Err(e) = &result {
        eprintln!("{}", fatal_message(e));
    }
    ExitCode::from(exit_status(&result))
}

/// 0 for any successful outcome, 1 for any error.
fn exit_status(result: &Result<Outcome, OperatorError>) -> u8 {
    match result {
        Ok(Outcome::Completed | Outcome::Signaled) => 0,
        Err(_) => 1,
    }
}

/// Line printed to stderr for a fatal error.
fn fatal_message(err: &OperatorError) -> String {
    format!("error {} operator: {err}", err.phase())
}

async fn start() -> Result<Outcome, OperatorError> {
    // Armed before anything else so an early SIGTERM is not lost
    let shutdown = ShutdownSignal::arm()?;

    let config = OperatorConfig::from_env()?;
    info!("Configuration:");
    info!("  Connection: {:?}", config.connection);
    info!("  Resync interval: {}s", config.resync_interval.as_secs());
    info!("  Max consecutive failures: {}", config.max_consecutive_failures);

    lifecycle::run(config, shutdown.recv()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_outcomes_exit_zero() {
        assert_eq!(exit_status(&Ok(Outcome::Completed)), 0);
        assert_eq!(exit_status(&Ok(Outcome::Signaled)), 0);
    }

    #[test]
    fn test_initialization_failure_exits_one() {
        let result: Result<Outcome, OperatorError> = Err(OperatorError::InvalidConfig(
            "RESYNC_INTERVAL_SECONDS must be positive".to_string(),
        ));
        assert_eq!(exit_status(&result), 1);
        assert_eq!(
            fatal_message(result.as_ref().unwrap_err()),
            "error initializing operator: Invalid configuration: RESYNC_INTERVAL_SECONDS must be positive"
        );
    }

    #[test]
    fn test_engine_failure_exits_one() {
        let result: Result<Outcome, OperatorError> =
            Err(OperatorError::Engine(anyhow::anyhow!("watch pipelines: connection reset")));
        assert_eq!(exit_status(&result), 1);
        assert_eq!(
            fatal_message(result.as_ref().unwrap_err()),
            "error running operator: watch pipelines: connection reset"
        );
    }

    #[test]
    fn test_registration_failure_message_names_the_type() {
        let err = OperatorError::Registration {
            crd: "pipelines.pipeline.duke.lol".to_string(),
            reason: "create failed: forbidden".to_string(),
        };
        assert_eq!(
            fatal_message(&err),
            "error running operator: could not register resource type pipelines.pipeline.duke.lol: create failed: forbidden"
        );
    }
}
