//! Process lifecycle.
//!
//! `Initializing → Running → {Completed, Signaled, Failed}`. The engine runs
//! on its own task; the supervisor races it against the shutdown signal and
//! reports whichever finishes first.

use crate::clients::ClusterClients;
use crate::config::OperatorConfig;
use crate::error::OperatorError;
use crate::operator::PipelineOperator;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Long-running work supervised by the lifecycle.
#[async_trait]
pub trait Engine: Send + 'static {
    /// Runs until done, failed, or `stop` is cancelled.
    async fn run(self, stop: CancellationToken) -> anyhow::Result<()>;
}

/// Lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loading configuration and building clients
    Initializing,
    /// Engine running, waiting for it or a signal
    Running,
    /// Engine returned successfully
    Completed,
    /// Shutdown signal won the race
    Signaled,
    /// Initialization or the engine failed
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Signaled => "signaled",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Successful terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Engine returned on its own
    Completed,
    /// Shutdown signal arrived first
    Signaled,
}

impl Outcome {
    /// Terminal phase this outcome represents.
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Outcome::Completed => Phase::Completed,
            Outcome::Signaled => Phase::Signaled,
        }
    }
}

/// SIGTERM/SIGINT interest, registered when armed.
///
/// Arming early means a signal delivered during initialization is not lost.
#[derive(Debug)]
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    interrupt: Signal,
}

impl ShutdownSignal {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Signal`] if a handler cannot be installed.
    #[cfg(unix)]
    pub fn arm() -> Result<Self, OperatorError> {
        Ok(Self {
            terminate: signal(SignalKind::terminate()).map_err(OperatorError::Signal)?,
            interrupt: signal(SignalKind::interrupt()).map_err(OperatorError::Signal)?,
        })
    }

    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Never fails; Ctrl+C is registered when first awaited.
    #[cfg(not(unix))]
    pub fn arm() -> Result<Self, OperatorError> {
        Ok(Self {})
    }

    /// Resolves on the first termination signal.
    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.terminate.recv() => debug!("Received SIGTERM"),
            _ = self.interrupt.recv() => debug!("Received SIGINT"),
        }
    }

    /// Resolves on Ctrl+C.
    #[cfg(not(unix))]
    pub async fn recv(self) {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Runs `engine` on its own task until it finishes or `shutdown` resolves.
///
/// On shutdown the engine's stop token is cancelled but the engine is neither
/// aborted nor awaited.
///
/// # Errors
///
/// Returns [`OperatorError::Engine`] with the engine's error, or with the
/// panic message if its task panicked.
pub async fn supervise<E, S>(engine: E, shutdown: S) -> Result<Outcome, OperatorError>
where
    E: Engine,
    S: Future<Output = ()>,
{
    let stop = CancellationToken::new();
    let task = tokio::spawn(engine.run(stop.clone()));

    tokio::select! {
        joined = task => match joined {
            Ok(Ok(())) => Ok(Outcome::Completed),
            Ok(Err(e)) => Err(OperatorError::Engine(e)),
            Err(e) => Err(OperatorError::Engine(anyhow::anyhow!("engine task failed: {e}"))),
        },
        () = shutdown => {
            info!("Signal captured, exiting...");
            stop.cancel();
            Ok(Outcome::Signaled)
        }
    }
}

/// Initializes the operator and supervises it until a terminal phase.
///
/// # Errors
///
/// Initialization errors are returned as-is; engine failures as
/// [`OperatorError::Engine`].
pub async fn run<S>(config: OperatorConfig, shutdown: S) -> Result<Outcome, OperatorError>
where
    S: Future<Output = ()>,
{
    info!(phase = %Phase::Initializing, "Initializing Pipeline operator");
    let clients = ClusterClients::connect(&config.connection).await?;
    let operator = PipelineOperator::new(config, clients);

    info!(phase = %Phase::Running, "Pipeline operator running");
    let result = supervise(operator, shutdown).await;
    match &result {
        Ok(outcome) => info!(phase = %outcome.phase(), "Pipeline operator finished"),
        Err(_) => debug!(phase = %Phase::Failed, "Pipeline operator failed"),
    }
    result
}
