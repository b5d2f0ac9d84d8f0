//! Operator error types.
//!
//! Errors raised while bootstrapping the operator, registering the Pipeline
//! type, and talking to the API server. Engine failures are opaque and kept
//! verbatim.

use kube::Error as KubeError;
use kube::config::{InClusterError, KubeconfigError};
use thiserror::Error;

/// Errors that can occur in the Pipeline Operator.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Development-mode kubeconfig missing or unparsable
    #[error("could not load configuration: {0}")]
    Configuration(#[source] KubeconfigError),

    /// In-cluster credentials unavailable
    #[error(
        "error loading kubernetes configuration inside cluster, check app is running outside kubernetes cluster or run in development mode: {0}"
    )]
    AmbientConfig(#[source] InClusterError),

    /// Operator settings could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport could not be built from an otherwise valid configuration
    #[error("could not build Kubernetes client: {0}")]
    Client(#[source] KubeError),

    /// Termination signal handlers could not be installed
    #[error("could not register signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    /// Resource type registration failed for a reason other than "already exists"
    #[error("could not register resource type {crd}: {reason}")]
    Registration {
        /// CRD object name
        crd: String,
        /// What went wrong
        reason: String,
    },

    /// List or watch call failed
    #[error("Kubernetes request failed: {0}")]
    Transport(#[source] KubeError),

    /// Watch reported an error event from the API server
    #[error("Watch error: {0}")]
    Watch(String),

    /// Reconciliation engine returned an error
    #[error("{0:#}")]
    Engine(anyhow::Error),
}

impl OperatorError {
    /// Lifecycle phase an error aborts, used to prefix fatal messages.
    #[must_use]
    pub const fn phase(&self) -> &'static str {
        match self {
            OperatorError::Configuration(_)
            | OperatorError::AmbientConfig(_)
            | OperatorError::InvalidConfig(_)
            | OperatorError::Client(_)
            | OperatorError::Signal(_) => "initializing",
            OperatorError::Registration { .. }
            | OperatorError::Transport(_)
            | OperatorError::Watch(_)
            | OperatorError::Engine(_) => "running",
        }
    }
}

/// HTTP status code of an API error, if the error came from the API server.
pub fn api_status_code(err: &KubeError) -> Option<u16> {
    match err {
        KubeError::Api(response) => Some(response.code),
        _ => None,
    }
}
