//! Kubernetes client construction.
//!
//! Resolves the connection source into a `kube::Config` once, then hands out
//! the three API handles the operator needs. All handles share one transport.
//! Nothing here talks to the API server.

use crate::config::ConnectionSource;
use crate::error::OperatorError;
use crds::Pipeline;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::fmt;
use tracing::{debug, info};

/// API handles used by the operator for one run.
#[derive(Clone)]
pub struct ClusterClients {
    /// Core resource client
    pub core: Client,
    /// `CustomResourceDefinition` client used for type registration
    pub crds: Api<CustomResourceDefinition>,
    /// Pipeline client across all namespaces
    pub pipelines: Api<Pipeline>,
}

impl fmt::Debug for ClusterClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClients")
            .field("default_namespace", &self.core.default_namespace())
            .field("crds", &self.crds)
            .field("pipelines", &self.pipelines)
            .finish_non_exhaustive()
    }
}

impl ClusterClients {
    /// Builds the clients from a connection source.
    ///
    /// # Errors
    ///
    /// [`OperatorError::Configuration`] if the kubeconfig cannot be loaded,
    /// [`OperatorError::AmbientConfig`] if in-cluster credentials are missing,
    /// [`OperatorError::Client`] if the transport cannot be built.
    pub async fn connect(source: &ConnectionSource) -> Result<Self, OperatorError> {
        let config = resolve_config(source).await?;
        info!("Kubernetes API server: {}", config.cluster_url);
        Self::from_config(config)
    }

    /// Builds the clients from an already resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Client`] if the transport cannot be built.
    pub fn from_config(config: Config) -> Result<Self, OperatorError> {
        install_crypto_provider();
        let client = Client::try_from(config).map_err(OperatorError::Client)?;
        Ok(Self::from_client(client))
    }

    /// Derives the typed handles from an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            crds: Api::all(client.clone()),
            pipelines: Api::all(client.clone()),
            core: client,
        }
    }
}

/// Resolves a connection source into a client configuration.
///
/// # Errors
///
/// See [`ClusterClients::connect`].
pub async fn resolve_config(source: &ConnectionSource) -> Result<Config, OperatorError> {
    match source {
        ConnectionSource::Ambient => {
            debug!("Loading in-cluster configuration");
            Config::incluster().map_err(OperatorError::AmbientConfig)
        }
        ConnectionSource::ExplicitPath(path) => {
            debug!("Loading kubeconfig from {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path).map_err(OperatorError::Configuration)?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(OperatorError::Configuration)
        }
    }
}

/// Installs the ring crypto provider for rustls unless one is already set.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // Losing the race to another installer is fine: a provider is set either way
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}
