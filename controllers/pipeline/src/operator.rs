//! The Pipeline operator engine.
//!
//! Registers the Pipeline type, then runs the reconciliation loop over every
//! Pipeline in the cluster until stopped.

use crate::backoff::FibonacciBackoff;
use crate::clients::ClusterClients;
use crate::config::OperatorConfig;
use crate::controller::Controller;
use crate::handler::PipelineHandler;
use crate::lifecycle::Engine;
use crate::listwatch::{ApiListWatch, ListerWatcher, describe_kind};
use crate::pipeline::PipelineResource;
use crate::registrar::{CrdRegistrar, TypeRegistrar};
use async_trait::async_trait;
use crds::Pipeline;
use kube::Client;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

/// Engine reconciling Pipelines.
pub struct PipelineOperator<R, L> {
    config: OperatorConfig,
    core: Client,
    resource: PipelineResource<R, L>,
    handler: PipelineHandler,
}

impl<R, L> fmt::Debug for PipelineOperator<R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOperator")
            .field("config", &self.config)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl PipelineOperator<CrdRegistrar, ApiListWatch<Pipeline>> {
    /// Creates the operator over live cluster clients.
    #[must_use]
    pub fn new(config: OperatorConfig, clients: ClusterClients) -> Self {
        let resource = PipelineResource::from_clients(&clients, config.establish_timeout);
        Self::with_resource(config, clients.core, resource)
    }
}

impl<R, L> PipelineOperator<R, L>
where
    R: TypeRegistrar + 'static,
    L: ListerWatcher<Object = Pipeline>,
{
    /// Creates the operator over an arbitrary resource binding.
    pub fn with_resource(config: OperatorConfig, core: Client, resource: PipelineResource<R, L>) -> Self {
        Self {
            config,
            core,
            resource,
            handler: PipelineHandler,
        }
    }

    async fn reconcile(self, stop: CancellationToken) -> anyhow::Result<()> {
        match self.core.apiserver_version().await {
            Ok(version) => info!("Connected to Kubernetes {}", version.git_version),
            Err(e) => warn!("Could not read API server version: {}", e),
        }

        info!("Reconciling {}", describe_kind(&self.resource.object_prototype()));
        let lister_watcher = self.resource.initialize().await?;

        Controller::new(
            lister_watcher,
            self.handler,
            self.config.resync_interval,
            self.config.max_consecutive_failures,
        )
        .with_backoff(FibonacciBackoff::new(1, self.config.max_backoff.as_secs()))
        .run(stop)
        .await?;

        info!("Pipeline operator stopped");
        Ok(())
    }
}

#[async_trait]
impl<R, L> Engine for PipelineOperator<R, L>
where
    R: TypeRegistrar + 'static,
    L: ListerWatcher<Object = Pipeline>,
{
    async fn run(self, stop: CancellationToken) -> anyhow::Result<()> {
        self.reconcile(stop).instrument(info_span!("operator")).await
    }
}
