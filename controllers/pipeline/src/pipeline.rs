//! Pipeline resource binding.
//!
//! Ties the Pipeline type descriptor to a registrar and a list/watch source.
//! The lister-watcher is only handed out by [`PipelineResource::initialize`],
//! after the type is registered.

use crate::clients::ClusterClients;
use crate::error::OperatorError;
use crate::listwatch::{ApiListWatch, ListerWatcher};
use crate::registrar::{CrdRegistrar, TypeRegistrar};
use crds::{Pipeline, ResourceTypeDescriptor, pipeline_descriptor};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// The Pipeline custom resource as seen by the operator.
pub struct PipelineResource<R, L> {
    registrar: R,
    lister_watcher: L,
}

impl<R, L> fmt::Debug for PipelineResource<R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineResource")
            .field("crd", &pipeline_descriptor().crd_name())
            .finish_non_exhaustive()
    }
}

impl PipelineResource<CrdRegistrar, ApiListWatch<Pipeline>> {
    /// Binds the resource to live cluster clients.
    #[must_use]
    pub fn from_clients(clients: &ClusterClients, establish_timeout: Option<Duration>) -> Self {
        Self::new(
            CrdRegistrar::new(clients.crds.clone()).with_establish_timeout(establish_timeout),
            ApiListWatch::new(clients.pipelines.clone()),
        )
    }
}

impl<R, L> PipelineResource<R, L>
where
    R: TypeRegistrar,
    L: ListerWatcher<Object = Pipeline>,
{
    /// Binds the resource to a registrar and a list/watch source.
    pub fn new(registrar: R, lister_watcher: L) -> Self {
        Self {
            registrar,
            lister_watcher,
        }
    }

    /// Descriptor registered by [`initialize`](Self::initialize).
    #[must_use]
    pub fn descriptor(&self) -> ResourceTypeDescriptor {
        pipeline_descriptor()
    }

    /// Ensures the Pipeline type is registered, then releases the list/watch source.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Registration`] if the type cannot be registered.
    pub async fn initialize(self) -> Result<L, OperatorError> {
        let descriptor = self.descriptor();
        self.registrar.ensure_registered(&descriptor).await?;
        info!("Resource type {} ready", descriptor);
        Ok(self.lister_watcher)
    }

    /// Empty Pipeline.
    pub fn object_prototype(&self) -> Pipeline {
        self.lister_watcher.object_prototype()
    }
}
