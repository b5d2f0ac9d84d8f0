//! Event handlers fed by the controller loop.

use async_trait::async_trait;
use crds::Pipeline;
use kube::ResourceExt;
use tracing::info;

/// Receives objects as the controller observes them.
///
/// `on_apply` runs for every object seen in a list and for every add or
/// modify event; `on_delete` runs for delete events and for objects that
/// disappeared between two lists. Errors are logged by the caller and never
/// stop the loop.
#[async_trait]
pub trait Handler<K>: Send + Sync + 'static {
    /// Object created, changed, or re-listed.
    async fn on_apply(&self, object: &K) -> anyhow::Result<()>;

    /// Object removed.
    async fn on_delete(&self, object: &K) -> anyhow::Result<()>;
}

/// Logs Pipeline changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineHandler;

#[async_trait]
impl Handler<Pipeline> for PipelineHandler {
    async fn on_apply(&self, pipeline: &Pipeline) -> anyhow::Result<()> {
        let namespace = pipeline.namespace().unwrap_or_default();
        info!(
            namespace = %namespace,
            name = %pipeline.name_any(),
            generation = pipeline.metadata.generation.unwrap_or_default(),
            steps = pipeline.spec.steps.len(),
            "Pipeline applied"
        );
        Ok(())
    }

    async fn on_delete(&self, pipeline: &Pipeline) -> anyhow::Result<()> {
        let namespace = pipeline.namespace().unwrap_or_default();
        info!(
            namespace = %namespace,
            name = %pipeline.name_any(),
            "Pipeline deleted"
        );
        Ok(())
    }
}
