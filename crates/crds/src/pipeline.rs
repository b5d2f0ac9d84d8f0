//! Pipeline CRD
//!
//! A build pipeline declared in-cluster. The operator only watches these;
//! what a pipeline does is decided by whoever consumes the watch stream.

use crate::descriptor::{ResourceTypeDescriptor, Scope};
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind name of the Pipeline resource.
pub const PIPELINE_KIND: &str = "Pipeline";

/// Plural (URL path) name of the Pipeline resource.
pub const PIPELINE_PLURAL: &str = "pipelines";

/// API group the Pipeline resource is served under.
pub const PIPELINE_GROUP: &str = "pipeline.duke.lol";

/// API version of the Pipeline resource.
pub const PIPELINE_VERSION: &str = "v1alpha1";

/// Pipelines live inside namespaces.
pub const PIPELINE_SCOPE: Scope = Scope::Namespaced;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "pipeline.duke.lol",
    version = "v1alpha1",
    kind = "Pipeline",
    plural = "pipelines",
    shortname = "pl",
    namespaced,
    status = "PipelineStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Source repository the pipeline runs against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// Step name, unique within the pipeline
    pub name: String,

    /// Container image the step runs in
    pub image: String,

    /// Commands executed in order
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    /// Generation last observed by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Registration descriptor for the Pipeline type, built from the constants above.
///
/// The registered definition is the one generated by the derive.
#[must_use]
pub fn pipeline_descriptor() -> ResourceTypeDescriptor {
    ResourceTypeDescriptor {
        kind: PIPELINE_KIND,
        plural: PIPELINE_PLURAL,
        group: PIPELINE_GROUP,
        version: PIPELINE_VERSION,
        scope: PIPELINE_SCOPE,
        definition: Pipeline::crd,
    }
}
