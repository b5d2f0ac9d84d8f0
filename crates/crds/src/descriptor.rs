//! Resource type descriptors
//!
//! A descriptor is the minimal identity of a custom resource type: what the
//! API server needs to serve it. It carries the `CustomResourceDefinition`
//! payload used for registration and can check whether an existing definition
//! describes the same type.

use crate::error::CrdError;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use std::fmt;

/// Whether instances of a type live inside namespaces or at cluster level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One instance set for the whole cluster
    Cluster,
    /// Instances are namespaced
    Namespaced,
}

impl Scope {
    /// Value used in `spec.scope` of a `CustomResourceDefinition`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scope::Cluster => "Cluster",
            Scope::Namespaced => "Namespaced",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a custom resource type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceTypeDescriptor {
    /// Kind name, e.g. `Pipeline`
    pub kind: &'static str,
    /// Plural name used in URLs, e.g. `pipelines`
    pub plural: &'static str,
    /// API group, e.g. `pipeline.duke.lol`
    pub group: &'static str,
    /// API version, e.g. `v1alpha1`
    pub version: &'static str,
    /// Namespaced or cluster-wide
    pub scope: Scope,
    /// Full definition of the type, usually `CustomResourceExt::crd`
    pub definition: fn() -> CustomResourceDefinition,
}

impl ResourceTypeDescriptor {
    /// Name of the `CustomResourceDefinition` object: `<plural>.<group>`.
    #[must_use]
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.plural, self.group)
    }

    /// `apiVersion` of instances: `<group>/<version>`.
    #[must_use]
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    /// Builds the registration payload.
    ///
    /// Short names, printer columns, the generated schema and subresources
    /// all come from the type's own definition.
    #[must_use]
    pub fn to_crd(&self) -> CustomResourceDefinition {
        (self.definition)()
    }

    /// Renders the registration payload as a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CrdError::Render`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, CrdError> {
        Ok(serde_yaml::to_string(&self.to_crd())?)
    }

    /// Whether an existing definition serves this exact type.
    ///
    /// Group, kind, plural and scope must be equal and the descriptor's
    /// version must be among the served versions. Extra versions are allowed.
    #[must_use]
    pub fn matches(&self, crd: &CustomResourceDefinition) -> bool {
        let spec = &crd.spec;
        spec.group == self.group
            && spec.names.kind == self.kind
            && spec.names.plural == self.plural
            && spec.scope == self.scope.as_str()
            && spec
                .versions
                .iter()
                .any(|v| v.name == self.version && v.served)
    }
}

impl fmt::Display for ResourceTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.api_version(), self.kind, self.scope)
    }
}
