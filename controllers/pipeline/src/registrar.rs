//! Resource type registration.
//!
//! Makes sure the API server serves a custom resource type before anything
//! lists or watches it. Safe to run on every startup: an existing matching
//! definition is left alone, and losing a creation race to another replica
//! counts as success.

use crate::error::{OperatorError, api_status_code};
use async_trait::async_trait;
use crds::ResourceTypeDescriptor;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::Api;
use kube::api::PostParams;
use kube_runtime::wait::{Condition, await_condition, conditions};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ensures a resource type is registered with the cluster.
#[async_trait]
pub trait TypeRegistrar: Send + Sync {
    /// Registers `descriptor` unless an identical definition already exists.
    async fn ensure_registered(&self, descriptor: &ResourceTypeDescriptor) -> Result<(), OperatorError>;
}

/// Registers types as `CustomResourceDefinition` objects.
#[derive(Clone)]
pub struct CrdRegistrar {
    api: Api<CustomResourceDefinition>,
    establish_timeout: Option<Duration>,
}

impl fmt::Debug for CrdRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrdRegistrar")
            .field("establish_timeout", &self.establish_timeout)
            .finish_non_exhaustive()
    }
}

impl CrdRegistrar {
    /// Creates a registrar that does not wait for `Established`.
    #[must_use]
    pub fn new(api: Api<CustomResourceDefinition>) -> Self {
        Self {
            api,
            establish_timeout: None,
        }
    }

    /// Waits up to `timeout` for the definition to be `Established`; `None` skips the wait.
    #[must_use]
    pub fn with_establish_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.establish_timeout = timeout;
        self
    }

    /// Accepts a definition that already exists, waiting for it if needed.
    async fn adopt(
        &self,
        descriptor: &ResourceTypeDescriptor,
        existing: &CustomResourceDefinition,
    ) -> Result<(), OperatorError> {
        let name = descriptor.crd_name();
        if !descriptor.matches(existing) {
            return Err(OperatorError::Registration {
                crd: name,
                reason: format!("existing definition does not serve {descriptor}"),
            });
        }
        if conditions::is_crd_established().matches_object(Some(existing)) {
            return Ok(());
        }
        self.wait_established(&name).await
    }

    async fn wait_established(&self, name: &str) -> Result<(), OperatorError> {
        let Some(timeout) = self.establish_timeout else {
            return Ok(());
        };

        debug!("Waiting up to {}s for CRD {} to be established", timeout.as_secs(), name);
        let establish = await_condition(self.api.clone(), name, conditions::is_crd_established());
        match tokio::time::timeout(timeout, establish).await {
            Ok(Ok(_)) => {
                info!("CRD {} established", name);
                Ok(())
            }
            Ok(Err(e)) => Err(OperatorError::Registration {
                crd: name.to_string(),
                reason: format!("waiting for Established condition failed: {e}"),
            }),
            Err(_) => Err(OperatorError::Registration {
                crd: name.to_string(),
                reason: format!("not established after {}s", timeout.as_secs()),
            }),
        }
    }
}

#[async_trait]
impl TypeRegistrar for CrdRegistrar {
    async fn ensure_registered(&self, descriptor: &ResourceTypeDescriptor) -> Result<(), OperatorError> {
        let name = descriptor.crd_name();
        let registration_error = |reason: String| OperatorError::Registration {
            crd: name.clone(),
            reason,
        };

        match self.api.get_opt(&name).await {
            Ok(Some(existing)) => {
                info!("CRD {} already registered", name);
                return self.adopt(descriptor, &existing).await;
            }
            Ok(None) => {}
            Err(e) => return Err(registration_error(format!("lookup failed: {e}"))),
        }

        match self.api.create(&PostParams::default(), &descriptor.to_crd()).await {
            Ok(_) => info!("Registered CRD {} for {}", name, descriptor),
            // Another replica created it between our lookup and create
            Err(e) if api_status_code(&e) == Some(409) => {
                warn!("CRD {} was registered concurrently, checking existing definition", name);
                let existing = self
                    .api
                    .get(&name)
                    .await
                    .map_err(|e| registration_error(format!("lookup failed: {e}")))?;
                return self.adopt(descriptor, &existing).await;
            }
            Err(e) => return Err(registration_error(format!("create failed: {e}"))),
        }

        self.wait_established(&name).await
    }
}
