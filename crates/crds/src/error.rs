//! CRD crate error types.

use thiserror::Error;

/// Errors raised while rendering CRD manifests.
#[derive(Debug, Error)]
pub enum CrdError {
    /// Manifest could not be serialized
    #[error("failed to render CRD manifest: {0}")]
    Render(#[from] serde_yaml::Error),
}
