//! Pipeline Operator CRD Definitions
//!
//! The `Pipeline` custom resource and the descriptor used to register it.

pub mod descriptor;
pub mod error;
pub mod pipeline;

pub use descriptor::*;
pub use error::*;
pub use pipeline::*;
