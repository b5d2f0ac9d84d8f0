//! Prints the Pipeline `CustomResourceDefinition` manifest.
//!
//! `cargo run -p crds --bin crdgen > deploy/crd.yaml`

use crds::{CrdError, pipeline_descriptor};

fn main() -> Result<(), CrdError> {
    print!("{}", pipeline_descriptor().to_yaml()?);
    Ok(())
}
