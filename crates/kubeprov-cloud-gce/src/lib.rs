//! GCE provider for kubeprov
//!
//! Plans Compute Engine instance creation and runs it through the `gcloud`
//! CLI. Every host lands in the configured zone.

pub mod backend;
pub mod error;
pub mod gcloud;
pub mod plan;

pub use backend::GceBackend;
pub use error::GceError;
pub use gcloud::{GceInstance, Gcloud};
pub use plan::GcePlanBuilder;
