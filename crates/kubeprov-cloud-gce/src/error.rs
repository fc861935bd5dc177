//! GCE provider error types

use kubeprov_core::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GceError {
    #[error("gcloud not found. Please install the Google Cloud SDK")]
    GcloudNotFound,

    #[error("gcloud command failed: {0}")]
    CommandFailed(String),

    #[error("Missing instance option: {0}")]
    MissingOption(&'static str),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<GceError> for ProvisionError {
    fn from(e: GceError) -> Self {
        ProvisionError::Provider(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GceError>;
