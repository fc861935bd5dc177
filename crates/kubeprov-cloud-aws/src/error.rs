//! AWS provider error types

use kubeprov_core::ProvisionError;
use thiserror::Error;

/// AWS provider errors
#[derive(Error, Debug)]
pub enum AwsError {
    #[error("EC2 API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing instance option: {0}")]
    MissingOption(&'static str),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<AwsError> for ProvisionError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::Configuration(message) => ProvisionError::Configuration(message),
            other => ProvisionError::Provider(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
