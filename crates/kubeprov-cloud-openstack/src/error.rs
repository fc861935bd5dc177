//! OpenStack provider error types

use kubeprov_core::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenStackError {
    #[error("openstack CLI not found. Please install python-openstackclient")]
    CliNotFound,

    #[error("openstack command failed: {0}")]
    CommandFailed(String),

    #[error("Missing instance option: {0}")]
    MissingOption(&'static str),

    #[error("Unexpected openstack output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<OpenStackError> for ProvisionError {
    fn from(e: OpenStackError) -> Self {
        ProvisionError::Provider(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpenStackError>;
