//! Provisioning error taxonomy

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a provisioning run.
///
/// Every variant is fatal for the run. Configuration errors are raised before
/// any provider call, so nothing has been created yet when they occur.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Aborted")]
    ConfirmationDeclined,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error(
        "Inventory not found: {0}\nHint: add-node extends an existing inventory, provision the cluster first"
    )]
    InventoryNotFound(PathBuf),

    #[error("Cannot write {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inventory parse error: {path}:{line}\nReason: {message}")]
    InventoryParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
