//! gcloud CLI wrapper
//!
//! Wraps the `gcloud compute` commands used to create instances.

use crate::error::{GceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Environment variable gcloud reads a service account key file from
pub const CREDENTIAL_FILE_ENV: &str = "CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE";

/// gcloud CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct Gcloud {
    project: Option<String>,
    credential_file: Option<PathBuf>,
}

impl Gcloud {
    pub fn new(project: Option<String>) -> Self {
        Self {
            project,
            credential_file: None,
        }
    }

    /// Authenticate every command with a service account key file
    pub fn with_credential_file(mut self, path: Option<PathBuf>) -> Self {
        self.credential_file = path;
        self
    }

    /// Check if gcloud is installed and has an active account
    pub async fn check_auth(&self) -> Result<Option<GcloudAccount>> {
        let which = Command::new("which").arg("gcloud").output().await?;
        if !which.status.success() {
            return Err(GceError::GcloudNotFound);
        }

        let output = self
            .run_command(&["auth", "list", "--filter=status:ACTIVE"])
            .await?;
        let accounts: Vec<GcloudAccount> = parse_list(&output)?;
        Ok(accounts.into_iter().next())
    }

    /// Run a gcloud command with JSON output and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("gcloud");
        cmd.args(args);
        cmd.arg("--format").arg("json");
        if let Some(project) = &self.project {
            cmd.arg("--project").arg(project);
        }
        if let Some(path) = &self.credential_file {
            cmd.env(CREDENTIAL_FILE_ENV, path);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: gcloud {}", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GceError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Create instances in one call, returning gcloud's raw descriptions
    pub async fn create_instances(
        &self,
        config: &CreateInstancesConfig,
    ) -> Result<Vec<serde_json::Value>> {
        let labels = config.labels_arg();
        let mut args = vec!["compute", "instances", "create"];
        args.extend(config.names.iter().map(String::as_str));
        args.extend(["--machine-type", config.machine_type.as_str()]);

        if let Some(ref zone) = config.zone {
            args.extend(["--zone", zone.as_str()]);
        }
        if let Some(ref image) = config.image {
            args.extend(["--image", image.as_str()]);
        }
        if let Some(ref email) = config.service_account_email {
            args.extend(["--service-account", email.as_str()]);
        }
        if let Some(ref network) = config.network {
            args.extend(["--network", network.as_str()]);
        }
        if let Some(ref subnetwork) = config.subnetwork {
            args.extend(["--subnet", subnetwork.as_str()]);
        }
        if let Some(ref labels) = labels {
            args.extend(["--labels", labels.as_str()]);
        }

        let output = self.run_command(&args).await?;
        parse_list(&output)
    }
}

fn parse_list<T: serde::de::DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(output)?)
}

/// Account entry from `gcloud auth list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcloudAccount {
    pub account: String,
    pub status: Option<String>,
}

/// Arguments of `gcloud compute instances create`
#[derive(Debug, Clone, Default)]
pub struct CreateInstancesConfig {
    pub names: Vec<String>,
    pub machine_type: String,
    pub zone: Option<String>,
    pub image: Option<String>,
    pub service_account_email: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl CreateInstancesConfig {
    fn labels_arg(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// The parts of a GCE instance description kubeprov reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    pub id: String,
    pub name: String,
    /// Zone URL, e.g. `https://.../zones/europe-west1-b`
    pub zone: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,
}

impl GceInstance {
    pub fn private_ip(&self) -> Option<String> {
        self.network_interfaces
            .iter()
            .find_map(|i| i.network_ip.clone())
    }

    /// First external NAT address
    pub fn public_ip(&self) -> Option<String> {
        self.network_interfaces
            .iter()
            .flat_map(|i| &i.access_configs)
            .find_map(|c| c.nat_ip.clone())
    }

    /// Short zone name taken from the zone URL
    pub fn zone_name(&self) -> Option<String> {
        self.zone
            .as_deref()
            .and_then(|z| z.rsplit('/').next())
            .map(str::to_string)
    }
}
