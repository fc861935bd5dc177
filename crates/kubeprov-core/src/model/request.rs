//! Provisioning request
//!
//! A request is built once per invocation from the config file and CLI flags
//! (see [`crate::config`]) and is never persisted.

use super::{AddressKind, Role, Roles};
use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Name of the plan file written into the working directory
pub const PLAN_FILE: &str = "provision-plan.json";

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gce,
    #[serde(rename = "openstack")]
    OpenStack,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Aws => write!(f, "aws"),
            Provider::Gce => write!(f, "gce"),
            Provider::OpenStack => write!(f, "openstack"),
        }
    }
}

/// AWS specific options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsOptions {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub key_name: Option<String>,
    pub ami: Option<String>,
    pub security_group_id: Option<String>,
    pub security_group_name: Option<String>,
    pub vpc_subnet_id: Option<String>,
    pub assign_public_ip: Option<bool>,
}

/// GCE specific options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GceOptions {
    pub image: Option<String>,
    pub zone: Option<String>,
    pub service_account_email: Option<String>,
    pub pem_file: Option<PathBuf>,
    pub credentials_file: Option<PathBuf>,
    pub project_id: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
}

/// OpenStack specific options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenStackOptions {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub project_name: Option<String>,
    pub domain_name: Option<String>,
    pub region_name: Option<String>,
    pub network: Option<String>,
    pub network_id: Option<String>,
    pub kube_network: Option<String>,
    pub image: Option<String>,
    pub sshkey: Option<String>,
    pub floating_ip: bool,
    pub floating_network: Option<String>,
    pub availability_zones: Vec<String>,
    pub userdata: Option<String>,
}

/// Provider-specific section of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderOptions {
    Aws(AwsOptions),
    Gce(GceOptions),
    #[serde(rename = "openstack")]
    OpenStack(OpenStackOptions),
}

impl ProviderOptions {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderOptions::Aws(_) => Provider::Aws,
            ProviderOptions::Gce(_) => Provider::Gce,
            ProviderOptions::OpenStack(_) => Provider::OpenStack,
        }
    }
}

/// A declarative provisioning request
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub provider: ProviderOptions,
    pub roles: Roles,
    pub cluster_name: Option<String>,
    pub add_node: bool,
    pub assume_yes: bool,
    pub use_private_ip: bool,
    /// Raw `key=value` tags, parsed by the plan builder
    pub tags: Vec<String>,
    /// Place masters in the `etcd` group as well
    pub etcd_on_masters: bool,
    /// Directory receiving the plan and raw instance record files
    pub work_dir: PathBuf,
    pub inventory_path: PathBuf,
    /// Dictionary used to generate cluster names
    pub words_file: Option<PathBuf>,
    /// Top-level keys patched into `inventory/group_vars/<name>.yml`
    pub custom_group_vars: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
}

impl ProvisionRequest {
    /// Request with no instances, rooted at `work_dir`
    pub fn new(provider: ProviderOptions, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            provider,
            roles: Roles::default(),
            cluster_name: None,
            add_node: false,
            assume_yes: false,
            use_private_ip: false,
            tags: Vec::new(),
            etcd_on_masters: true,
            inventory_path: work_dir.join("inventory").join("inventory.cfg"),
            work_dir,
            words_file: None,
            custom_group_vars: BTreeMap::new(),
        }
    }

    pub fn provider_kind(&self) -> Provider {
        self.provider.provider()
    }

    pub fn with_count(mut self, role: Role, count: u32) -> Self {
        self.roles[role].count = count;
        self
    }

    /// Check the request invariants
    pub fn validate(&self) -> Result<()> {
        if !self.add_node && self.roles.total_count() == 0 {
            return Err(ProvisionError::config(
                "at least one of masters_count, nodes_count or etcds_count must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn total_count(&self) -> u32 {
        self.roles.total_count()
    }

    /// Address used for reachability checks and `ansible_ssh_host`
    pub fn address_kind(&self) -> AddressKind {
        AddressKind::from_use_private_ip(self.use_private_ip)
    }

    /// Destination of the raw instance records for `role`
    pub fn records_path(&self, role: Role) -> PathBuf {
        self.work_dir.join(role.records_file_name())
    }

    pub fn plan_path(&self) -> PathBuf {
        self.work_dir.join(PLAN_FILE)
    }

    pub fn group_vars_dir(&self) -> PathBuf {
        self.work_dir.join("inventory").join("group_vars")
    }
}
