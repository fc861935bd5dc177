//! Request configuration loading
//!
//! The request is read from a YAML file with flat keys (`masters_count`,
//! `os_auth_url`, ...) and overlaid with values from the command line.
//!
//! The config file is searched in this order:
//! 1. the path given explicitly (`--config`)
//! 2. the `KUBEPROV_CONFIG` environment variable
//! 3. `~/.kubeprov.yml`
//!
//! Running without any config file is allowed; every value can come from flags.

use crate::error::{ProvisionError, Result};
use crate::model::{
    AwsOptions, GceOptions, OpenStackOptions, Provider, ProviderOptions, ProvisionRequest,
    RoleConfig, Roles,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "KUBEPROV_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = ".kubeprov.yml";
pub const DEFAULT_WORK_DIR: &str = ".kubeprov";
pub const DEFAULT_WORDS_FILE: &str = "/usr/share/dict/words";

fn config_error(e: config::ConfigError) -> ProvisionError {
    ProvisionError::config(e.to_string())
}

/// Locate the config file, if any
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ProvisionError::config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ProvisionError::config(format!(
            "config file from {} not found: {}",
            CONFIG_ENV,
            path.display()
        )));
    }

    if let Some(home) = dirs::home_dir() {
        let path = home.join(DEFAULT_CONFIG_FILE);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Replace a leading `~/` with the home directory
pub fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}

/// Values set on the command line, applied on top of the config file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    entries: Vec<(String, config::Value)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Into<config::Value>>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.entries.push((key.to_string(), value.into()));
        }
        self
    }

    /// Set a boolean key only when the flag was given
    pub fn flag(&mut self, key: &str, enabled: bool) -> &mut Self {
        if enabled {
            self.entries.push((key.to_string(), true.into()));
        }
        self
    }

    pub fn path(&mut self, key: &str, value: Option<&Path>) -> &mut Self {
        self.set(key, value.map(|p| p.to_string_lossy().into_owned()))
    }

    pub fn count(&mut self, key: &str, value: Option<u32>) -> &mut Self {
        self.set(key, value.map(i64::from))
    }

    pub fn list(&mut self, key: &str, values: &[String]) -> &mut Self {
        if !values.is_empty() {
            self.entries
                .push((key.to_string(), values.to_vec().into()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flat request file as written by operators
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RequestFile {
    pub masters_count: Option<u32>,
    pub nodes_count: Option<u32>,
    pub etcds_count: Option<u32>,

    pub masters_instance_type: Option<String>,
    pub nodes_instance_type: Option<String>,
    pub etcds_instance_type: Option<String>,
    pub masters_instance_profile_name: Option<String>,
    pub nodes_instance_profile_name: Option<String>,
    pub etcds_instance_profile_name: Option<String>,
    pub masters_machine_type: Option<String>,
    pub nodes_machine_type: Option<String>,
    pub etcds_machine_type: Option<String>,
    pub masters_flavor: Option<String>,
    pub nodes_flavor: Option<String>,
    pub etcds_flavor: Option<String>,
    pub masters_volume_size: Option<u32>,
    pub nodes_volume_size: Option<u32>,
    pub etcds_volume_size: Option<u32>,
    pub masters_boot_from_volume: Option<bool>,
    pub nodes_boot_from_volume: Option<bool>,
    pub etcds_boot_from_volume: Option<bool>,

    pub cluster_name: Option<String>,
    pub add_node: Option<bool>,
    pub assume_yes: Option<bool>,
    pub use_private_ip: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub etcd_on_masters: Option<bool>,
    pub work_dir: Option<PathBuf>,
    pub inventory_path: Option<PathBuf>,
    pub words_file: Option<PathBuf>,
    pub custom_group_vars: Option<BTreeMap<String, BTreeMap<String, serde_yaml::Value>>>,

    // AWS
    pub aws_access_key: Option<String>,
    pub aws_secret_key: Option<String>,
    pub region: Option<String>,
    pub key_name: Option<String>,
    pub ami: Option<String>,
    pub security_group_id: Option<String>,
    pub security_group_name: Option<String>,
    pub vpc_subnet_id: Option<String>,
    pub assign_public_ip: Option<bool>,

    // GCE
    pub zone: Option<String>,
    pub service_account_email: Option<String>,
    pub pem_file: Option<PathBuf>,
    pub credentials_file: Option<PathBuf>,
    pub project_id: Option<String>,
    pub subnetwork: Option<String>,

    // GCE and OpenStack
    pub image: Option<String>,
    pub network: Option<String>,

    // OpenStack
    pub os_auth_url: Option<String>,
    pub os_username: Option<String>,
    pub os_password: Option<String>,
    pub os_project_name: Option<String>,
    pub os_domain_name: Option<String>,
    pub os_region_name: Option<String>,
    pub os_network_id: Option<String>,
    pub kube_network: Option<String>,
    pub sshkey: Option<String>,
    pub floating_ip: Option<bool>,
    pub floating_network: Option<String>,
    pub os_availability_zones: Option<Vec<String>>,
    pub userdata: Option<String>,
}

impl RequestFile {
    /// Build the typed request for `provider`
    pub fn into_request(self, provider: Provider) -> Result<ProvisionRequest> {
        let work_dir = match self.work_dir {
            Some(dir) => expand_home(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    ProvisionError::config("home directory not found, set work_dir explicitly")
                })?
                .join(DEFAULT_WORK_DIR),
        };

        let options = match provider {
            Provider::Aws => ProviderOptions::Aws(AwsOptions {
                access_key: self.aws_access_key,
                secret_key: self.aws_secret_key,
                region: self.region,
                key_name: self.key_name,
                ami: self.ami,
                security_group_id: self.security_group_id,
                security_group_name: self.security_group_name,
                vpc_subnet_id: self.vpc_subnet_id,
                assign_public_ip: self.assign_public_ip,
            }),
            Provider::Gce => ProviderOptions::Gce(GceOptions {
                image: self.image,
                zone: self.zone,
                service_account_email: self.service_account_email,
                pem_file: self.pem_file.map(expand_home),
                credentials_file: self.credentials_file.map(expand_home),
                project_id: self.project_id,
                network: self.network,
                subnetwork: self.subnetwork,
            }),
            Provider::OpenStack => ProviderOptions::OpenStack(OpenStackOptions {
                auth_url: self.os_auth_url,
                username: self.os_username,
                password: self.os_password,
                project_name: self.os_project_name,
                domain_name: self.os_domain_name,
                region_name: self.os_region_name,
                network: self.network,
                network_id: self.os_network_id,
                kube_network: self.kube_network,
                image: self.image,
                sshkey: self.sshkey,
                floating_ip: self.floating_ip.unwrap_or(false),
                floating_network: self.floating_network,
                availability_zones: self.os_availability_zones.unwrap_or_default(),
                userdata: self.userdata,
            }),
        };

        let defaults = RoleConfig::default();
        let roles = Roles {
            masters: RoleConfig {
                count: self.masters_count.unwrap_or(0),
                instance_type: self.masters_instance_type,
                instance_profile_name: self.masters_instance_profile_name,
                machine_type: self.masters_machine_type,
                flavor: self.masters_flavor,
                volume_size: self.masters_volume_size,
                boot_from_volume: self
                    .masters_boot_from_volume
                    .unwrap_or(defaults.boot_from_volume),
            },
            nodes: RoleConfig {
                count: self.nodes_count.unwrap_or(0),
                instance_type: self.nodes_instance_type,
                instance_profile_name: self.nodes_instance_profile_name,
                machine_type: self.nodes_machine_type,
                flavor: self.nodes_flavor,
                volume_size: self.nodes_volume_size,
                boot_from_volume: self
                    .nodes_boot_from_volume
                    .unwrap_or(defaults.boot_from_volume),
            },
            etcds: RoleConfig {
                count: self.etcds_count.unwrap_or(0),
                instance_type: self.etcds_instance_type,
                instance_profile_name: self.etcds_instance_profile_name,
                machine_type: self.etcds_machine_type,
                flavor: self.etcds_flavor,
                volume_size: self.etcds_volume_size,
                boot_from_volume: self
                    .etcds_boot_from_volume
                    .unwrap_or(defaults.boot_from_volume),
            },
        };

        let mut request = ProvisionRequest::new(options, work_dir);
        // etcd runs on the masters unless dedicated etcd hosts were requested
        request.etcd_on_masters = self.etcd_on_masters.unwrap_or(roles.etcds.count == 0);
        request.roles = roles;
        request.cluster_name = self.cluster_name;
        request.add_node = self.add_node.unwrap_or(false);
        request.assume_yes = self.assume_yes.unwrap_or(false);
        request.use_private_ip = self.use_private_ip.unwrap_or(false);
        request.tags = self.tags.unwrap_or_default();
        if let Some(path) = self.inventory_path {
            request.inventory_path = expand_home(path);
        }
        request.words_file = Some(
            self.words_file
                .map(expand_home)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORDS_FILE)),
        );
        request.custom_group_vars = self.custom_group_vars.unwrap_or_default();

        Ok(request)
    }
}

/// Read the config file (if any) and apply `overrides` on top of it
pub fn load_request_file(path: Option<&Path>, overrides: &Overrides) -> Result<RequestFile> {
    let mut builder = config::Config::builder();

    if let Some(path) = find_config_file(path)? {
        tracing::debug!("Loading configuration from {}", path.display());
        builder = builder
            .add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml));
    }

    for (key, value) in &overrides.entries {
        builder = builder
            .set_override(key.as_str(), value.clone())
            .map_err(config_error)?;
    }

    builder
        .build()
        .and_then(|settings| settings.try_deserialize::<RequestFile>())
        .map_err(config_error)
}

/// Load and validate the request for `provider`
pub fn load_request(
    provider: Provider,
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<ProvisionRequest> {
    let request = load_request_file(path, overrides)?.into_request(provider)?;
    request.validate()?;
    tracing::debug!(
        provider = %provider,
        instances = request.total_count(),
        add_node = request.add_node,
        "Loaded provisioning request"
    );
    Ok(request)
}
