//! OpenStack backend

use crate::auth::OpenStackAuth;
use crate::cli::{CreateServerConfig, OpenStackCli, server_addresses};
use crate::error::OpenStackError;
use async_trait::async_trait;
use kubeprov_cloud::{
    AuthStatus, InstanceOptions, InstanceRecord, PortSpec, Protocol, ProviderBackend,
};
use kubeprov_core::{HostSpec, Result, Role};
use serde_json::Value;

/// Provider backend driving the `openstack` CLI
pub struct OpenStackBackend {
    cli: OpenStackCli,
}

impl OpenStackBackend {
    pub fn new(auth: OpenStackAuth) -> Self {
        Self {
            cli: OpenStackCli::new(auth),
        }
    }
}

#[async_trait]
impl ProviderBackend for OpenStackBackend {
    fn name(&self) -> &str {
        "openstack"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        match self.cli.check_auth().await {
            Ok(token) => Ok(AuthStatus::ok(format!(
                "project {}",
                token.project_id.as_deref().unwrap_or("unknown")
            ))),
            Err(OpenStackError::CliNotFound) => Err(OpenStackError::CliNotFound.into()),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<()> {
        Ok(self.cli.create_security_group(name, description).await?)
    }

    async fn add_security_rules(&self, group: &str, protocols: &[Protocol]) -> Result<()> {
        for protocol in protocols {
            self.cli
                .create_security_rule(group, &protocol.to_string())
                .await?;
        }
        Ok(())
    }

    async fn create_ports(&self, _role: Role, ports: &[PortSpec]) -> Result<()> {
        for port in ports {
            let network = port
                .network
                .as_deref()
                .ok_or(OpenStackError::MissingOption("network"))?;
            self.cli
                .create_port(
                    &port.name,
                    network,
                    &port.allowed_address_pairs,
                    &port.security_groups,
                )
                .await?;
        }
        Ok(())
    }

    async fn create_instances(
        &self,
        role: Role,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> Result<Vec<InstanceRecord>> {
        let floating_network = options
            .get_bool("auto_ip")
            .unwrap_or(false)
            .then(|| options.get_str("floating_network"))
            .flatten();

        let mut records = Vec::with_capacity(hosts.len());
        for host in hosts {
            let config = server_config(host, options)?;
            let server = self.cli.create_server(&config).await?;
            let floating_ip = match floating_network {
                Some(network) => Some(self.cli.attach_floating_ip(&host.name, network).await?),
                None => None,
            };
            records.push(record_from_server(server, host, role, floating_ip));
        }
        Ok(records)
    }
}

fn server_config(host: &HostSpec, options: &InstanceOptions) -> Result<CreateServerConfig> {
    let text = |key: &str| options.get_str(key).map(str::to_string);
    Ok(CreateServerConfig {
        name: host.name.clone(),
        flavor: text("flavor").ok_or(OpenStackError::MissingOption("flavor"))?,
        image: text("image").ok_or(OpenStackError::MissingOption("image"))?,
        key_name: text("key_name"),
        security_groups: options
            .get("security_groups")
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        availability_zone: host.zone.clone(),
        boot_from_volume: options.get_bool("boot_from_volume").unwrap_or(true),
        volume_size: options.get_u64("volume_size"),
        userdata: text("userdata"),
    })
}

fn record_from_server(
    server: Value,
    host: &HostSpec,
    role: Role,
    floating_ip: Option<String>,
) -> InstanceRecord {
    let addresses = server_addresses(&server);
    let private_ip = addresses.first().cloned();
    let public_ip = floating_ip.or_else(|| addresses.get(1).cloned());
    let id = server
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let zone = server
        .get("OS-EXT-AZ:availability_zone")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| host.zone.clone());

    InstanceRecord::new(id, &host.name, role)
        .with_private_ip(private_ip)
        .with_public_ip(public_ip)
        .with_zone(zone)
        .with_raw(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> InstanceOptions {
        let mut options = InstanceOptions::new();
        options.insert("flavor", "m1.large");
        options.insert("image", "ubuntu-24.04");
        options.insert("security_groups", vec!["k8s-lab-q1w2e3".to_string()]);
        options.insert("boot_from_volume", true);
        options.insert("volume_size", 40);
        options
    }

    #[test]
    fn test_server_config() {
        let host = HostSpec::new("k8s-lab-aaaaaa", Some("nova-a".to_string()), Role::Node);
        let config = server_config(&host, &options()).unwrap();
        assert_eq!(config.name, "k8s-lab-aaaaaa");
        assert_eq!(config.security_groups, vec!["k8s-lab-q1w2e3"]);
        assert_eq!(config.availability_zone.as_deref(), Some("nova-a"));
        assert_eq!(config.volume_size, Some(40));
        assert!(config.boot_from_volume);
    }

    #[test]
    fn test_server_config_requires_flavor() {
        let host = HostSpec::new("k8s-lab-aaaaaa", None, Role::Node);
        assert!(server_config(&host, &InstanceOptions::new()).is_err());
    }

    #[test]
    fn test_record_prefers_floating_ip() {
        let host = HostSpec::new("k8s-lab-bbbbbb", None, Role::Master);
        let server = json!({
            "id": "7f1c",
            "addresses": {"private": ["10.0.0.8"]},
            "OS-EXT-AZ:availability_zone": "nova"
        });
        let record = record_from_server(server, &host, Role::Master, Some("172.24.4.20".into()));
        assert_eq!(record.id, "7f1c");
        assert_eq!(record.private_ip.as_deref(), Some("10.0.0.8"));
        assert_eq!(record.public_ip.as_deref(), Some("172.24.4.20"));
        assert_eq!(record.zone.as_deref(), Some("nova"));
        assert_eq!(record.raw["id"], "7f1c");
    }
}
