//! openstack CLI wrapper

use crate::auth::OpenStackAuth;
use crate::error::{OpenStackError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;

/// openstack CLI wrapper, authenticated through `OS_*` variables
pub struct OpenStackCli {
    auth: OpenStackAuth,
}

impl OpenStackCli {
    pub fn new(auth: OpenStackAuth) -> Self {
        Self { auth }
    }

    /// Check if the CLI is installed and can issue a token
    pub async fn check_auth(&self) -> Result<TokenInfo> {
        let which = Command::new("which").arg("openstack").output().await?;
        if !which.status.success() {
            return Err(OpenStackError::CliNotFound);
        }

        let output = self.run_command(&["token", "issue"]).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Run an openstack command with JSON output and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("openstack");
        cmd.args(args);
        cmd.arg("-f").arg("json");
        cmd.envs(self.auth.env_vars());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: openstack {}", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OpenStackError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn create_security_group(&self, name: &str, description: &str) -> Result<()> {
        self.run_command(&["security", "group", "create", name, "--description", description])
            .await?;
        Ok(())
    }

    pub async fn create_security_rule(&self, group: &str, protocol: &str) -> Result<()> {
        self.run_command(&["security", "group", "rule", "create", "--protocol", protocol, group])
            .await?;
        Ok(())
    }

    pub async fn create_port(
        &self,
        name: &str,
        network: &str,
        allowed_address_pairs: &[String],
        security_groups: &[String],
    ) -> Result<()> {
        let pairs: Vec<String> = allowed_address_pairs
            .iter()
            .map(|cidr| format!("ip-address={}", cidr))
            .collect();

        let mut args = vec!["port", "create", "--network", network];
        for pair in &pairs {
            args.extend(["--allowed-address", pair.as_str()]);
        }
        for group in security_groups {
            args.extend(["--security-group", group.as_str()]);
        }
        args.push(name);

        self.run_command(&args).await?;
        Ok(())
    }

    /// Create one server and wait for it to become active
    pub async fn create_server(&self, config: &CreateServerConfig) -> Result<Value> {
        let owned = config.args();
        let args: Vec<&str> = owned.iter().map(String::as_str).collect();
        let output = self.run_command(&args).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Allocate a floating IP on `network` and attach it to `server`
    pub async fn attach_floating_ip(&self, server: &str, network: &str) -> Result<String> {
        let output = self.run_command(&["floating", "ip", "create", network]).await?;
        let ip: FloatingIp = serde_json::from_str(&output)?;

        let mut cmd = Command::new("openstack");
        cmd.args(["server", "add", "floating", "ip", server, ip.floating_ip_address.as_str()]);
        cmd.envs(self.auth.env_vars());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        tracing::debug!("Running: openstack server add floating ip {} {}", server, ip.floating_ip_address);

        // this subcommand prints nothing, so it cannot take `-f json`
        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OpenStackError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(ip.floating_ip_address)
    }
}

/// Output of `openstack token issue`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FloatingIp {
    floating_ip_address: String,
}

/// Arguments of `openstack server create`
#[derive(Debug, Clone, Default)]
pub struct CreateServerConfig {
    /// Server name, also the name of its pre-created port
    pub name: String,
    pub flavor: String,
    pub image: String,
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub availability_zone: Option<String>,
    pub boot_from_volume: bool,
    pub volume_size: Option<u64>,
    /// Path of a user-data file
    pub userdata: Option<String>,
}

impl CreateServerConfig {
    /// `openstack server create` arguments.
    ///
    /// The server is attached through its pre-created port only; adding
    /// `--network` as well would give it a second interface.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["server".to_string(), "create".to_string()];
        let mut push = |flag: &str, value: &str| {
            args.push(flag.to_string());
            args.push(value.to_string());
        };

        push("--flavor", &self.flavor);
        push("--image", &self.image);
        push("--port", &self.name);
        if let Some(ref key_name) = self.key_name {
            push("--key-name", key_name);
        }
        for group in &self.security_groups {
            push("--security-group", group);
        }
        if let Some(ref zone) = self.availability_zone {
            push("--availability-zone", zone);
        }
        if let (true, Some(size)) = (self.boot_from_volume, self.volume_size) {
            push("--boot-from-volume", &size.to_string());
        }
        if let Some(ref userdata) = self.userdata {
            push("--user-data", userdata);
        }
        push("--wait", &self.name);
        args
    }
}

/// IPv4 addresses of a server, in the order the API lists them
///
/// Newer clients print `addresses` as `{"net": ["10.0.0.5", ...]}`, older
/// ones as `"net=10.0.0.5, 172.24.4.9; other=..."`.
pub fn server_addresses(server: &Value) -> Vec<String> {
    match server.get("addresses") {
        Some(Value::Object(networks)) => networks
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|addr| match addr {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("addr").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .filter(|addr| !addr.contains(':'))
            .collect(),
        Some(Value::String(listing)) => listing
            .split(';')
            .filter_map(|network| network.split_once('='))
            .flat_map(|(_, addrs)| addrs.split(','))
            .map(str::trim)
            .filter(|addr| !addr.is_empty() && !addr.contains(':'))
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
