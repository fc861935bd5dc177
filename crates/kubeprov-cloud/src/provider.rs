//! Plan builder and provider backend traits

use crate::plan::{InstanceOptions, Plan, PortSpec, Protocol};
use crate::records::InstanceRecord;
use async_trait::async_trait;
use kubeprov_core::{
    HostSpec, NameAllocator, NamingScheme, Provider, ProvisionError, ProvisionRequest, Result,
    Role,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Turns a provisioning request into a plan for one provider.
///
/// Building a plan never touches the cloud; all precondition checks
/// (credentials, required options) happen here so that a bad request fails
/// before anything is created.
pub trait PlanBuilder: Send + Sync {
    fn provider(&self) -> Provider;

    /// How cluster names are derived and recovered for this provider
    fn naming_scheme(&self) -> NamingScheme;

    fn build_plan(&self, request: &ProvisionRequest, names: &mut NameAllocator) -> Result<Plan>;
}

/// Executes plan steps against a cloud API
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Returns the provider name (e.g., "aws", "openstack")
    fn name(&self) -> &str;

    /// Check that credentials are usable before creating anything
    async fn check_auth(&self) -> Result<AuthStatus>;

    async fn create_security_group(&self, name: &str, _description: &str) -> Result<()> {
        Err(unsupported(self.name(), &format!("security group {}", name)))
    }

    async fn add_security_rules(&self, group: &str, _protocols: &[Protocol]) -> Result<()> {
        Err(unsupported(self.name(), &format!("security rules for {}", group)))
    }

    async fn create_ports(&self, role: Role, _ports: &[PortSpec]) -> Result<()> {
        Err(unsupported(self.name(), &format!("{} network ports", role)))
    }

    /// Create `hosts` in one request and return one record per created instance
    async fn create_instances(
        &self,
        role: Role,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> Result<Vec<InstanceRecord>>;
}

#[async_trait]
impl<T: ProviderBackend + ?Sized> ProviderBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        (**self).check_auth().await
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<()> {
        (**self).create_security_group(name, description).await
    }

    async fn add_security_rules(&self, group: &str, protocols: &[Protocol]) -> Result<()> {
        (**self).add_security_rules(group, protocols).await
    }

    async fn create_ports(&self, role: Role, ports: &[PortSpec]) -> Result<()> {
        (**self).create_ports(role, ports).await
    }

    async fn create_instances(
        &self,
        role: Role,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> Result<Vec<InstanceRecord>> {
        (**self).create_instances(role, hosts, options).await
    }
}

fn unsupported(provider: &str, what: &str) -> ProvisionError {
    ProvisionError::provider(format!("{} cannot create {}", provider, what))
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
