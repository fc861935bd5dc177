//! GCE backend

use crate::error::GceError;
use crate::gcloud::{CreateInstancesConfig, GceInstance, Gcloud};
use async_trait::async_trait;
use kubeprov_cloud::{AuthStatus, InstanceOptions, InstanceRecord, ProviderBackend};
use kubeprov_core::{GceOptions, HostSpec, Result, Role};
use std::collections::BTreeMap;

/// Provider backend driving the `gcloud` CLI
pub struct GceBackend {
    gcloud: Gcloud,
}

impl GceBackend {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }

    /// A service account key (`credentials_file`, else `pem_file`) overrides
    /// the active gcloud account
    pub fn from_options(options: &GceOptions) -> Self {
        let credential_file = options
            .credentials_file
            .clone()
            .or_else(|| options.pem_file.clone());
        Self::new(Gcloud::new(options.project_id.clone()).with_credential_file(credential_file))
    }
}

#[async_trait]
impl ProviderBackend for GceBackend {
    fn name(&self) -> &str {
        "gce"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        match self.gcloud.check_auth().await {
            Ok(Some(account)) => Ok(AuthStatus::ok(account.account)),
            Ok(None) => Ok(AuthStatus::failed("no active gcloud account")),
            Err(GceError::GcloudNotFound) => Err(GceError::GcloudNotFound.into()),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create_instances(
        &self,
        role: Role,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> Result<Vec<InstanceRecord>> {
        let config = create_config(hosts, options)?;
        let created = self.gcloud.create_instances(&config).await?;

        let mut records = Vec::with_capacity(created.len());
        for raw in created {
            let instance: GceInstance =
                serde_json::from_value(raw.clone()).map_err(GceError::from)?;
            records.push(
                InstanceRecord::new(&instance.id, &instance.name, role)
                    .with_private_ip(instance.private_ip())
                    .with_public_ip(instance.public_ip())
                    .with_zone(instance.zone_name())
                    .with_raw(raw),
            );
        }
        Ok(records)
    }
}

fn create_config(hosts: &[HostSpec], options: &InstanceOptions) -> Result<CreateInstancesConfig> {
    let machine_type = options
        .get_str("machine_type")
        .ok_or(GceError::MissingOption("machine_type"))?
        .to_string();
    let labels: BTreeMap<String, String> = options
        .get("labels")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();
    let text = |key: &str| options.get_str(key).map(str::to_string);

    Ok(CreateInstancesConfig {
        names: hosts.iter().map(|h| h.name.clone()).collect(),
        machine_type,
        zone: text("zone").or_else(|| hosts.first().and_then(|h| h.zone.clone())),
        image: text("image"),
        service_account_email: text("service_account_email"),
        network: text("network"),
        subnetwork: text("subnetwork"),
        labels,
    })
}
