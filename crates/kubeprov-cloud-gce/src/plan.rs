//! GCE plan builder

use kubeprov_cloud::{InstanceOptions, Plan, PlanBuilder, ReachabilityCheck};
use kubeprov_core::{
    GceOptions, HostSpec, NameAllocator, NamingScheme, Provider, ProviderOptions, ProvisionError,
    ProvisionRequest, Result, parse_tags,
};
use serde_json::Value;

type OptionFn = fn(&GceOptions) -> Option<Value>;

fn path_value(path: &Option<std::path::PathBuf>) -> Option<Value> {
    path.as_ref().map(|p| Value::from(p.display().to_string()))
}

/// Request options copied into every instance creation
static GCE_OPTIONS: &[(&str, OptionFn)] = &[
    ("image", |o| o.image.clone().map(Value::from)),
    ("zone", |o| o.zone.clone().map(Value::from)),
    ("service_account_email", |o| o.service_account_email.clone().map(Value::from)),
    ("pem_file", |o| path_value(&o.pem_file)),
    ("credentials_file", |o| path_value(&o.credentials_file)),
    ("project_id", |o| o.project_id.clone().map(Value::from)),
    ("network", |o| o.network.clone().map(Value::from)),
    ("subnetwork", |o| o.subnetwork.clone().map(Value::from)),
];

/// Builds GCE provisioning plans
#[derive(Debug, Default, Clone, Copy)]
pub struct GcePlanBuilder;

impl GcePlanBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl PlanBuilder for GcePlanBuilder {
    fn provider(&self) -> Provider {
        Provider::Gce
    }

    fn naming_scheme(&self) -> NamingScheme {
        NamingScheme::GCE
    }

    fn build_plan(&self, request: &ProvisionRequest, names: &mut NameAllocator) -> Result<Plan> {
        let ProviderOptions::Gce(gce) = &request.provider else {
            return Err(ProvisionError::config(format!(
                "expected gce options, got {}",
                request.provider_kind()
            )));
        };
        let labels = parse_tags(&request.tags)?;

        let mut shared = InstanceOptions::new();
        for (key, source) in GCE_OPTIONS {
            shared.insert_opt(*key, source(gce));
        }
        if !labels.is_empty() {
            shared.insert("labels", serde_json::to_value(&labels)?);
        }

        let cluster = names.cluster_name(self.naming_scheme())?;
        let mut plan = Plan::new(Provider::Gce, &cluster);

        for (role, config) in request.roles.requested() {
            let machine_type = config.machine_type.clone().ok_or_else(|| {
                ProvisionError::config(format!("{}_machine_type is required for gce", role.plural()))
            })?;

            let instance_names = names.instance_names(&cluster, config.count as usize);
            let mut options = shared.clone();
            options.insert("machine_type", machine_type);
            options.insert("instance_names", instance_names.clone());

            let hosts = instance_names
                .into_iter()
                .map(|name| HostSpec::new(name, gce.zone.clone(), role))
                .collect();

            plan.push_role(
                hosts,
                options,
                request.records_path(role),
                ReachabilityCheck::ssh(role, request.address_kind()),
            );
        }

        Ok(plan)
    }
}
