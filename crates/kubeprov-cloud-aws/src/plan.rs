//! EC2 plan builder

use kubeprov_cloud::{InstanceOptions, Plan, PlanBuilder, ReachabilityCheck};
use kubeprov_core::{
    AwsOptions, HostSpec, NameAllocator, NamingScheme, Provider, ProviderOptions, ProvisionError,
    ProvisionRequest, Result, parse_tags,
};
use serde_json::Value;

type OptionFn = fn(&AwsOptions) -> Option<Value>;

/// Request options copied into every instance creation, as `(option, source)`.
///
/// Credentials are deliberately absent: they are handed to the backend
/// directly and never written to the plan file.
static EC2_OPTIONS: &[(&str, OptionFn)] = &[
    ("image", |o| o.ami.clone().map(Value::from)),
    ("group_id", |o| o.security_group_id.clone().map(Value::from)),
    ("group", |o| o.security_group_name.clone().map(Value::from)),
    ("key_name", |o| o.key_name.clone().map(Value::from)),
    ("vpc_subnet_id", |o| o.vpc_subnet_id.clone().map(Value::from)),
    ("assign_public_ip", |o| o.assign_public_ip.map(Value::from)),
    ("region", |o| o.region.clone().map(Value::from)),
];

/// Builds EC2 provisioning plans
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsPlanBuilder;

impl AwsPlanBuilder {
    pub fn new() -> Self {
        Self
    }

    fn options(request: &ProvisionRequest) -> Result<&AwsOptions> {
        match &request.provider {
            ProviderOptions::Aws(options) => Ok(options),
            other => Err(ProvisionError::config(format!(
                "expected aws options, got {}",
                other.provider()
            ))),
        }
    }
}

impl PlanBuilder for AwsPlanBuilder {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn naming_scheme(&self) -> NamingScheme {
        NamingScheme::AWS
    }

    fn build_plan(&self, request: &ProvisionRequest, names: &mut NameAllocator) -> Result<Plan> {
        let aws = Self::options(request)?;
        if aws.ami.is_none() {
            return Err(ProvisionError::config("ami is required for aws"));
        }
        if aws.assign_public_ip == Some(true)
            && aws.security_group_name.is_some()
            && aws.security_group_id.is_none()
        {
            return Err(ProvisionError::config(
                "assign_public_ip needs security_group_id; a security group name cannot be set on the network interface",
            ));
        }
        let tags = parse_tags(&request.tags)?;

        let mut shared = InstanceOptions::new();
        for (key, source) in EC2_OPTIONS {
            shared.insert_opt(*key, source(aws));
        }
        if !tags.is_empty() {
            shared.insert("instance_tags", serde_json::to_value(&tags)?);
        }

        let cluster = names.cluster_name(self.naming_scheme())?;
        let mut plan = Plan::new(Provider::Aws, &cluster);

        for (role, config) in request.roles.requested() {
            let instance_type = config.instance_type.clone().ok_or_else(|| {
                ProvisionError::config(format!("{}_instance_type is required for aws", role.plural()))
            })?;

            let mut options = shared.clone();
            options.insert("count", config.count);
            options.insert("instance_type", instance_type);
            options.insert_opt("instance_profile_name", config.instance_profile_name.clone());
            options.insert("wait", true);

            // placement follows the subnet
            let hosts = names
                .instance_names(&cluster, config.count as usize)
                .into_iter()
                .map(|name| HostSpec::new(name, None, role))
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
