//! EC2 backend

use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::{Credentials, Region};
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::operation::run_instances::builders::RunInstancesFluentBuilder;
use aws_sdk_ec2::types::{
    IamInstanceProfileSpecification, Instance, InstanceNetworkInterfaceSpecification,
    InstanceStateName, InstanceType, ResourceType, Tag, TagSpecification,
};
use kubeprov_cloud::{AuthStatus, Backoff, InstanceOptions, InstanceRecord, ProviderBackend};
use kubeprov_core::{AwsOptions, HostSpec, Role};
use serde_json::json;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// How long `wait` polls for instances to enter `running`
const RUNNING_TIMEOUT: Duration = Duration::from_secs(300);

/// How long new instance IDs may stay invisible to other EC2 calls
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";

/// Failed EC2 call, split on whether the instance may simply not be visible yet
#[derive(Debug)]
enum CallError {
    NotFound(String),
    Other(String),
}

impl CallError {
    fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let not_found = err.code() == Some(INSTANCE_NOT_FOUND);
        let message = DisplayErrorContext(err).to_string();
        if not_found {
            CallError::NotFound(message)
        } else {
            CallError::Other(message)
        }
    }
}

/// Run `call` until it stops failing with `InvalidInstanceID.NotFound`.
///
/// EC2 is eventually consistent: an instance returned by `RunInstances` can
/// be unknown to `CreateTags` and `DescribeInstances` for a few seconds.
async fn retry_not_found<T, F, Fut>(backoff: &Backoff, timeout: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(CallError::Other(message)) => return Err(AwsError::Api(message)),
            Err(CallError::NotFound(message)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(AwsError::Api(message));
                }
                tracing::debug!(attempt, "instance not visible yet: {}", message);
                sleep(backoff.delay_for_attempt(attempt).min(deadline - now)).await;
                attempt += 1;
            }
        }
    }
}

/// Put subnet and security groups on the request.
///
/// A public address has to be requested on the network interface, and an
/// interface only takes security group IDs.
fn apply_network(
    mut request: RunInstancesFluentBuilder,
    options: &InstanceOptions,
) -> Result<RunInstancesFluentBuilder> {
    let subnet = options.get_str("vpc_subnet_id");
    let group_id = options.get_str("group_id");
    let group = options.get_str("group");

    if options.get_bool("assign_public_ip").unwrap_or(false) {
        if group.is_some() && group_id.is_none() {
            return Err(AwsError::Configuration(
                "security group names cannot be used with assign_public_ip, set group_id".to_string(),
            ));
        }
        let mut interface = InstanceNetworkInterfaceSpecification::builder()
            .device_index(0)
            .associate_public_ip_address(true);
        if let Some(subnet) = subnet {
            interface = interface.subnet_id(subnet);
        }
        if let Some(group_id) = group_id {
            interface = interface.groups(group_id);
        }
        return Ok(request.network_interfaces(interface.build()));
    }

    if let Some(subnet) = subnet {
        request = request.subnet_id(subnet);
    }
    if let Some(group_id) = group_id {
        request = request.security_group_ids(group_id);
    }
    if let Some(group) = group {
        request = request.security_groups(group);
    }
    Ok(request)
}

/// Provider backend talking to the EC2 API
pub struct Ec2Backend {
    client: Client,
    region: Option<String>,
    backoff: Backoff,
}

impl Ec2Backend {
    pub fn new(client: Client, region: Option<String>) -> Self {
        Self {
            client,
            region,
            backoff: Backoff::default(),
        }
    }

    /// Build a client from request options, falling back to the default
    /// credential chain when no keys are configured
    pub async fn from_options(options: &AwsOptions) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&options.access_key, &options.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "kubeprov",
            ));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config), options.region.clone())
    }

    async fn run_instances(
        &self,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> Result<Vec<Instance>> {
        let image = options
            .get_str("image")
            .ok_or(AwsError::MissingOption("image"))?;
        let instance_type = options
            .get_str("instance_type")
            .ok_or(AwsError::MissingOption("instance_type"))?;
        let count = hosts.len() as i32;

        let mut request = self
            .client
            .run_instances()
            .image_id(image)
            .instance_type(InstanceType::from(instance_type))
            .min_count(count)
            .max_count(count);

        if let Some(key_name) = options.get_str("key_name") {
            request = request.key_name(key_name);
        }
        if let Some(profile) = options.get_str("instance_profile_name") {
            request = request.iam_instance_profile(
                IamInstanceProfileSpecification::builder()
                    .name(profile)
                    .build(),
            );
        }

        request = apply_network(request, options)?;

        if let Some(tags) = options.get("instance_tags").and_then(|v| v.as_object()) {
            let mut spec = TagSpecification::builder().resource_type(ResourceType::Instance);
            for (key, value) in tags {
                spec = spec.tags(
                    Tag::builder()
                        .key(key)
                        .value(value.as_str().unwrap_or_default())
                        .build(),
                );
            }
            request = request.tag_specifications(spec.build());
        }

        tracing::debug!("ec2 run_instances: {} x {} ({})", count, instance_type, image);
        let output = request
            .send()
            .await
            .map_err(|e| AwsError::Api(DisplayErrorContext(e).to_string()))?;
        Ok(output.instances().to_vec())
    }

    async fn name_instances(&self, instances: &[Instance], hosts: &[HostSpec]) -> Result<()> {
        for (instance, host) in instances.iter().zip(hosts) {
            let Some(id) = instance.instance_id() else {
                continue;
            };
            retry_not_found(&self.backoff, VISIBILITY_TIMEOUT, || {
                let send = self
                    .client
                    .create_tags()
                    .resources(id)
                    .tags(Tag::builder().key("Name").value(&host.name).build())
                    .send();
                async move { send.await.map_err(CallError::from_sdk) }
            })
            .await?;
        }
        Ok(())
    }

    /// Poll until every instance is `running`, returning the refreshed descriptions
    async fn wait_running(&self, ids: &[String]) -> Result<Vec<Instance>> {
        let deadline = Instant::now() + RUNNING_TIMEOUT;
        let mut attempt = 0;

        loop {
            let output = retry_not_found(
                &self.backoff,
                deadline.saturating_duration_since(Instant::now()),
                || {
                    let send = self
                        .client
                        .describe_instances()
                        .set_instance_ids(Some(ids.to_vec()))
                        .send();
                    async move { send.await.map_err(CallError::from_sdk) }
                },
            )
            .await?;

            let instances: Vec<Instance> = output
                .reservations()
                .iter()
                .flat_map(|r| r.instances().iter().cloned())
                .collect();

            let running = instances
                .iter()
                .filter(|i| {
                    i.state().and_then(|s| s.name()) == Some(&InstanceStateName::Running)
                })
                .count();
            if running == ids.len() {
                return Ok(instances);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AwsError::Timeout(format!(
                    "{} of {} instance(s) running after {}s",
                    running,
                    ids.len(),
                    RUNNING_TIMEOUT.as_secs()
                )));
            }
            tracing::debug!("{}/{} instance(s) running", running, ids.len());
            sleep(self.backoff.delay_for_attempt(attempt).min(deadline - now)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ProviderBackend for Ec2Backend {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> kubeprov_core::Result<AuthStatus> {
        match self.client.describe_regions().send().await {
            Ok(_) => Ok(AuthStatus::ok(format!(
                "region {}",
                self.region.as_deref().unwrap_or("default")
            ))),
            Err(e) => Ok(AuthStatus::failed(DisplayErrorContext(e).to_string())),
        }
    }

    async fn create_instances(
        &self,
        role: Role,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> kubeprov_core::Result<Vec<InstanceRecord>> {
        let launched = self.run_instances(hosts, options).await?;
        self.name_instances(&launched, hosts).await?;

        let ids: Vec<String> = launched
            .iter()
            .filter_map(|i| i.instance_id().map(str::to_string))
            .collect();
        let instances = if options.get_bool("wait").unwrap_or(false) && !ids.is_empty() {
            self.wait_running(&ids).await?
        } else {
            launched
        };

        // describe_instances does not keep launch order
        let records = ids
            .iter()
            .zip(hosts)
            .filter_map(|(id, host)| {
                instances
                    .iter()
                    .find(|i| i.instance_id() == Some(id.as_str()))
                    .map(|instance| record_from_instance(instance, &host.name, role))
            })
            .collect();
        Ok(records)
    }
}

/// Normalize an EC2 instance description
pub fn record_from_instance(instance: &Instance, name: &str, role: Role) -> InstanceRecord {
    let id = instance.instance_id().unwrap_or_default();
    let zone = instance
        .placement()
        .and_then(|p| p.availability_zone())
        .map(str::to_string);
    let raw = json!({
        "instance_id": id,
        "image_id": instance.image_id(),
        "instance_type": instance.instance_type().map(|t| t.as_str()),
        "state": instance.state().and_then(|s| s.name()).map(|n| n.as_str()),
        "private_ip_address": instance.private_ip_address(),
        "public_ip_address": instance.public_ip_address(),
        "private_dns_name": instance.private_dns_name(),
        "public_dns_name": instance.public_dns_name(),
        "availability_zone": zone,
        "subnet_id": instance.subnet_id(),
        "vpc_id": instance.vpc_id(),
        "key_name": instance.key_name(),
    });

    InstanceRecord::new(id, name, role)
        .with_private_ip(instance.private_ip_address().map(str::to_string))
        .with_public_ip(instance.public_ip_address().map(str::to_string))
        .with_zone(zone)
        .with_raw(raw)
}
