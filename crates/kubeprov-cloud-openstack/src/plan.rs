//! OpenStack plan builder
//!
//! Unlike AWS and GCE, an OpenStack plan creates its own network resources:
//! a per-cluster security group opened for tcp, udp and icmp, and one port
//! per host carrying the pod network as an allowed address pair.

use crate::auth::OpenStackAuth;
use kubeprov_cloud::{
    InstanceOptions, Plan, PlanBuilder, PortSpec, Protocol, ReachabilityCheck, Step,
};
use kubeprov_core::{
    AddressKind, HostSpec, NameAllocator, NamingScheme, OpenStackOptions, Provider,
    ProviderOptions, ProvisionError, ProvisionRequest, Result, zones,
};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SECURITY_GROUP_DESCRIPTION: &str = "Contains security rules for the Kubernetes cluster";

/// Seconds to wait before the first SSH probe
const FIRST_PROBE_DELAY_SECS: u64 = 10;

type OptionFn = fn(&OpenStackOptions) -> Option<Value>;

/// Request options copied into every server creation
static SERVER_OPTIONS: &[(&str, OptionFn)] = &[
    ("image", |o| o.image.clone().map(Value::from)),
    ("key_name", |o| o.sshkey.clone().map(Value::from)),
    ("auto_ip", |o| Some(Value::from(o.floating_ip))),
    ("floating_network", |o| o.floating_network.clone().map(Value::from)),
    ("userdata", |o| o.userdata.clone().map(Value::from)),
];

/// Builds OpenStack provisioning plans
#[derive(Debug, Default, Clone)]
pub struct OpenStackPlanBuilder {
    /// `OS_*` overrides; the process environment when `None`
    env: Option<BTreeMap<String, String>>,
}

impl OpenStackPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `OS_*` variables from `env` instead of the process environment
    pub fn with_env(env: BTreeMap<String, String>) -> Self {
        Self { env: Some(env) }
    }

    pub fn resolve_auth(&self, options: &OpenStackOptions) -> Result<OpenStackAuth> {
        match &self.env {
            Some(env) => OpenStackAuth::resolve_with(options, |key| env.get(key).cloned()),
            None => OpenStackAuth::resolve(options),
        }
    }
}

impl PlanBuilder for OpenStackPlanBuilder {
    fn provider(&self) -> Provider {
        Provider::OpenStack
    }

    fn naming_scheme(&self) -> NamingScheme {
        NamingScheme::OPENSTACK
    }

    fn build_plan(&self, request: &ProvisionRequest, names: &mut NameAllocator) -> Result<Plan> {
        let ProviderOptions::OpenStack(os) = &request.provider else {
            return Err(ProvisionError::config(format!(
                "expected openstack options, got {}",
                request.provider_kind()
            )));
        };
        let auth = self.resolve_auth(os)?;
        let network_name = os
            .network
            .clone()
            .ok_or_else(|| ProvisionError::config("network is required for openstack"))?;
        // servers attach only through their port, so the port carries the network
        let network = os.network_id.clone().unwrap_or(network_name);
        if os.floating_ip && os.floating_network.is_none() {
            return Err(ProvisionError::config(
                "floating_network is required when floating_ip is enabled",
            ));
        }

        let cluster = names.cluster_name(self.naming_scheme())?;
        let security_group = format!("{}-{}", cluster, names.suffix());

        let mut shared = InstanceOptions::new();
        for (key, source) in SERVER_OPTIONS {
            shared.insert_opt(*key, source(os));
        }
        shared.insert_opt("region_name", auth.region_name.clone());
        shared.insert("security_groups", vec![security_group.clone()]);

        // servers are only reachable on their public address through a floating IP
        let address = if os.floating_ip {
            request.address_kind()
        } else {
            AddressKind::Private
        };

        let mut plan = Plan::new(Provider::OpenStack, &cluster);
        plan.push(Step::CreateSecurityGroup {
            name: security_group.clone(),
            description: SECURITY_GROUP_DESCRIPTION.to_string(),
        });
        plan.push(Step::AddSecurityRules {
            group: security_group.clone(),
            protocols: Protocol::ALL.to_vec(),
        });

        for (role, config) in request.roles.requested() {
            let flavor = config.flavor.clone().ok_or_else(|| {
                ProvisionError::config(format!("{}_flavor is required for openstack", role.plural()))
            })?;
            if config.boot_from_volume && config.volume_size.is_none() {
                return Err(ProvisionError::config(format!(
                    "{}_volume_size is required when booting from a volume",
                    role.plural()
                )));
            }

            let instance_names = names.instance_names(&cluster, config.count as usize);
            plan.push(Step::CreateNetworkPorts {
                role,
                ports: instance_names
                    .iter()
                    .map(|name| PortSpec {
                        name: name.clone(),
                        network: Some(network.clone()),
                        allowed_address_pairs: os.kube_network.iter().cloned().collect(),
                        security_groups: vec![security_group.clone()],
                    })
                    .collect(),
            });

            let placed = zones::distribute(&instance_names, &os.availability_zones);
            let mut options = shared.clone();
            options.insert("flavor", flavor);
            options.insert("boot_from_volume", config.boot_from_volume);
            options.insert_opt("volume_size", config.volume_size);
            let hosts = placed
                .into_iter()
                .map(|(name, zone)| HostSpec::new(name, zone, role))
                .collect();

            plan.push_role(
                hosts,
                options,
                request.records_path(role),
                ReachabilityCheck::ssh(role, address)
                    .with_banner("SSH")
                    .with_initial_delay(FIRST_PROBE_DELAY_SECS),
            );
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeprov_core::{Role, WordList};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn options() -> OpenStackOptions {
        OpenStackOptions {
            auth_url: Some("https://keystone.example:5000/v3".to_string()),
            username: Some("ops".to_string()),
            password: Some("hunter2".to_string()),
            project_name: Some("k8s".to_string()),
            region_name: Some("RegionOne".to_string()),
            network: Some("private".to_string()),
            kube_network: Some("10.233.0.0/16".to_string()),
            image: Some("ubuntu-24.04".to_string()),
            sshkey: Some("ops-key".to_string()),
            ..Default::default()
        }
    }

    fn request(options: OpenStackOptions) -> ProvisionRequest {
        let mut request =
            ProvisionRequest::new(ProviderOptions::OpenStack(options), "/tmp/kubeprov")
                .with_count(Role::Master, 1)
                .with_count(Role::Node, 5);
        request.cluster_name = Some("lab".to_string());
        for role in [Role::Master, Role::Node] {
            request.roles[role].flavor = Some("m1.large".to_string());
            request.roles[role].volume_size = Some(40);
        }
        request
    }

    fn names(request: &ProvisionRequest) -> NameAllocator {
        NameAllocator::with_rng(WordList::default(), StdRng::seed_from_u64(17)).with_mode(
            kubeprov_core::NamingMode::Fresh {
                cluster_name: request.cluster_name.clone(),
            },
        )
    }

    fn build(request: &ProvisionRequest) -> Result<Plan> {
        OpenStackPlanBuilder::with_env(BTreeMap::new()).build_plan(request, &mut names(request))
    }

    #[test]
    fn test_network_steps_come_first() {
        let request = request(options());
        let plan = build(&request).unwrap();
        assert_eq!(plan.cluster_name, "k8s-lab");

        let Step::CreateSecurityGroup { name, .. } = &plan.steps[0] else {
            panic!("expected a security group first, got {}", plan.steps[0]);
        };
        assert!(name.starts_with("k8s-lab-"));
        assert_eq!(
            plan.steps[1],
            Step::AddSecurityRules {
                group: name.clone(),
                protocols: vec![Protocol::Tcp, Protocol::Udp, Protocol::Icmp],
            }
        );
        assert!(matches!(plan.steps[2], Step::CreateNetworkPorts { role: Role::Master, .. }));
        assert!(matches!(plan.steps[3], Step::CreateInstances { role: Role::Master, .. }));
    }

    #[test]
    fn test_one_port_per_host() {
        let plan = build(&request(options())).unwrap();
        let ports = plan
            .steps
            .iter()
            .find_map(|s| match s {
                Step::CreateNetworkPorts { role: Role::Node, ports } => Some(ports),
                _ => None,
            })
            .unwrap();
        let hosts: Vec<&str> = plan
            .hosts()
            .filter(|h| h.role == Role::Node)
            .map(|h| h.name.as_str())
            .collect();
        let port_names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(port_names, hosts);
        assert!(ports.iter().all(|p| p.network.as_deref() == Some("private")));
        assert!(ports.iter().all(|p| p.allowed_address_pairs == ["10.233.0.0/16"]));
    }

    #[test]
    fn test_zones_distributed() {
        let mut options = options();
        options.availability_zones = vec!["A".to_string(), "B".to_string()];
        let plan = build(&request(options)).unwrap();

        let zones: Vec<Option<&str>> = plan
            .hosts()
            .filter(|h| h.role == Role::Node)
            .map(|h| h.zone.as_deref())
            .collect();
        assert_eq!(
            zones,
            vec![Some("A"), Some("A"), Some("B"), Some("B"), None]
        );
    }

    #[test]
    fn test_ports_prefer_network_id() {
        let mut options = options();
        options.network_id = Some("4f2d9a".to_string());
        let plan = build(&request(options)).unwrap();

        for step in &plan.steps {
            match step {
                Step::CreateNetworkPorts { ports, .. } => {
                    assert!(ports.iter().all(|p| p.network.as_deref() == Some("4f2d9a")));
                }
                Step::CreateInstances { options, .. } => {
                    assert!(!options.contains("network_id"));
                    assert!(!options.contains("availability_zone"));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_missing_credentials() {
        let mut options = options();
        options.username = None;
        let err = build(&request(options)).unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration(_)));
    }

    #[test]
    fn test_private_address_without_floating_ip() {
        let plan = build(&request(options())).unwrap();
        for step in &plan.steps {
            if let Step::WaitForReachability(check) = step {
                assert_eq!(check.address, AddressKind::Private);
                assert_eq!(check.banner.as_deref(), Some("SSH"));
                assert_eq!(check.initial_delay_secs, 10);
            }
        }
    }

    #[test]
    fn test_public_address_with_floating_ip() {
        let mut options = options();
        options.floating_ip = true;
        options.floating_network = Some("ext-net".to_string());
        let plan = build(&request(options)).unwrap();
        let check = plan
            .steps
            .iter()
            .find_map(|s| match s {
                Step::WaitForReachability(check) => Some(check),
                _ => None,
            })
            .unwrap();
        assert_eq!(check.address, AddressKind::Public);
    }

    #[test]
    fn test_password_not_in_plan() {
        let plan = build(&request(options())).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_volume_size_required_for_volume_boot() {
        let mut request = request(options());
        request.roles[Role::Node].volume_size = None;
        assert!(build(&request).is_err());

        request.roles[Role::Node].boot_from_volume = false;
        assert!(build(&request).is_ok());
    }
}
