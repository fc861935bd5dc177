//! Provisioning plan model
//!
//! A plan is the ordered list of steps a provider backend executes. Plans are
//! built up front, written to the working directory as JSON and executed
//! strictly in order.

use chrono::{DateTime, Utc};
use kubeprov_core::{AddressKind, HostSpec, Provider, ProvisionError, Result, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const SSH_PORT: u16 = 22;
pub const DEFAULT_REACHABILITY_TIMEOUT_SECS: u64 = 600;

/// IP protocol opened between cluster members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp];
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
        }
    }
}

/// A network port reserved for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name, equal to the host name
    pub name: String,
    pub network: Option<String>,
    /// CIDRs the port may also answer for (pod network)
    pub allowed_address_pairs: Vec<String>,
    pub security_groups: Vec<String>,
}

/// Provider options for instance creation, keyed by provider option name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceOptions(BTreeMap<String, Value>);

impl InstanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert only when a value is present
    pub fn insert_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Wait until every instance of a role accepts connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityCheck {
    pub role: Role,
    pub address: AddressKind,
    pub port: u16,
    pub timeout_secs: u64,
    /// Delay before the first probe
    pub initial_delay_secs: u64,
    /// Text the server must send after connecting
    pub banner: Option<String>,
}

impl ReachabilityCheck {
    /// SSH check on port 22 with the default timeout
    pub fn ssh(role: Role, address: AddressKind) -> Self {
        Self {
            role,
            address,
            port: SSH_PORT,
            timeout_secs: DEFAULT_REACHABILITY_TIMEOUT_SECS,
            initial_delay_secs: 0,
            banner: None,
        }
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    pub fn with_initial_delay(mut self, secs: u64) -> Self {
        self.initial_delay_secs = secs;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

/// One provisioning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    CreateSecurityGroup {
        name: String,
        description: String,
    },
    AddSecurityRules {
        group: String,
        protocols: Vec<Protocol>,
    },
    CreateNetworkPorts {
        role: Role,
        ports: Vec<PortSpec>,
    },
    CreateInstances {
        role: Role,
        hosts: Vec<HostSpec>,
        options: InstanceOptions,
    },
    PersistRawInstances {
        role: Role,
        destination: PathBuf,
    },
    WaitForReachability(ReachabilityCheck),
}

impl Step {
    /// Role the step belongs to, if any
    pub fn role(&self) -> Option<Role> {
        match self {
            Step::CreateSecurityGroup { .. } | Step::AddSecurityRules { .. } => None,
            Step::CreateNetworkPorts { role, .. }
            | Step::CreateInstances { role, .. }
            | Step::PersistRawInstances { role, .. } => Some(*role),
            Step::WaitForReachability(check) => Some(check.role),
        }
    }

    /// Whether the step creates network resources rather than instances
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Step::CreateSecurityGroup { .. }
                | Step::AddSecurityRules { .. }
                | Step::CreateNetworkPorts { .. }
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::CreateSecurityGroup { name, .. } => {
                write!(f, "create security group {}", name)
            }
            Step::AddSecurityRules { group, protocols } => {
                let protocols: Vec<String> = protocols.iter().map(|p| p.to_string()).collect();
                write!(f, "allow {} within {}", protocols.join("/"), group)
            }
            Step::CreateNetworkPorts { role, ports } => {
                write!(f, "create {} {} network port(s)", ports.len(), role)
            }
            Step::CreateInstances { role, hosts, .. } => {
                let names: Vec<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
                write!(
                    f,
                    "create {} {} instance(s): {}",
                    hosts.len(),
                    role,
                    names.join(", ")
                )
            }
            Step::PersistRawInstances { role, destination } => {
                write!(f, "record {} instances in {}", role, destination.display())
            }
            Step::WaitForReachability(check) => write!(
                f,
                "wait for {} instances on {} port {} (timeout {}s)",
                check.role, check.address, check.port, check.timeout_secs
            ),
        }
    }
}

/// Ordered provisioning steps for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub provider: Provider,
    pub cluster_name: String,
    pub generated_at: DateTime<Utc>,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(provider: Provider, cluster_name: impl Into<String>) -> Self {
        Self {
            provider,
            cluster_name: cluster_name.into(),
            generated_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Append the create, record and wait steps of one role
    pub fn push_role(
        &mut self,
        hosts: Vec<HostSpec>,
        options: InstanceOptions,
        destination: PathBuf,
        check: ReachabilityCheck,
    ) {
        let role = check.role;
        self.steps.push(Step::CreateInstances {
            role,
            hosts,
            options,
        });
        self.steps.push(Step::PersistRawInstances { role, destination });
        self.steps.push(Step::WaitForReachability(check));
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Hosts to create, in plan order
    pub fn hosts(&self) -> impl Iterator<Item = &HostSpec> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::CreateInstances { hosts, .. } => Some(hosts),
                _ => None,
            })
            .flatten()
    }

    pub fn instance_count(&self) -> usize {
        self.hosts().count()
    }

    /// Raw record files written by the plan, per role
    pub fn record_destinations(&self) -> Vec<(Role, &Path)> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::PersistRawInstances { role, destination } => {
                    Some((*role, destination.as_path()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut instances = BTreeMap::new();
        for host in self.hosts() {
            *instances.entry(host.role).or_insert(0) += 1;
        }
        PlanSummary {
            network_steps: self.steps.iter().filter(|s| s.is_network()).count(),
            instances,
        }
    }

    /// Write the plan as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .map_err(|e| ProvisionError::persistence(dir, e))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(|e| ProvisionError::persistence(path, e))?;
        tracing::debug!("Saved plan with {} steps to {}", self.steps.len(), path.display());
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionError::read(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Counts of planned work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub network_steps: usize,
    pub instances: BTreeMap<Role, usize>,
}

impl PlanSummary {
    pub fn total_instances(&self) -> usize {
        self.instances.values().sum()
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let per_role: Vec<String> = Role::ALL
            .iter()
            .map(|role| {
                format!(
                    "{} {}",
                    self.instances.get(role).copied().unwrap_or(0),
                    role.plural()
                )
            })
            .collect();
        write!(
            f,
            "{} instance(s) to create ({}), {} network step(s)",
            self.total_instances(),
            per_role.join(", "),
            self.network_steps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_plan() -> Plan {
        let mut plan = Plan::new(Provider::OpenStack, "k8s-otter");
        plan.push(Step::CreateSecurityGroup {
            name: "k8s-otter-x1y2z3".to_string(),
            description: "Kubernetes cluster".to_string(),
        });
        plan.push(Step::AddSecurityRules {
            group: "k8s-otter-x1y2z3".to_string(),
            protocols: Protocol::ALL.to_vec(),
        });
        let mut options = InstanceOptions::new();
        options.insert("flavor", "m1.large");
        options.insert_opt::<String>("userdata", None);
        plan.push_role(
            vec![
                HostSpec::new("k8s-otter-aaaaaa", Some("az1".into()), Role::Master),
                HostSpec::new("k8s-otter-bbbbbb", None, Role::Master),
            ],
            options,
            PathBuf::from("/tmp/masters_instances.json"),
            ReachabilityCheck::ssh(Role::Master, AddressKind::Private).with_banner("SSH"),
        );
        plan
    }

    #[test]
    fn test_push_role_order() {
        let plan = sample_plan();
        let kinds: Vec<&str> = plan
            .steps
            .iter()
            .map(|s| match s {
                Step::CreateSecurityGroup { .. } => "group",
                Step::AddSecurityRules { .. } => "rules",
                Step::CreateNetworkPorts { .. } => "ports",
                Step::CreateInstances { .. } => "create",
                Step::PersistRawInstances { .. } => "persist",
                Step::WaitForReachability(_) => "wait",
            })
            .collect();
        assert_eq!(kinds, vec!["group", "rules", "create", "persist", "wait"]);
    }

    #[test]
    fn test_summary() {
        let summary = sample_plan().summary();
        assert_eq!(summary.total_instances(), 2);
        assert_eq!(summary.network_steps, 2);
        assert_eq!(
            summary.to_string(),
            "2 instance(s) to create (2 masters, 0 nodes, 0 etcds), 2 network step(s)"
        );
    }

    #[test]
    fn test_options_skip_missing_values() {
        let plan = sample_plan();
        let Step::CreateInstances { options, .. } = &plan.steps[2] else {
            panic!("expected CreateInstances");
        };
        assert_eq!(options.get_str("flavor"), Some("m1.large"));
        assert!(!options.contains("userdata"));
    }

    #[test]
    fn test_step_serialization_is_tagged() {
        let step = Step::PersistRawInstances {
            role: Role::Etcd,
            destination: PathBuf::from("etcds_instances.json"),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["step"], "persist_raw_instances");
        assert_eq!(json["role"], "etcd");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("work").join("provision-plan.json");
        let plan = sample_plan();

        plan.save(&path).await.unwrap();
        let loaded = Plan::load(&path).await.unwrap();
        assert_eq!(loaded, plan);
        assert_eq!(loaded.record_destinations().len(), 1);
    }
}
