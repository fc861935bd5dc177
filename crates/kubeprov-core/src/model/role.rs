//! Cluster roles and their per-role sizing

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Provisioning category of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Control-plane master
    Master,
    /// Worker node
    Node,
    /// Key-value store (etcd) node
    Etcd,
}

impl Role {
    /// Roles in provisioning order
    pub const ALL: [Role; 3] = [Role::Master, Role::Node, Role::Etcd];

    /// Plural form used in config keys and record file names
    pub fn plural(self) -> &'static str {
        match self {
            Role::Master => "masters",
            Role::Node => "nodes",
            Role::Etcd => "etcds",
        }
    }

    /// File name of the raw instance records for this role
    pub fn records_file_name(self) -> String {
        format!("{}_instances.json", self.plural())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Node => write!(f, "node"),
            Role::Etcd => write!(f, "etcd"),
        }
    }
}

/// Sizing for one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Number of instances to create
    pub count: u32,

    /// EC2 instance type (AWS)
    pub instance_type: Option<String>,

    /// IAM instance profile (AWS)
    pub instance_profile_name: Option<String>,

    /// Machine type (GCE)
    pub machine_type: Option<String>,

    /// Flavor (OpenStack)
    pub flavor: Option<String>,

    /// Boot volume size in GB (OpenStack)
    pub volume_size: Option<u32>,

    /// Boot from a volume instead of the ephemeral disk (OpenStack)
    pub boot_from_volume: bool,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            count: 0,
            instance_type: None,
            instance_profile_name: None,
            machine_type: None,
            flavor: None,
            volume_size: None,
            boot_from_volume: true,
        }
    }
}

impl RoleConfig {
    pub fn with_count(count: u32) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }
}

/// Per-role configuration indexed by [`Role`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roles {
    pub masters: RoleConfig,
    pub nodes: RoleConfig,
    pub etcds: RoleConfig,
}

impl Roles {
    /// Total number of instances requested across all roles, saturating at `u32::MAX`
    pub fn total_count(&self) -> u32 {
        Role::ALL
            .iter()
            .fold(0u32, |total, role| total.saturating_add(self[*role].count))
    }

    /// Roles with a nonzero count, in provisioning order
    pub fn requested(&self) -> impl Iterator<Item = (Role, &RoleConfig)> {
        Role::ALL
            .into_iter()
            .map(move |role| (role, &self[role]))
            .filter(|(_, config)| config.count > 0)
    }
}

impl Index<Role> for Roles {
    type Output = RoleConfig;

    fn index(&self, role: Role) -> &RoleConfig {
        match role {
            Role::Master => &self.masters,
            Role::Node => &self.nodes,
            Role::Etcd => &self.etcds,
        }
    }
}

impl IndexMut<Role> for Roles {
    fn index_mut(&mut self, role: Role) -> &mut RoleConfig {
        match role {
            Role::Master => &mut self.masters,
            Role::Node => &mut self.nodes,
            Role::Etcd => &mut self.etcds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_skips_zero_counts() {
        let mut roles = Roles::default();
        roles[Role::Master].count = 1;
        roles[Role::Etcd].count = 3;

        let requested: Vec<Role> = roles.requested().map(|(role, _)| role).collect();
        assert_eq!(requested, vec![Role::Master, Role::Etcd]);
        assert_eq!(roles.total_count(), 4);
    }

    #[test]
    fn test_total_count_saturates() {
        let mut roles = Roles::default();
        roles[Role::Master].count = u32::MAX;
        roles[Role::Node].count = 2;
        assert_eq!(roles.total_count(), u32::MAX);
    }

    #[test]
    fn test_records_file_name() {
        assert_eq!(Role::Master.records_file_name(), "masters_instances.json");
        assert_eq!(Role::Etcd.records_file_name(), "etcds_instances.json");
    }

    #[test]
    fn test_boot_from_volume_defaults_on() {
        assert!(RoleConfig::default().boot_from_volume);
    }
}
