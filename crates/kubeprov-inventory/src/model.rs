//! Inventory model and additive merge

use kubeprov_core::{AddressKind, ProvisionRequest, ProvisionedInstance, Role};
use std::collections::{BTreeMap, HashMap};

pub const ALL: &str = "all";
pub const KUBE_MASTER: &str = "kube-master";
pub const KUBE_NODE: &str = "kube-node";
pub const ETCD: &str = "etcd";
pub const K8S_CLUSTER: &str = "k8s-cluster";

/// Connection variable holding the address Ansible connects to
pub const SSH_HOST_VAR: &str = "ansible_ssh_host";
/// Private address used for cluster-internal traffic
pub const IP_VAR: &str = "ip";

/// Kind of an INI section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `[group]`: host names
    Hosts,
    /// `[group:children]`: group names
    Children,
    /// `[group:vars]`: `key=value` lines
    Vars,
}

impl SectionKind {
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            SectionKind::Hosts => None,
            SectionKind::Children => Some("children"),
            SectionKind::Vars => Some("vars"),
        }
    }
}

/// One section of the inventory, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub entries: Vec<String>,
}

impl Section {
    fn new(name: &str, kind: SectionKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            entries: Vec::new(),
        }
    }

    pub fn header(&self) -> String {
        match self.kind.suffix() {
            Some(suffix) => format!("[{}:{}]", self.name, suffix),
            None => format!("[{}]", self.name),
        }
    }
}

/// A host and its connection variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub hostname: String,
    pub vars: Vec<(String, String)>,
}

impl InventoryEntry {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            vars: Vec::new(),
        }
    }

    /// Entry for a freshly provisioned instance
    pub fn from_instance(instance: &ProvisionedInstance, address: AddressKind) -> Self {
        let mut entry = Self::new(&instance.name);
        if let Some(host) = instance
            .address(address)
            .or(instance.private_ip.as_deref())
        {
            entry.set_var_if_absent(SSH_HOST_VAR, host);
        }
        if let Some(ip) = instance.private_ip.as_deref() {
            entry.set_var_if_absent(IP_VAR, ip);
        }
        entry
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` unless the entry already has it
    pub fn set_var_if_absent(&mut self, key: &str, value: &str) {
        if self.var(key).is_none() {
            self.vars.push((key.to_string(), value.to_string()));
        }
    }
}

/// Which groups a provisioned role lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPlacement {
    pub address: AddressKind,
    pub etcd_on_masters: bool,
}

impl GroupPlacement {
    pub fn from_request(request: &ProvisionRequest) -> Self {
        Self {
            address: request.address_kind(),
            etcd_on_masters: request.etcd_on_masters,
        }
    }

    pub fn groups_for(&self, role: Role) -> Vec<&'static str> {
        match role {
            Role::Master if self.etcd_on_masters => vec![KUBE_MASTER, ETCD],
            Role::Master => vec![KUBE_MASTER],
            Role::Node => vec![KUBE_NODE],
            Role::Etcd => vec![ETCD],
        }
    }
}

/// Hostname-keyed host arena plus the ordered INI sections referencing it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    hosts: Vec<InventoryEntry>,
    index: HashMap<String, usize>,
    sections: Vec<Section>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn host(&self, hostname: &str) -> Option<&InventoryEntry> {
        self.index.get(hostname).map(|&i| &self.hosts[i])
    }

    pub fn hosts(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.hosts.iter()
    }

    /// First host of the `all` group, or the first host seen when there is none
    pub fn first_host(&self) -> Option<&InventoryEntry> {
        self.group(ALL)
            .first()
            .and_then(|name| self.host(name))
            .or_else(|| self.hosts.first())
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn section(&self, name: &str, kind: SectionKind) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name == name && s.kind == kind)
    }

    pub(crate) fn section_mut(&mut self, name: &str, kind: SectionKind) -> &mut Section {
        let position = self
            .sections
            .iter()
            .position(|s| s.name == name && s.kind == kind);
        let index = match position {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name, kind));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    /// Host names of `group`, in file order
    pub fn group(&self, group: &str) -> Vec<&str> {
        self.section(group, SectionKind::Hosts)
            .map(|s| s.entries.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Child groups of `group`
    pub fn children(&self, group: &str) -> Vec<&str> {
        self.section(group, SectionKind::Children)
            .map(|s| s.entries.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Entry for `hostname`, created when missing
    pub(crate) fn upsert_host(&mut self, hostname: &str) -> &mut InventoryEntry {
        let index = match self.index.get(hostname) {
            Some(&index) => index,
            None => {
                self.hosts.push(InventoryEntry::new(hostname));
                let index = self.hosts.len() - 1;
                self.index.insert(hostname.to_string(), index);
                index
            }
        };
        &mut self.hosts[index]
    }

    /// Add `entry` unless a host with the same name exists. Returns whether it was added.
    pub fn insert_host(&mut self, entry: InventoryEntry) -> bool {
        if self.index.contains_key(&entry.hostname) {
            return false;
        }
        self.index.insert(entry.hostname.clone(), self.hosts.len());
        self.hosts.push(entry);
        true
    }

    pub(crate) fn push_unique(&mut self, name: &str, kind: SectionKind, value: &str) {
        let section = self.section_mut(name, kind);
        if !section.entries.iter().any(|e| e == value) {
            section.entries.push(value.to_string());
        }
    }

    pub fn add_to_group(&mut self, group: &str, hostname: &str) {
        self.push_unique(group, SectionKind::Hosts, hostname);
    }

    pub fn add_child(&mut self, group: &str, child: &str) {
        self.push_unique(group, SectionKind::Children, child);
    }

    fn ensure_layout(&mut self) {
        for group in [ALL, KUBE_MASTER, KUBE_NODE, ETCD] {
            self.section_mut(group, SectionKind::Hosts);
        }
        self.add_child(K8S_CLUSTER, KUBE_NODE);
        self.add_child(K8S_CLUSTER, KUBE_MASTER);
    }

    /// Merge freshly provisioned instances into a copy of this inventory.
    ///
    /// Hosts already present keep their variables; re-merging the same
    /// instances yields the same inventory.
    pub fn merge(
        &self,
        new_by_role: &BTreeMap<Role, Vec<ProvisionedInstance>>,
        placement: &GroupPlacement,
    ) -> Inventory {
        let mut merged = self.clone();
        merged.ensure_layout();

        for (role, instances) in new_by_role {
            for instance in instances {
                if !merged.insert_host(InventoryEntry::from_instance(instance, placement.address)) {
                    tracing::debug!("{} is already in the inventory", instance.name);
                }
                merged.add_to_group(ALL, &instance.name);
                for group in placement.groups_for(*role) {
                    merged.add_to_group(group, &instance.name);
                }
            }
        }

        merged
    }
}

impl std::fmt::Display for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::ini::render(self))
    }
}
