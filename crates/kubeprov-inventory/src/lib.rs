//! kubeprov inventory
//!
//! Reads, merges and writes the Ansible inventory consumed by the Kubernetes
//! deployment playbooks. Merging is strictly additive: hosts and variables
//! already in the inventory are never changed or removed.

pub mod group_vars;
pub mod ini;
pub mod model;
pub mod store;

// Re-exports
pub use group_vars::update_group_vars;
pub use model::{
    ALL, ETCD, GroupPlacement, Inventory, InventoryEntry, K8S_CLUSTER, KUBE_MASTER, KUBE_NODE,
    Section, SectionKind,
};
pub use store::InventoryStore;
