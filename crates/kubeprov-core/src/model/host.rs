//! Host descriptors before and after provisioning

use super::Role;
use serde::{Deserialize, Serialize};

/// Which address of an instance is used to reach it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Private,
    Public,
}

impl AddressKind {
    pub fn from_use_private_ip(use_private_ip: bool) -> Self {
        if use_private_ip {
            AddressKind::Private
        } else {
            AddressKind::Public
        }
    }
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressKind::Private => write!(f, "private"),
            AddressKind::Public => write!(f, "public"),
        }
    }
}

/// An instance to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    pub zone: Option<String>,
    pub role: Role,
}

impl HostSpec {
    pub fn new(name: impl Into<String>, zone: Option<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            zone,
            role,
        }
    }
}

/// An instance reported by a provider backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedInstance {
    pub id: String,
    pub name: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub zone: Option<String>,
    pub role: Role,
}

impl ProvisionedInstance {
    pub fn address(&self, kind: AddressKind) -> Option<&str> {
        match kind {
            AddressKind::Private => self.private_ip.as_deref(),
            AddressKind::Public => self.public_ip.as_deref(),
        }
    }
}
