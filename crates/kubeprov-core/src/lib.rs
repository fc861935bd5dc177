//! kubeprov core
//!
//! Provider-independent building blocks for provisioning Kubernetes hosts:
//! the request model, cluster and instance naming, zone placement and tag
//! parsing.
//!
//! ```text
//!   config file + flags
//!          │
//! ┌────────▼─────────┐     ┌────────────────┐     ┌──────────────┐
//! │ ProvisionRequest │ ──▶ │ NameAllocator  │ ──▶ │ zones::      │
//! │  (config, model) │     │   (naming)     │     │  distribute  │
//! └──────────────────┘     └────────────────┘     └──────────────┘
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod naming;
pub mod tags;
pub mod zones;

// Re-exports
pub use config::{Overrides, RequestFile, load_request, load_request_file};
pub use error::{ProvisionError, Result};
pub use model::{
    AddressKind, AwsOptions, GceOptions, HostSpec, OpenStackOptions, PLAN_FILE, Provider,
    ProviderOptions, ProvisionRequest, ProvisionedInstance, Role, RoleConfig, Roles,
};
pub use naming::{NameAllocator, NamingMode, NamingScheme, WordList, recover_cluster_name};
pub use tags::parse_tags;
