//! OpenStack provider for kubeprov
//!
//! Resolves Keystone credentials, plans the security group, ports and
//! servers of a cluster, and executes the plan through the `openstack` CLI.

pub mod auth;
pub mod backend;
pub mod cli;
pub mod error;
pub mod plan;

pub use auth::OpenStackAuth;
pub use backend::OpenStackBackend;
pub use error::OpenStackError;
pub use plan::OpenStackPlanBuilder;
