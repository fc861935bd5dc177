//! kubeprov cloud provisioning
//!
//! Provider abstraction and run orchestration for kubeprov.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  kubeprov CLI                    │
//! │           (kubeprov aws|gce|openstack)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                kubeprov-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          ProvisionOrchestrator            │   │
//! │  │  trait PlanBuilder / ProviderBackend      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ PlanExecutor │  │ Raw records  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬─────────────┬─────────┘
//!         │                 │             │
//! ┌───────▼──────┐ ┌────────▼─────┐ ┌─────▼────────┐
//! │     aws      │ │     gce      │ │  openstack   │
//! │  (EC2 API)   │ │ (gcloud CLI) │ │ (openstack)  │
//! └──────────────┘ └──────────────┘ └──────────────┘
//! ```

pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod provider;
pub mod reachability;
pub mod records;
pub mod report;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports
pub use executor::{ExecutionReport, PlanExecutor};
pub use orchestrator::{AssumeYes, Confirm, ProvisionOrchestrator, ProvisionOutcome, RunState};
pub use plan::{
    InstanceOptions, Plan, PlanSummary, PortSpec, Protocol, ReachabilityCheck, SSH_PORT, Step,
};
pub use provider::{AuthStatus, PlanBuilder, ProviderBackend};
pub use reachability::{Backoff, ReachabilityProbe, TcpProbe};
pub use records::{InstanceRecord, read_records, write_records};
pub use report::Reporter;
