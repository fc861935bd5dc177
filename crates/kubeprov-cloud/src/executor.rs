//! Sequential plan execution

use crate::plan::{Plan, Step};
use crate::provider::ProviderBackend;
use crate::reachability::{Backoff, ReachabilityProbe, wait_for_instances};
use crate::records::{InstanceRecord, write_records};
use crate::report::Reporter;
use kubeprov_core::{ProvisionError, ProvisionedInstance, Result, Role};
use std::collections::BTreeMap;
use std::time::Instant;

/// Result of executing a plan
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Created instances per role
    pub created: BTreeMap<Role, Vec<InstanceRecord>>,
    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ExecutionReport {
    pub fn instance_count(&self) -> usize {
        self.created.values().map(Vec::len).sum()
    }
}

/// Walks plan steps in order and stops at the first failure.
///
/// Nothing already created is cleaned up when a step fails.
pub struct PlanExecutor<'a> {
    backend: &'a dyn ProviderBackend,
    probe: &'a dyn ReachabilityProbe,
    reporter: &'a dyn Reporter,
    backoff: Backoff,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(
        backend: &'a dyn ProviderBackend,
        probe: &'a dyn ReachabilityProbe,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            backend,
            probe,
            reporter,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionReport> {
        let started = Instant::now();
        let mut report = ExecutionReport::default();

        for (index, step) in plan.steps.iter().enumerate() {
            tracing::debug!(step = index + 1, total = plan.steps.len(), "{}", step);
            self.execute_step(step, &mut report).await?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn execute_step(&self, step: &Step, report: &mut ExecutionReport) -> Result<()> {
        match step {
            Step::CreateSecurityGroup { name, description } => {
                self.reporter.info(&format!("Creating security group {}", name));
                self.backend.create_security_group(name, description).await
            }
            Step::AddSecurityRules { group, protocols } => {
                self.reporter.info(&format!("Adding security rules to {}", group));
                self.backend.add_security_rules(group, protocols).await
            }
            Step::CreateNetworkPorts { role, ports } => {
                self.reporter
                    .info(&format!("Creating {} network port(s) for {}", ports.len(), role.plural()));
                self.backend.create_ports(*role, ports).await
            }
            Step::CreateInstances {
                role,
                hosts,
                options,
            } => {
                self.reporter
                    .info(&format!("Creating {} {} instance(s)", hosts.len(), role));
                let records = self.backend.create_instances(*role, hosts, options).await?;
                if records.len() != hosts.len() {
                    return Err(ProvisionError::provider(format!(
                        "{} returned {} record(s) for {} requested {} instance(s)",
                        self.backend.name(),
                        records.len(),
                        hosts.len(),
                        role
                    )));
                }
                report.created.entry(*role).or_default().extend(records);
                Ok(())
            }
            Step::PersistRawInstances { role, destination } => {
                let records = report.created.get(role).map(Vec::as_slice).unwrap_or(&[]);
                write_records(destination, records).await
            }
            Step::WaitForReachability(check) => {
                let instances: Vec<ProvisionedInstance> = report
                    .created
                    .get(&check.role)
                    .ok_or_else(|| {
                        ProvisionError::provider(format!(
                            "no {} instances were created before the reachability check",
                            check.role
                        ))
                    })?
                    .iter()
                    .map(InstanceRecord::to_instance)
                    .collect();
                self.reporter.info(&format!(
                    "Waiting for {} {} instance(s) on port {}",
                    instances.len(),
                    check.role,
                    check.port
                ));
                wait_for_instances(self.probe, &instances, check, &self.backoff).await?;
                self.reporter
                    .success(&format!("{} instances are reachable", check.role));
                Ok(())
            }
        }
    }
}
