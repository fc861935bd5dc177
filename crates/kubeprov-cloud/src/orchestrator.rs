//! Provisioning run driver
//!
//! ```text
//! Idle ──▶ Confirmed ──▶ Provisioning ──▶ Collecting ──▶ Merged ──▶ Done
//!   │          │               │               │            │
//!   └──────────┴─▶ Aborted     └───────────────┴────────────┴─▶ Failed
//! ```
//!
//! A run never merges a partial result: the inventory is only written once
//! every plan step has succeeded.

use crate::executor::PlanExecutor;
use crate::plan::Plan;
use crate::provider::{PlanBuilder, ProviderBackend};
use crate::reachability::{Backoff, ReachabilityProbe, TcpProbe};
use crate::records::read_records;
use crate::report::Reporter;
use kubeprov_core::{
    NameAllocator, NamingMode, ProvisionError, ProvisionRequest, ProvisionedInstance, Result,
    Role,
};
use kubeprov_inventory::{GroupPlacement, Inventory, InventoryStore, update_group_vars};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Asks the operator a yes/no question
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

impl<T: Confirm + ?Sized> Confirm for Arc<T> {
    fn confirm(&self, question: &str) -> bool {
        (**self).confirm(question)
    }
}

/// Answers yes without asking
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

/// Phase of a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Confirmed,
    Provisioning,
    Collecting,
    Merged,
    Done,
    Aborted,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Confirmed => "confirmed",
            RunState::Provisioning => "provisioning",
            RunState::Collecting => "collecting",
            RunState::Merged => "merged",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a successful run produced
#[derive(Debug)]
pub struct ProvisionOutcome {
    pub plan: Plan,
    pub inventory: Inventory,
    /// Instances created by this run, per role
    pub added: BTreeMap<Role, Vec<ProvisionedInstance>>,
    /// Group vars files that were rewritten
    pub group_vars: Vec<PathBuf>,
}

impl ProvisionOutcome {
    pub fn added_count(&self) -> usize {
        self.added.values().map(Vec::len).sum()
    }
}

pub struct ProvisionOrchestrator {
    builder: Box<dyn PlanBuilder>,
    backend: Box<dyn ProviderBackend>,
    confirm: Box<dyn Confirm>,
    reporter: Box<dyn Reporter>,
    probe: Box<dyn ReachabilityProbe>,
    backoff: Backoff,
    state: RunState,
    history: Vec<RunState>,
}

impl ProvisionOrchestrator {
    pub fn new(
        builder: Box<dyn PlanBuilder>,
        backend: Box<dyn ProviderBackend>,
        confirm: Box<dyn Confirm>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        Self {
            builder,
            backend,
            confirm,
            reporter,
            probe: Box::new(TcpProbe::default()),
            backoff: Backoff::default(),
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn ReachabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state the run went through, starting with `Idle`
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("Run state {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, err: ProvisionError) -> ProvisionError {
        self.reporter.error(&err.to_string());
        self.transition(RunState::Failed);
        err
    }

    /// Read the current inventory and build the plan without side effects
    pub fn prepare_plan(
        &self,
        request: &ProvisionRequest,
        names: &mut NameAllocator,
    ) -> Result<(Inventory, Plan)> {
        request.validate()?;
        if request.provider_kind() != self.builder.provider() {
            return Err(ProvisionError::config(format!(
                "request is for {} but the plan builder targets {}",
                request.provider_kind(),
                self.builder.provider()
            )));
        }

        let store = InventoryStore::new(&request.inventory_path);
        let existing = store.read(request.add_node)?;

        if request.add_node {
            let host = existing.first_host().ok_or_else(|| {
                ProvisionError::config(format!(
                    "inventory {} has no host to recover the cluster name from",
                    request.inventory_path.display()
                ))
            })?;
            names.set_mode(NamingMode::AddNode {
                existing_host: host.hostname.clone(),
            });
        } else {
            names.set_mode(NamingMode::Fresh {
                cluster_name: request.cluster_name.clone(),
            });
        }

        let plan = self.builder.build_plan(request, names)?;
        tracing::debug!(
            provider = %plan.provider,
            cluster = %plan.cluster_name,
            steps = plan.steps.len(),
            "Built provisioning plan"
        );
        Ok((existing, plan))
    }

    fn confirmation_question(request: &ProvisionRequest) -> String {
        format!(
            "Create {} instances on {} ?",
            request.total_count(),
            request.provider_kind()
        )
    }

    /// Run the whole provisioning flow
    pub async fn run(
        &mut self,
        request: &ProvisionRequest,
        names: &mut NameAllocator,
    ) -> Result<ProvisionOutcome> {
        let (existing, plan) = self.prepare_plan(request, names)?;

        if !request.assume_yes {
            if request.add_node {
                self.reporter.warn(&format!(
                    "{} node(s) will be added to the current inventory {}",
                    request.total_count(),
                    request.inventory_path.display()
                ));
            }
            if !self.confirm.confirm(&Self::confirmation_question(request)) {
                self.transition(RunState::Aborted);
                return Err(ProvisionError::ConfirmationDeclined);
            }
        }
        self.transition(RunState::Confirmed);

        if let Err(e) = plan.save(&request.plan_path()).await {
            return Err(self.fail(e));
        }
        self.reporter.banner(&format!(
            "Provisioning cluster {} on {}",
            plan.cluster_name, plan.provider
        ));
        self.reporter.info(&plan.summary().to_string());

        self.transition(RunState::Provisioning);
        if let Err(e) = self.provision(&plan).await {
            return Err(self.fail(e));
        }

        self.transition(RunState::Collecting);
        let added = match collect(&plan).await {
            Ok(added) => added,
            Err(e) => return Err(self.fail(e)),
        };

        let merged = existing.merge(&added, &GroupPlacement::from_request(request));
        self.transition(RunState::Merged);

        let group_vars = match persist(request, &merged) {
            Ok(group_vars) => group_vars,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(RunState::Done);
        let outcome = ProvisionOutcome {
            plan,
            inventory: merged,
            added,
            group_vars,
        };
        self.reporter.success(&format!(
            "{} instance(s) added to {}",
            outcome.added_count(),
            request.inventory_path.display()
        ));
        Ok(outcome)
    }

    async fn provision(&self, plan: &Plan) -> Result<()> {
        let auth = self.backend.check_auth().await?;
        if !auth.authenticated {
            return Err(ProvisionError::provider(format!(
                "{} authentication failed: {}",
                self.backend.name(),
                auth.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        if let Some(account) = auth.account_info.as_deref() {
            tracing::debug!("Authenticated to {} as {}", self.backend.name(), account);
        }

        let report = PlanExecutor::new(
            self.backend.as_ref(),
            self.probe.as_ref(),
            self.reporter.as_ref(),
        )
        .with_backoff(self.backoff.clone())
        .execute(plan)
        .await?;

        tracing::info!(
            "Created {} instance(s) in {}ms",
            report.instance_count(),
            report.duration_ms
        );
        Ok(())
    }
}

/// Read back the raw records the plan persisted
async fn collect(plan: &Plan) -> Result<BTreeMap<Role, Vec<ProvisionedInstance>>> {
    let mut added: BTreeMap<Role, Vec<ProvisionedInstance>> = BTreeMap::new();
    for (role, destination) in plan.record_destinations() {
        let records = read_records(destination).await?;
        added
            .entry(role)
            .or_default()
            .extend(records.iter().map(|r| r.to_instance()));
    }
    Ok(added)
}

fn persist(request: &ProvisionRequest, inventory: &Inventory) -> Result<Vec<PathBuf>> {
    InventoryStore::new(&request.inventory_path).write(inventory)?;
    update_group_vars(&request.group_vars_dir(), &request.custom_group_vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;
    use crate::testing::{
        AlwaysReachable, Level, MemoryBackend, RecordingReporter, ScriptedConfirm,
        SimplePlanBuilder,
    };
    use kubeprov_core::{AwsOptions, Provider, ProviderOptions, WordList};
    use kubeprov_inventory::{ETCD, KUBE_MASTER, KUBE_NODE};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;
    use tempfile::tempdir;

    fn request(work_dir: &std::path::Path) -> ProvisionRequest {
        ProvisionRequest::new(ProviderOptions::Aws(AwsOptions::default()), work_dir)
    }

    fn names() -> NameAllocator {
        names_with_seed(42)
    }

    fn names_with_seed(seed: u64) -> NameAllocator {
        NameAllocator::with_rng(
            WordList::new(vec!["falcon".to_string()]),
            StdRng::seed_from_u64(seed),
        )
    }

    fn build_orchestrator(
        backend: Arc<MemoryBackend>,
        confirm: Arc<ScriptedConfirm>,
        reporter: Arc<RecordingReporter>,
    ) -> ProvisionOrchestrator {
        ProvisionOrchestrator::new(
            Box::new(SimplePlanBuilder::new(Provider::Aws)),
            Box::new(backend),
            Box::new(confirm),
            Box::new(reporter),
        )
        .with_probe(Box::new(AlwaysReachable))
        .with_backoff(Backoff {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
        })
    }

    #[tokio::test]
    async fn test_single_master_reaches_done() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path()).with_count(Role::Master, 1);
        request.assume_yes = true;

        let backend = Arc::new(MemoryBackend::new());
        let confirm = Arc::new(ScriptedConfirm::new(false));
        let reporter = Arc::new(RecordingReporter::default());
        let mut orchestrator = build_orchestrator(backend.clone(), confirm.clone(), reporter);

        let outcome = orchestrator.run(&request, &mut names()).await.unwrap();

        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(
            orchestrator.history(),
            &[
                RunState::Idle,
                RunState::Confirmed,
                RunState::Provisioning,
                RunState::Collecting,
                RunState::Merged,
                RunState::Done
            ]
        );
        // assume_yes skips the question entirely
        assert!(confirm.questions().is_empty());

        let creates: Vec<&Step> = outcome
            .plan
            .steps
            .iter()
            .filter(|s| matches!(s, Step::CreateInstances { .. }))
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].role(), Some(Role::Master));
        assert_eq!(backend.calls().len(), 1);

        assert_eq!(outcome.inventory.group(KUBE_MASTER).len(), 1);
        assert_eq!(outcome.inventory.group(ETCD).len(), 1);
        assert!(outcome.inventory.group(KUBE_NODE).is_empty());
        assert!(request.inventory_path.exists());
        assert!(request.plan_path().exists());
        assert!(request.records_path(Role::Master).exists());
    }

    #[tokio::test]
    async fn test_declined_confirmation_aborts() {
        let temp_dir = tempdir().unwrap();
        let request = request(temp_dir.path()).with_count(Role::Node, 3);

        let backend = Arc::new(MemoryBackend::new());
        let confirm = Arc::new(ScriptedConfirm::new(false));
        let reporter = Arc::new(RecordingReporter::default());
        let mut orchestrator = build_orchestrator(backend.clone(), confirm.clone(), reporter);

        let err = orchestrator.run(&request, &mut names()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ConfirmationDeclined));
        assert_eq!(orchestrator.state(), RunState::Aborted);
        assert_eq!(confirm.questions(), vec!["Create 3 instances on aws ?"]);
        assert!(backend.calls().is_empty());
        assert!(!request.inventory_path.exists());
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_inventory_untouched() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path())
            .with_count(Role::Master, 1)
            .with_count(Role::Node, 2);
        request.assume_yes = true;

        let backend = Arc::new(MemoryBackend::failing_on(Role::Node));
        let reporter = Arc::new(RecordingReporter::default());
        let mut orchestrator = build_orchestrator(
            backend.clone(),
            Arc::new(ScriptedConfirm::new(true)),
            reporter.clone(),
        );

        let err = orchestrator.run(&request, &mut names()).await.unwrap_err();
        assert!(err.to_string().contains("InstanceLimitExceeded"));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(reporter.contains(Level::Error, "InstanceLimitExceeded"));
        // masters were created and recorded, but nothing was merged
        assert!(request.records_path(Role::Master).exists());
        assert!(!request.inventory_path.exists());
    }

    #[tokio::test]
    async fn test_unauthenticated_backend_fails_before_creating() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path()).with_count(Role::Node, 1);
        request.assume_yes = true;

        let backend = Arc::new(MemoryBackend::unauthenticated());
        let mut orchestrator = build_orchestrator(
            backend.clone(),
            Arc::new(ScriptedConfirm::new(true)),
            Arc::new(RecordingReporter::default()),
        );

        let err = orchestrator.run(&request, &mut names()).await.unwrap_err();
        assert!(err.to_string().contains("no credentials"));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_node_extends_existing_cluster() {
        let temp_dir = tempdir().unwrap();
        let mut first = request(temp_dir.path()).with_count(Role::Master, 1);
        first.assume_yes = true;
        let backend = Arc::new(MemoryBackend::new());
        let mut orchestrator = build_orchestrator(
            backend.clone(),
            Arc::new(ScriptedConfirm::new(true)),
            Arc::new(RecordingReporter::default()),
        );
        let created = orchestrator.run(&first, &mut names()).await.unwrap();
        let cluster = created.plan.cluster_name.clone();

        let mut second = request(temp_dir.path()).with_count(Role::Node, 2);
        second.add_node = true;
        let confirm = Arc::new(ScriptedConfirm::new(true));
        let reporter = Arc::new(RecordingReporter::default());
        let mut orchestrator = build_orchestrator(backend, confirm.clone(), reporter.clone());
        let outcome = orchestrator
            .run(&second, &mut names_with_seed(7))
            .await
            .unwrap();

        assert_eq!(cluster, "k8s-falcon");
        assert_eq!(outcome.plan.cluster_name, cluster);
        assert!(reporter.contains(Level::Warn, "2 node(s) will be added to the current inventory"));
        assert_eq!(confirm.questions(), vec!["Create 2 instances on aws ?"]);
        assert_eq!(outcome.inventory.len(), 3);
        assert_eq!(outcome.inventory.group(KUBE_NODE).len(), 2);
        for node in outcome.inventory.group(KUBE_NODE) {
            assert!(node.starts_with(&format!("{}-", cluster)));
        }
    }

    #[tokio::test]
    async fn test_add_node_without_inventory() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path()).with_count(Role::Node, 1);
        request.add_node = true;

        let mut orchestrator = build_orchestrator(
            Arc::new(MemoryBackend::new()),
            Arc::new(ScriptedConfirm::new(true)),
            Arc::new(RecordingReporter::default()),
        );
        let err = orchestrator.run(&request, &mut names()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InventoryNotFound(_)));
        assert_eq!(orchestrator.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let mut orchestrator = build_orchestrator(
            Arc::new(MemoryBackend::new()),
            Arc::new(ScriptedConfirm::new(true)),
            Arc::new(RecordingReporter::default()),
        );
        let err = orchestrator
            .run(&request(temp_dir.path()), &mut names())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_group_vars_are_patched() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path()).with_count(Role::Node, 1);
        request.assume_yes = true;
        let mut values = BTreeMap::new();
        values.insert(
            "kube_network_plugin".to_string(),
            serde_yaml::Value::from("calico"),
        );
        request
            .custom_group_vars
            .insert("k8s-cluster".to_string(), values);

        let mut orchestrator = build_orchestrator(
            Arc::new(MemoryBackend::new()),
            Arc::new(ScriptedConfirm::new(true)),
            Arc::new(RecordingReporter::default()),
        );
        let outcome = orchestrator.run(&request, &mut names()).await.unwrap();
        assert_eq!(
            outcome.group_vars,
            vec![request.group_vars_dir().join("k8s-cluster.yml")]
        );
    }

    #[tokio::test]
    async fn test_short_record_set_fails_the_run() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path()).with_count(Role::Node, 3);
        request.assume_yes = true;

        let mut orchestrator = build_orchestrator(
            Arc::new(MemoryBackend::short_on(Role::Node)),
            Arc::new(ScriptedConfirm::new(true)),
            Arc::new(RecordingReporter::default()),
        );
        let err = orchestrator.run(&request, &mut names()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Provider(_)));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(!request.inventory_path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_plan_file_fails_the_run() {
        let temp_dir = tempdir().unwrap();
        let mut request = request(temp_dir.path()).with_count(Role::Master, 1);
        request.assume_yes = true;
        // a directory in the plan file's place cannot be written over
        std::fs::create_dir_all(request.plan_path()).unwrap();

        let backend = Arc::new(MemoryBackend::new());
        let reporter = Arc::new(RecordingReporter::default());
        let mut orchestrator = build_orchestrator(
            backend.clone(),
            Arc::new(ScriptedConfirm::new(true)),
            reporter.clone(),
        );
        let err = orchestrator.run(&request, &mut names()).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Persistence { .. }));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(
            orchestrator.history(),
            &[RunState::Idle, RunState::Confirmed, RunState::Failed]
        );
        assert!(reporter.contains(Level::Error, "plan.json"));
        assert!(backend.calls().is_empty());
    }
}
