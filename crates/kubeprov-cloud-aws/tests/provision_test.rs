use kubeprov_cloud::testing::{AlwaysReachable, BackendCall, MemoryBackend, RecordingReporter};
use kubeprov_cloud::{AssumeYes, Backoff, ProvisionOrchestrator, RunState, Step};
use kubeprov_cloud_aws::AwsPlanBuilder;
use kubeprov_core::{AwsOptions, NameAllocator, ProviderOptions, ProvisionRequest, Role, WordList};
use kubeprov_inventory::{InventoryStore, KUBE_MASTER};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn request(work_dir: &std::path::Path) -> ProvisionRequest {
    let options = AwsOptions {
        region: Some("us-east-1".to_string()),
        ami: Some("ami-12345678".to_string()),
        security_group_id: Some("sg-1".to_string()),
        ..Default::default()
    };
    let mut request = ProvisionRequest::new(ProviderOptions::Aws(options), work_dir)
        .with_count(Role::Master, 1);
    request.roles[Role::Master].instance_type = Some("t3.medium".to_string());
    request.assume_yes = true;
    request
}

fn orchestrator(backend: Arc<MemoryBackend>) -> ProvisionOrchestrator {
    ProvisionOrchestrator::new(
        Box::new(AwsPlanBuilder::new()),
        Box::new(backend),
        Box::new(AssumeYes),
        Box::new(RecordingReporter::default()),
    )
    .with_probe(Box::new(AlwaysReachable))
    .with_backoff(Backoff {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        multiplier: 1.0,
    })
}

#[tokio::test]
async fn test_single_master_provision() {
    let temp_dir = tempdir().unwrap();
    let request = request(temp_dir.path());
    let backend = Arc::new(MemoryBackend::new());
    let mut names = NameAllocator::with_rng(
        WordList::new(vec!["osprey".to_string()]),
        StdRng::seed_from_u64(3),
    );

    let outcome = orchestrator(backend.clone())
        .run(&request, &mut names)
        .await
        .unwrap();

    assert_eq!(outcome.plan.cluster_name, "k8s-osprey");
    let creates: Vec<&Step> = outcome
        .plan
        .steps
        .iter()
        .filter(|s| matches!(s, Step::CreateInstances { .. }))
        .collect();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].role(), Some(Role::Master));

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], BackendCall::Instances(Role::Master, hosts, _) if hosts.len() == 1));

    let inventory = InventoryStore::new(&request.inventory_path)
        .read(false)
        .unwrap();
    assert_eq!(inventory.group(KUBE_MASTER).len(), 1);
    assert!(request.records_path(Role::Master).exists());
}

#[tokio::test]
async fn test_state_reaches_done() {
    let temp_dir = tempdir().unwrap();
    let request = request(temp_dir.path());
    let mut orchestrator = orchestrator(Arc::new(MemoryBackend::new()));
    let mut names = NameAllocator::with_rng(WordList::default(), StdRng::seed_from_u64(9));

    orchestrator.run(&request, &mut names).await.unwrap();
    assert_eq!(orchestrator.state(), RunState::Done);
}
