//! In-memory doubles for tests
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for provider crates and the binary.

use crate::orchestrator::Confirm;
use crate::plan::{InstanceOptions, Plan, PortSpec, Protocol, ReachabilityCheck};
use crate::provider::{AuthStatus, PlanBuilder, ProviderBackend};
use crate::reachability::ReachabilityProbe;
use crate::records::InstanceRecord;
use crate::report::Reporter;
use async_trait::async_trait;
use kubeprov_core::{
    HostSpec, NameAllocator, NamingScheme, Provider, ProvisionError, ProvisionRequest, Result,
    Role,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// A call received by [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    SecurityGroup(String),
    SecurityRules(String, Vec<Protocol>),
    Ports(Role, Vec<String>),
    Instances(Role, Vec<HostSpec>, InstanceOptions),
}

/// Backend that "creates" instances with sequential addresses
#[derive(Default)]
pub struct MemoryBackend {
    calls: Mutex<Vec<BackendCall>>,
    next_ip: AtomicU32,
    fail_role: Option<Role>,
    short_role: Option<Role>,
    unauthenticated: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail instance creation for `role` with a provider error
    pub fn failing_on(role: Role) -> Self {
        Self {
            fail_role: Some(role),
            ..Self::default()
        }
    }

    /// Report one instance fewer than requested for `role`
    pub fn short_on(role: Role) -> Self {
        Self {
            short_role: Some(role),
            ..Self::default()
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            unauthenticated: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: BackendCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ProviderBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if self.unauthenticated {
            Ok(AuthStatus::failed("no credentials"))
        } else {
            Ok(AuthStatus::ok("tester"))
        }
    }

    async fn create_security_group(&self, name: &str, _description: &str) -> Result<()> {
        self.record(BackendCall::SecurityGroup(name.to_string()));
        Ok(())
    }

    async fn add_security_rules(&self, group: &str, protocols: &[Protocol]) -> Result<()> {
        self.record(BackendCall::SecurityRules(group.to_string(), protocols.to_vec()));
        Ok(())
    }

    async fn create_ports(&self, role: Role, ports: &[PortSpec]) -> Result<()> {
        self.record(BackendCall::Ports(
            role,
            ports.iter().map(|p| p.name.clone()).collect(),
        ));
        Ok(())
    }

    async fn create_instances(
        &self,
        role: Role,
        hosts: &[HostSpec],
        options: &InstanceOptions,
    ) -> Result<Vec<InstanceRecord>> {
        self.record(BackendCall::Instances(role, hosts.to_vec(), options.clone()));
        if self.fail_role == Some(role) {
            return Err(ProvisionError::provider("InstanceLimitExceeded"));
        }

        let mut records: Vec<InstanceRecord> = hosts
            .iter()
            .map(|host| {
                let n = self.next_ip.fetch_add(1, Ordering::SeqCst) + 1;
                InstanceRecord::new(format!("mem-{}", n), &host.name, role)
                    .with_private_ip(Some(format!("10.0.0.{}", n)))
                    .with_public_ip(Some(format!("203.0.113.{}", n)))
                    .with_zone(host.zone.clone())
                    .with_raw(serde_json::json!({ "name": host.name }))
            })
            .collect();
        if self.short_role == Some(role) {
            records.pop();
        }
        Ok(records)
    }
}

/// Probe that always succeeds
pub struct AlwaysReachable;

#[async_trait]
impl ReachabilityProbe for AlwaysReachable {
    async fn probe(&self, _address: &str, _port: u16, _banner: Option<&str>) -> bool {
        true
    }
}

/// Severity of a recorded message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Banner,
    Info,
    Success,
    Warn,
    Error,
}

/// Reporter that keeps every message
#[derive(Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    fn push(&self, level: Level, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}

impl Reporter for RecordingReporter {
    fn banner(&self, message: &str) {
        self.push(Level::Banner, message);
    }

    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.push(Level::Success, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}

/// Confirmation with a fixed answer; remembers the questions asked
pub struct ScriptedConfirm {
    answer: bool,
    questions: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str) -> bool {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question.to_string());
        }
        self.answer
    }
}

/// Provider-neutral builder: one create/record/wait block per requested role
pub struct SimplePlanBuilder {
    pub provider: Provider,
    pub scheme: NamingScheme,
}

impl SimplePlanBuilder {
    /// Builder whose add-node mode strips only the instance suffix
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            scheme: NamingScheme {
                strip_segments: 1,
                prefix_supplied: false,
            },
        }
    }
}

impl PlanBuilder for SimplePlanBuilder {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn naming_scheme(&self) -> NamingScheme {
        self.scheme
    }

    fn build_plan(&self, request: &ProvisionRequest, names: &mut NameAllocator) -> Result<Plan> {
        let cluster = names.cluster_name(self.naming_scheme())?;
        let mut plan = Plan::new(self.provider, &cluster);
        for (role, config) in request.roles.requested() {
            let hosts = names
                .instance_names(&cluster, config.count as usize)
                .into_iter()
                .map(|name| HostSpec::new(name, None, role))
                .collect();
            plan.push_role(
                hosts,
                InstanceOptions::new(),
                request.records_path(role),
                ReachabilityCheck::ssh(role, request.address_kind()),
            );
        }
        Ok(plan)
    }
}
