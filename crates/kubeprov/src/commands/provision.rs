use crate::console::ConsoleReporter;
use crate::prompt::StdinConfirm;
use colored::Colorize;
use kubeprov_cloud::{PlanBuilder, ProviderBackend, ProvisionOrchestrator};
use kubeprov_cloud_aws::{AwsPlanBuilder, Ec2Backend};
use kubeprov_cloud_gce::{GceBackend, GcePlanBuilder};
use kubeprov_cloud_openstack::{OpenStackBackend, OpenStackPlanBuilder};
use kubeprov_core::{
    NameAllocator, Overrides, Provider, ProviderOptions, ProvisionRequest, WordList, load_request,
};
use std::path::Path;

pub async fn handle(
    provider: Provider,
    config: Option<&Path>,
    overrides: &Overrides,
    dry_run: bool,
) -> anyhow::Result<()> {
    tracing::debug!(dry_run, "Starting {} run", provider);
    let request = load_request(provider, config, overrides)?;
    let words = request
        .words_file
        .as_deref()
        .map(WordList::load)
        .unwrap_or_default();
    let mut names = NameAllocator::new(words);

    let (builder, backend) = components(&request).await?;
    let mut orchestrator = ProvisionOrchestrator::new(
        builder,
        backend,
        Box::new(StdinConfirm),
        Box::new(ConsoleReporter),
    );

    if dry_run {
        let (existing, plan) = orchestrator.prepare_plan(&request, &mut names)?;
        println!(
            "{}",
            format!("Plan for cluster {} on {}", plan.cluster_name, plan.provider)
                .blue()
                .bold()
        );
        for (index, step) in plan.steps.iter().enumerate() {
            println!("  {:>2}. {}", index + 1, step);
        }
        println!();
        println!("{}", plan.summary());
        if request.add_node {
            println!(
                "{} host(s) already in {}",
                existing.len(),
                request.inventory_path.display().to_string().cyan()
            );
        }
        println!("{}", "Dry run: nothing was created".yellow());
        return Ok(());
    }

    let outcome = orchestrator.run(&request, &mut names).await?;

    println!();
    for (role, instances) in &outcome.added {
        for instance in instances {
            println!(
                "  {} {:<8} {:<16} {}",
                "•".green(),
                role.to_string(),
                instance.private_ip.as_deref().unwrap_or("-"),
                instance.name.cyan()
            );
        }
    }
    for path in &outcome.group_vars {
        println!("  updated {}", path.display());
    }
    Ok(())
}

/// Plan builder and backend for the request's provider
async fn components(
    request: &ProvisionRequest,
) -> anyhow::Result<(Box<dyn PlanBuilder>, Box<dyn ProviderBackend>)> {
    let components: (Box<dyn PlanBuilder>, Box<dyn ProviderBackend>) = match &request.provider {
        ProviderOptions::Aws(options) => (
            Box::new(AwsPlanBuilder::new()),
            Box::new(Ec2Backend::from_options(options).await),
        ),
        ProviderOptions::Gce(options) => (
            Box::new(GcePlanBuilder::new()),
            Box::new(GceBackend::from_options(options)),
        ),
        ProviderOptions::OpenStack(options) => {
            let builder = OpenStackPlanBuilder::new();
            let auth = builder.resolve_auth(options)?;
            (Box::new(builder), Box::new(OpenStackBackend::new(auth)))
        }
    };
    Ok(components)
}
