mod commands;
mod console;
mod prompt;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use kubeprov_core::{Overrides, Provider, ProvisionError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kubeprov")]
#[command(about = "Provision Kubernetes hosts and keep the Ansible inventory in sync", long_about = None)]
struct Cli {
    /// Config file (default: $KUBEPROV_CONFIG, then ~/.kubeprov.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create instances on AWS (EC2)
    Aws {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        provider: AwsArgs,
    },
    /// Create instances on Google Compute Engine
    Gce {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        provider: GceArgs,
    },
    /// Create instances on OpenStack
    #[command(name = "openstack")]
    OpenStack {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        provider: OpenStackArgs,
    },
    /// Inspect the inventory
    #[command(subcommand)]
    Inventory(InventoryCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum InventoryCommands {
    /// Print the inventory file
    Show {
        /// Inventory file (default: <work_dir>/inventory/inventory.cfg)
        #[arg(short, long)]
        inventory_path: Option<PathBuf>,
        /// Print group sizes instead of the file
        #[arg(long)]
        summary: bool,
    },
}

/// Flags shared by every provider
#[derive(Args)]
struct CommonArgs {
    /// Number of master instances
    #[arg(long)]
    masters_count: Option<u32>,
    /// Number of node instances
    #[arg(long)]
    nodes_count: Option<u32>,
    /// Number of dedicated etcd instances
    #[arg(long)]
    etcds_count: Option<u32>,
    /// Cluster name (generated when omitted)
    #[arg(short = 'n', long)]
    cluster_name: Option<String>,
    /// Add instances to the cluster of the existing inventory
    #[arg(long)]
    add_node: bool,
    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    assume_yes: bool,
    /// Reach instances on their private address
    #[arg(long)]
    use_private_ip: bool,
    /// Instance tag as key=value (repeatable)
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    /// Put masters in the etcd group (default: only without dedicated etcd instances)
    #[arg(long)]
    etcd_on_masters: Option<bool>,
    /// Directory for the plan and instance records (default: ~/.kubeprov)
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Inventory file (default: <work_dir>/inventory/inventory.cfg)
    #[arg(short, long)]
    inventory_path: Option<PathBuf>,
    /// Dictionary used for generated cluster names
    #[arg(long)]
    words_file: Option<PathBuf>,
    /// Print the plan without creating anything
    #[arg(long)]
    dry_run: bool,
}

impl CommonArgs {
    fn overrides(&self, overrides: &mut Overrides) {
        overrides
            .count("masters_count", self.masters_count)
            .count("nodes_count", self.nodes_count)
            .count("etcds_count", self.etcds_count)
            .set("cluster_name", self.cluster_name.clone())
            .flag("add_node", self.add_node)
            .flag("assume_yes", self.assume_yes)
            .flag("use_private_ip", self.use_private_ip)
            .list("tags", &self.tags)
            .set("etcd_on_masters", self.etcd_on_masters)
            .path("work_dir", self.work_dir.as_deref())
            .path("inventory_path", self.inventory_path.as_deref())
            .path("words_file", self.words_file.as_deref());
    }
}

#[derive(Args)]
struct AwsArgs {
    /// AWS access key
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    aws_access_key: Option<String>,
    /// AWS secret key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_key: Option<String>,
    #[arg(long)]
    region: Option<String>,
    /// EC2 key pair name
    #[arg(long)]
    key_name: Option<String>,
    /// AMI the instances boot from
    #[arg(long)]
    ami: Option<String>,
    #[arg(long)]
    security_group_id: Option<String>,
    #[arg(long)]
    security_group_name: Option<String>,
    #[arg(long)]
    vpc_subnet_id: Option<String>,
    /// Give instances a public address
    #[arg(long)]
    assign_public_ip: bool,
    #[arg(long)]
    masters_instance_type: Option<String>,
    #[arg(long)]
    nodes_instance_type: Option<String>,
    #[arg(long)]
    etcds_instance_type: Option<String>,
    #[arg(long)]
    masters_instance_profile_name: Option<String>,
    #[arg(long)]
    nodes_instance_profile_name: Option<String>,
    #[arg(long)]
    etcds_instance_profile_name: Option<String>,
}

impl AwsArgs {
    fn overrides(&self, overrides: &mut Overrides) {
        overrides
            .set("aws_access_key", self.aws_access_key.clone())
            .set("aws_secret_key", self.aws_secret_key.clone())
            .set("region", self.region.clone())
            .set("key_name", self.key_name.clone())
            .set("ami", self.ami.clone())
            .set("security_group_id", self.security_group_id.clone())
            .set("security_group_name", self.security_group_name.clone())
            .set("vpc_subnet_id", self.vpc_subnet_id.clone())
            .flag("assign_public_ip", self.assign_public_ip)
            .set("masters_instance_type", self.masters_instance_type.clone())
            .set("nodes_instance_type", self.nodes_instance_type.clone())
            .set("etcds_instance_type", self.etcds_instance_type.clone())
            .set("masters_instance_profile_name", self.masters_instance_profile_name.clone())
            .set("nodes_instance_profile_name", self.nodes_instance_profile_name.clone())
            .set("etcds_instance_profile_name", self.etcds_instance_profile_name.clone());
    }
}

#[derive(Args)]
struct GceArgs {
    #[arg(long)]
    image: Option<String>,
    #[arg(long)]
    zone: Option<String>,
    #[arg(long)]
    service_account_email: Option<String>,
    #[arg(long)]
    pem_file: Option<PathBuf>,
    /// Service account key file
    #[arg(long)]
    credentials_file: Option<PathBuf>,
    #[arg(long)]
    project_id: Option<String>,
    #[arg(long)]
    network: Option<String>,
    #[arg(long)]
    subnetwork: Option<String>,
    #[arg(long)]
    masters_machine_type: Option<String>,
    #[arg(long)]
    nodes_machine_type: Option<String>,
    #[arg(long)]
    etcds_machine_type: Option<String>,
}

impl GceArgs {
    fn overrides(&self, overrides: &mut Overrides) {
        overrides
            .set("image", self.image.clone())
            .set("zone", self.zone.clone())
            .set("service_account_email", self.service_account_email.clone())
            .path("pem_file", self.pem_file.as_deref())
            .path("credentials_file", self.credentials_file.as_deref())
            .set("project_id", self.project_id.clone())
            .set("network", self.network.clone())
            .set("subnetwork", self.subnetwork.clone())
            .set("masters_machine_type", self.masters_machine_type.clone())
            .set("nodes_machine_type", self.nodes_machine_type.clone())
            .set("etcds_machine_type", self.etcds_machine_type.clone());
    }
}

#[derive(Args)]
struct OpenStackArgs {
    /// Keystone URL (OS_AUTH_URL wins when set)
    #[arg(long)]
    os_auth_url: Option<String>,
    #[arg(long)]
    os_username: Option<String>,
    #[arg(long)]
    os_password: Option<String>,
    #[arg(long)]
    os_project_name: Option<String>,
    #[arg(long)]
    os_domain_name: Option<String>,
    #[arg(long)]
    os_region_name: Option<String>,
    /// Network the instance ports are created on
    #[arg(long)]
    network: Option<String>,
    #[arg(long)]
    os_network_id: Option<String>,
    /// Pod network CIDR allowed on every port
    #[arg(long)]
    kube_network: Option<String>,
    #[arg(long)]
    image: Option<String>,
    /// Key pair name
    #[arg(long)]
    sshkey: Option<String>,
    /// Attach a floating IP to every instance
    #[arg(long)]
    floating_ip: bool,
    #[arg(long)]
    floating_network: Option<String>,
    /// Availability zones, comma separated
    #[arg(long, value_delimiter = ',')]
    os_availability_zones: Vec<String>,
    /// User data file
    #[arg(long)]
    userdata: Option<String>,
    #[arg(long)]
    masters_flavor: Option<String>,
    #[arg(long)]
    nodes_flavor: Option<String>,
    #[arg(long)]
    etcds_flavor: Option<String>,
    #[arg(long)]
    masters_volume_size: Option<u32>,
    #[arg(long)]
    nodes_volume_size: Option<u32>,
    #[arg(long)]
    etcds_volume_size: Option<u32>,
    #[arg(long)]
    masters_boot_from_volume: Option<bool>,
    #[arg(long)]
    nodes_boot_from_volume: Option<bool>,
    #[arg(long)]
    etcds_boot_from_volume: Option<bool>,
}

impl OpenStackArgs {
    fn overrides(&self, overrides: &mut Overrides) {
        overrides
            .set("os_auth_url", self.os_auth_url.clone())
            .set("os_username", self.os_username.clone())
            .set("os_password", self.os_password.clone())
            .set("os_project_name", self.os_project_name.clone())
            .set("os_domain_name", self.os_domain_name.clone())
            .set("os_region_name", self.os_region_name.clone())
            .set("network", self.network.clone())
            .set("os_network_id", self.os_network_id.clone())
            .set("kube_network", self.kube_network.clone())
            .set("image", self.image.clone())
            .set("sshkey", self.sshkey.clone())
            .flag("floating_ip", self.floating_ip)
            .set("floating_network", self.floating_network.clone())
            .list("os_availability_zones", &self.os_availability_zones)
            .set("userdata", self.userdata.clone())
            .set("masters_flavor", self.masters_flavor.clone())
            .set("nodes_flavor", self.nodes_flavor.clone())
            .set("etcds_flavor", self.etcds_flavor.clone())
            .count("masters_volume_size", self.masters_volume_size)
            .count("nodes_volume_size", self.nodes_volume_size)
            .count("etcds_volume_size", self.etcds_volume_size)
            .set("masters_boot_from_volume", self.masters_boot_from_volume)
            .set("nodes_boot_from_volume", self.nodes_boot_from_volume)
            .set("etcds_boot_from_volume", self.etcds_boot_from_volume);
    }
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("cannot open log file {}: {}", path.display(), e))?;
            tracing_subscriber::fmt()
                .with_writer(std::sync::Mutex::new(file))
                .with_env_filter(filter)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();
    let mut overrides = Overrides::new();

    let (provider, dry_run) = match &cli.command {
        Commands::Version => {
            println!("kubeprov {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Inventory(InventoryCommands::Show {
            inventory_path,
            summary,
        }) => {
            overrides.path("inventory_path", inventory_path.as_deref());
            return commands::inventory::show(config, &overrides, *summary);
        }
        Commands::Aws { common, provider } => {
            common.overrides(&mut overrides);
            provider.overrides(&mut overrides);
            (Provider::Aws, common.dry_run)
        }
        Commands::Gce { common, provider } => {
            common.overrides(&mut overrides);
            provider.overrides(&mut overrides);
            (Provider::Gce, common.dry_run)
        }
        Commands::OpenStack { common, provider } => {
            common.overrides(&mut overrides);
            provider.overrides(&mut overrides);
            (Provider::OpenStack, common.dry_run)
        }
    };

    commands::provision::handle(provider, config, &overrides, dry_run).await
}

/// Configuration errors exit with 2, every other failure with 1
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ProvisionError>()
        .map(|e| e.exit_code() as u8)
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}
