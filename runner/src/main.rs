// ABOUTME: Bootstraps one node of a multi-node job: discovers peers, assigns the rank
// ABOUTME: and hands MASTER_ADDR/NODE_RANK/WORLD_SIZE to the distributed runtime

use clap::{Parser, Subcommand};
use cluster_rendezvous::{
    read_hosts, write_hosts, Address, Assignment, CommandLauncher, DiscoveryConfig, Error,
    LaunchPlan, LocalAddress, NamedInterface, Rendezvous, Role, StaticAddress,
};
use dotenv::dotenv;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rendezvous-runner")]
#[command(about = "Discover cluster peers, assign ranks and launch the distributed runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for every peer and print this node's assignment
    Discover {
        /// Print the assignment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Wait for every peer, then run COMMAND with MASTER_ADDR, NODE_RANK, WORLD_SIZE set
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Recompute the assignment from a hosts file written by an earlier discovery
    Rank {
        /// Print the assignment as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Command-line values win over the environment.
#[derive(clap::Args)]
struct Overrides {
    /// Number of nodes in the job [env: NUM_NODES]
    #[arg(long, global = true)]
    num_nodes: Option<usize>,

    /// Service whose instances form the cluster [env: SNOWFLAKE_SERVICE_NAME]
    #[arg(long, global = true)]
    service_name: Option<String>,

    /// Give up after this many seconds [env: DISCOVERY_TIMEOUT_SECS]
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Delay between discovery polls [env: DISCOVERY_POLL_INTERVAL_MS]
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Interface holding this node's address [env: DISCOVERY_INTERFACE]
    #[arg(long, global = true)]
    interface: Option<String>,

    /// Use this address instead of the interface lookup [env: DISCOVERY_SELF_ADDRESS]
    #[arg(long, global = true)]
    self_address: Option<String>,

    /// Rendezvous port handed to the runtime [env: MASTER_PORT]
    #[arg(long, global = true)]
    master_port: Option<u16>,

    /// Hosts file to write after discovery, or to read for `rank` [env: HOSTS_FILE]
    #[arg(long, global = true)]
    hosts_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut DiscoveryConfig) {
        if let Some(num_nodes) = self.num_nodes {
            config.expected_size = num_nodes;
        }
        if let Some(service_name) = self.service_name {
            config.service_name = service_name.to_lowercase();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(interface) = self.interface {
            config.interface = interface;
        }
        if let Some(address) = self.self_address {
            config.self_address = Some(Address::from(address));
        }
        if let Some(port) = self.master_port {
            config.coordinator_port = port;
        }
        if let Some(path) = self.hosts_file {
            config.hosts_file = Some(path);
        }
    }
}

/// Assignment as printed by `discover` and `rank`.
#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    plan: &'a LaunchPlan,
    role: Role,
    members: &'a [Address],
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for the assignment report
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, aborting"),
        _ = terminate => tracing::info!("Received SIGTERM, aborting"),
    }
}

/// Run `work` unless the process is asked to stop first.
async fn until_shutdown<T>(work: impl Future<Output = Result<T, Error>>) -> Result<Option<T>, Error> {
    tokio::select! {
        result = work => result.map(Some),
        _ = wait_for_shutdown_signal() => Ok(None),
    }
}

fn local_address(config: &DiscoveryConfig) -> Box<dyn LocalAddress> {
    match &config.self_address {
        Some(address) => Box::new(StaticAddress::new(address.clone())),
        None => Box::new(NamedInterface::new(config.interface.clone())),
    }
}

async fn discover(config: &DiscoveryConfig) -> Result<Option<Assignment>, Error> {
    let rendezvous = Rendezvous::from_config(config);
    tracing::info!(
        nodes = config.expected_size,
        name = rendezvous.discovery_name(),
        "Starting peer discovery"
    );

    let Some(assignment) = until_shutdown(rendezvous.discover()).await? else {
        return Ok(None);
    };

    if let Some(path) = &config.hosts_file {
        write_hosts(path, &assignment.members).await?;
    }
    Ok(Some(assignment))
}

fn print_report(plan: &LaunchPlan, members: &[Address], json: bool) -> Result<(), Error> {
    if json {
        let report = Report {
            plan,
            role: plan.role(),
            members,
        };
        let line = serde_json::to_string(&report)
            .map_err(|e| Error::Config(format!("failed to encode report: {}", e)))?;
        println!("{}", line);
    } else {
        println!("rank={}", plan.rank);
        println!("world_size={}", plan.world_size);
        println!("master_addr={}", plan.coordinator);
        println!("master_port={}", plan.coordinator_port);
    }
    Ok(())
}

async fn async_main(command: Commands, config: DiscoveryConfig) -> Result<ExitCode, Error> {
    match command {
        Commands::Discover { json } => {
            let Some(assignment) = discover(&config).await? else {
                return Ok(ExitCode::FAILURE);
            };
            let plan = LaunchPlan::new(&assignment, config.coordinator_port);
            print_report(&plan, assignment.members.addresses(), json)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run { command } => {
            let launcher = CommandLauncher::from_command_line(&command)?;
            let Some(assignment) = discover(&config).await? else {
                return Ok(ExitCode::FAILURE);
            };
            let plan = LaunchPlan::new(&assignment, config.coordinator_port);

            // Dropping the launch future kills the child
            let Some(status) = until_shutdown(launcher.launch(&plan)).await? else {
                return Ok(ExitCode::FAILURE);
            };
            let code = status.code().and_then(|c| u8::try_from(c).ok()).unwrap_or(1);
            Ok(ExitCode::from(code))
        }

        Commands::Rank { json } => {
            let path = config
                .hosts_file
                .as_ref()
                .ok_or_else(|| Error::Config("rank needs --hosts-file or HOSTS_FILE".into()))?;
            let members = read_hosts(path).await?;
            let self_address = local_address(&config).local_address()?;
            let assignment = Assignment::from_membership(members, &self_address)?;

            let plan = LaunchPlan::new(&assignment, config.coordinator_port);
            print_report(&plan, assignment.members.addresses(), json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match DiscoveryConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.overrides.apply(&mut config);
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }

    // Discovery is a single blocking barrier; one thread is enough
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cli.command, config)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "rendezvous-runner",
            "--num-nodes",
            "4",
            "--service-name",
            "Train",
            "--timeout-secs",
            "30",
            "--self-address",
            "10.0.0.5",
            "discover",
            "--json",
        ]);

        let mut config = DiscoveryConfig::default();
        cli.overrides.apply(&mut config);
        assert!(config.validate().is_ok());

        assert_eq!(config.expected_size, 4);
        assert_eq!(config.service_name, "train");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.self_address, Some(Address::from("10.0.0.5")));
        assert!(matches!(cli.command, Commands::Discover { json: true }));
    }

    #[test]
    fn test_run_keeps_command_arguments() {
        let cli = Cli::parse_from([
            "rendezvous-runner",
            "run",
            "--",
            "torchrun",
            "--nproc-per-node",
            "8",
            "train.py",
        ]);

        match cli.command {
            Commands::Run { command } => {
                assert_eq!(command, vec!["torchrun", "--nproc-per-node", "8", "train.py"]);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_report_json_shape() {
        let members = vec![Address::from("10.0.0.2"), Address::from("10.0.0.5")];
        let plan = LaunchPlan {
            rank: 1,
            coordinator: Address::from("10.0.0.2"),
            coordinator_port: 29501,
            world_size: 2,
        };
        let report = Report {
            plan: &plan,
            role: plan.role(),
            members: &members,
        };

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rank"], 1);
        assert_eq!(json["coordinator"], "10.0.0.2");
        assert_eq!(json["coordinator_port"], 29501);
        assert_eq!(json["world_size"], 2);
        assert_eq!(json["role"], "worker");
        assert_eq!(json["members"][1], "10.0.0.5");
    }
}
