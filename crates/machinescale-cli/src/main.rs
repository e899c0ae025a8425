use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(
    name = "machinescale",
    about = "machinescale — resolve cluster nodes to autoscaling node groups",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Resolver configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// JSON dump of nodes, machines, machineSets, and machineDeployments
    #[arg(short, long)]
    resources: PathBuf,
    /// Output format: text or json
    #[arg(short, long, default_value = "text", global = true)]
    format: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List scalable node groups
    Groups {
        /// Only groups in this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Show the node group owning a node
    Node {
        /// Provider ID of the node, e.g. aws:///us-east-1a/i-0123
        provider_id: String,
    },
    /// List the provider IDs of a node group's members
    Members {
        /// Group id: <kind>/<namespace>/<name>
        group_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,machinescale=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let manager = commands::load(cli.config.as_deref(), &cli.resources, shutdown_rx).await?;

    let output = match cli.command {
        Commands::Groups { namespace } => {
            commands::groups::groups(&manager, namespace.as_deref(), &cli.format).await?
        }
        Commands::Node { provider_id } => {
            commands::node::node(&manager, &provider_id, &cli.format).await?
        }
        Commands::Members { group_id } => {
            commands::members::members(&manager, &group_id, &cli.format).await?
        }
    };
    println!("{output}");

    Ok(())
}
