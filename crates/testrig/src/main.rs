mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "testrig")]
#[command(about = "Throwaway Kubernetes test clusters on Azure", long_about = None)]
struct Cli {
    /// Directory holding local cluster state
    #[arg(long, env = "TESTRIG_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// User config file (default: <state-dir>/config.toml)
    #[arg(long, env = "TESTRIG_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new kubernetes cluster on Azure
    Create(commands::create::CreateArgs),
    /// List clusters from local state
    Ls,
    /// Show the state and API model of a cluster
    Inspect {
        /// Cluster name
        name: String,
    },
    /// ssh into a cluster's leader node
    #[command(after_help = "Example: testrig ssh <name> -- <ssh args>")]
    Ssh {
        /// Cluster name
        name: String,
        /// Extra arguments passed to ssh (after --)
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print the path to a cluster's kubeconfig
    Kubeconfig {
        /// Cluster name
        name: String,
    },
    /// Remove clusters, including their Azure resource groups
    Rm(commands::rm::RmArgs),
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // version needs no state or config
    if matches!(cli.command, Commands::Version) {
        return Ok(commands::version());
    }

    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => testrig_config::default_state_dir()?,
    };
    let (config_path, explicit) = match cli.config {
        Some(path) => (path, true),
        None => (testrig_config::default_config_path(&state_dir), false),
    };
    let user_config = testrig_config::load_user_config(&config_path, explicit)?;
    tracing::debug!("State directory: {}", state_dir.display());

    let ctx = commands::Context {
        workflow: testrig_core::WorkflowConfig::new(&state_dir)
            .with_max_concurrent_removals(user_config.max_concurrent_removals()),
        user_config,
        cancel: shutdown_token(),
    };

    match cli.command {
        Commands::Create(args) => commands::create::handle(&ctx, args).await,
        Commands::Ls => commands::ls::handle(&ctx).await,
        Commands::Inspect { name } => commands::inspect::handle(&ctx, &name).await,
        Commands::Ssh { name, args } => commands::ssh::handle(&ctx, &name, &args).await,
        Commands::Kubeconfig { name } => commands::kubeconfig::handle(&ctx, &name).await,
        Commands::Rm(args) => commands::rm::handle(&ctx, args).await,
        Commands::Version => Ok(commands::version()),
    }
}

/// Token cancelled on Ctrl+C or SIGTERM
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }
        eprintln!("{}", "Interrupted, cleaning up...".yellow());
        trigger.cancel();
    });

    token
}
