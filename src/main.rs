use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardstore::config::Config;
use shardstore::coordinator::NodeRole;

mod commands;

#[derive(Parser)]
#[command(
    name = "shardstore",
    version,
    about = "Distributed file store sharded by file type across a coordinator and two backends",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Configuration file (TOML); `SHARDSTORE_*` variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendRole {
    Text,
    Pdf,
}

impl From<BackendRole> for NodeRole {
    fn from(role: BackendRole) -> Self {
        match role {
            BackendRole::Text => NodeRole::Text,
            BackendRole::Pdf => NodeRole::Pdf,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the client-facing coordinator
    Coordinator {
        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Namespace root
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Text backend address
        #[arg(long)]
        text_backend: Option<String>,

        /// Pdf backend address
        #[arg(long)]
        pdf_backend: Option<String>,

        /// Deadline for each forwarded backend operation, in seconds
        #[arg(long)]
        command_timeout: Option<u64>,
    },

    /// Run a type-specific backend store
    Backend {
        /// Which file type this store holds
        #[arg(long, value_enum)]
        role: BackendRole,

        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Namespace root
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Interactive shell connected to a coordinator
    Client {
        /// Coordinator address
        #[arg(short, long, default_value = "127.0.0.1:4020")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Coordinator {
            bind,
            root,
            text_backend,
            pdf_backend,
            command_timeout,
        } => {
            let section = &mut config.coordinator;
            if bind.is_some() {
                section.store.bind_address = bind;
            }
            if root.is_some() {
                section.store.root = root;
            }
            if let Some(addr) = text_backend {
                section.text_backend = addr;
            }
            if let Some(addr) = pdf_backend {
                section.pdf_backend = addr;
            }
            if command_timeout.is_some() {
                config.transfer.command_timeout_secs = command_timeout;
            }

            let node = config.node_config(NodeRole::Coordinator)?;
            tracing::info!(
                bind = %node.bind_address,
                root = %node.root.display(),
                "Starting coordinator"
            );
            commands::serve(node).await?;
        }

        Commands::Backend { role, bind, root } => {
            let role = NodeRole::from(role);
            let section = match role {
                NodeRole::Pdf => &mut config.pdf,
                _ => &mut config.text,
            };
            if bind.is_some() {
                section.bind_address = bind;
            }
            if root.is_some() {
                section.root = root;
            }

            let node = config.node_config(role)?;
            tracing::info!(
                role = %role,
                bind = %node.bind_address,
                root = %node.root.display(),
                "Starting backend store"
            );
            commands::serve(node).await?;
        }

        Commands::Client { server } => {
            commands::client(server).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("shardstore=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("shardstore={level},warn"))?
    };

    // stdout belongs to the interactive shell
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
