//! murmur-node - Maelstrom broadcast node
//!
//! With no subcommand the node runs over stdin/stdout, which is how Maelstrom
//! launches it. Run flags and their `MURMUR_*` variables apply either way.

use clap::{Args, Parser, Subcommand};
use murmur_core::GossipMode;
use murmur_node::config::SAMPLE_CONFIG;
use murmur_node::{ConfigOverrides, LogFormat, NodeConfig, logging};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "murmur-node")]
#[command(about = "Eventually-consistent broadcast node for Maelstrom")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node over stdin/stdout
    Run(RunArgs),

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "murmur.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to config file
    #[arg(short, long, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Milliseconds between gossip rounds
    #[arg(long, env = "MURMUR_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Milliseconds to wait for a gossip reply
    #[arg(long, env = "MURMUR_RPC_TIMEOUT_MS")]
    rpc_timeout_ms: Option<u64>,

    /// Anti-entropy mode: push-pull or push
    #[arg(long, env = "MURMUR_MODE", value_parser = parse_mode)]
    mode: Option<GossipMode>,

    /// Cap on ids per gossip request
    #[arg(long, env = "MURMUR_MAX_IDS_PER_GOSSIP")]
    max_ids_per_gossip: Option<usize>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, env = "MURMUR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: pretty or json
    #[arg(long, env = "MURMUR_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            interval_ms: self.interval_ms,
            rpc_timeout_ms: self.rpc_timeout_ms,
            mode: self.mode,
            max_ids_per_gossip: self.max_ids_per_gossip,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

fn parse_mode(s: &str) -> Result<GossipMode, String> {
    match s {
        "push-pull" => Ok(GossipMode::PushPull),
        "push" => Ok(GossipMode::Push),
        other => Err(format!("unknown mode '{other}' (expected push-pull or push)")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_node(cli.run).await?,
        Some(Commands::Run(args)) => run_node(args).await?,
        Some(Commands::InitConfig { output, force }) => init_config(&output, force)?,
    }

    Ok(())
}

async fn run_node(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply_overrides(&args.overrides());
    config.validate()?;

    logging::init(&config.logging)?;
    info!(
        interval_ms = config.gossip.interval_ms,
        rpc_timeout_ms = config.gossip.rpc_timeout_ms,
        mode = ?config.gossip.mode,
        "starting murmur-node"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    murmur_node::run(config.gossip_config(), input, tokio::io::stdout(), shutdown_rx).await?;
    Ok(())
}

fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(output, SAMPLE_CONFIG)?;
    println!("Wrote sample config to {}", output.display());
    Ok(())
}
