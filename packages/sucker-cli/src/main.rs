use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sucker_core::{
    config::SubmitterConfig,
    relayer::{PassSummary, Relayer},
    Config,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and summarize a config file
    ValidateConfig {
        /// Config file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Scan the lookback window once, settle what is ready, and exit
    RunOnce {
        /// Config file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Scan and settle on a fixed interval until interrupted
    Start {
        /// Config file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}

fn print_summary(summary: &PassSummary) {
    println!("- transactions: {}", summary.transactions);
    println!("- messages: {}", summary.messages);
    println!("  - ignored: {}", summary.ignored);
    println!("  - nothing to do: {}", summary.skipped);
    println!("  - submitted: {}", summary.submitted);
    println!("  - already pending: {}", summary.already_pending);
    println!("  - failed: {}", summary.failed);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            info!("Validating config file: {:?}", config);
            let config = Config::load(config)?;
            let bridge = config.bridge.addresses()?;
            println!("Config is valid!");
            println!("- L1: chain {} at {}", config.l1.chain_id, config.l1.rpc_url);
            println!("- L2: chain {} at {}", config.l2.chain_id, config.l2.rpc_url);
            println!("- Sucker pair:");
            println!("  - local (L1): {}", bridge.local_sucker);
            println!("  - remote (L2): {}", bridge.remote_sucker);
            println!("  - standard bridge: {}", bridge.standard_bridge);
            println!("- OptimismPortal: {}", config.op_stack.portal);
            println!(
                "- Scan: {} blocks back, {} blocks per page",
                config.scan.lookback_blocks, config.scan.page_size
            );
            println!("- Poll interval: {}s", config.relayer.poll_interval);
            match &config.submitter {
                SubmitterConfig::Direct { .. } => {
                    println!("- Submitter: direct, {} confirmations", config.relayer.confirmations)
                }
                SubmitterConfig::Relay { api_url, .. } => println!("- Submitter: relay at {}", api_url),
            }
            Ok(())
        }
        Commands::RunOnce { config } => {
            info!("Using config file: {:?}", config);
            let config = Config::load(config)?;
            let relayer = Relayer::from_config(&config).await?;

            let summary = relayer.run_once(&CancellationToken::new()).await?;
            println!("Pass finished:");
            print_summary(&summary);
            Ok(())
        }
        Commands::Start { config } => {
            info!("Using config file: {:?}", config);
            let config = Config::load(config)?;
            info!(mode = config.mode(), "Starting relayer service");

            let relayer = Relayer::from_config(&config).await?;
            info!("Relayer initialized, running every {}s", config.relayer.poll_interval);

            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            });

            relayer.start(cancel).await;
            Ok(())
        }
    }
}
