use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvest_keeper::blockchain::{load_signer, BlockchainClient};
use harvest_keeper::config::KeeperConfig;
use harvest_keeper::contracts::StrategyContract;
use harvest_keeper::gas_oracle::{GasOracle, GasStationOracle};
use harvest_keeper::jobs::{HarvestJob, KeeperSettings};
use harvest_keeper::retry::{execute_with_retry, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harvest-keeper", about = "Periodically calls harvest() on a yield strategy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest every interval until interrupted
    Run {
        #[arg(short, long, default_value = "configs/polygon.toml")]
        config: String,
        /// Build and sign transactions without broadcasting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a single harvest cycle and exit
    Once {
        #[arg(short, long, default_value = "configs/polygon.toml")]
        config: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the current gas quote from the configured gas stations
    GasQuote {
        #[arg(short, long, default_value = "configs/polygon.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Run { config, dry_run } => run(&config, dry_run).await,
        Commands::Once { config, dry_run } => once(&config, dry_run).await,
        Commands::GasQuote { config } => gas_quote(&config).await,
    }
}

fn gas_oracle(config: &KeeperConfig) -> Result<GasStationOracle> {
    Ok(GasStationOracle::new(
        config.oracle_urls(),
        config.gas.tier.clone(),
        Duration::from_secs(config.gas.request_timeout_seconds),
    )?)
}

async fn build_job(config_path: &str, dry_run: bool) -> Result<(HarvestJob, Arc<BlockchainClient>)> {
    let config = KeeperConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path))?;
    let retry_config = RetryConfig::from(&config.retry);

    let signer = load_signer(&config.signer.private_key_env, config.chain.chain_id)?;
    info!("🔑 Wallet address: {}", signer.address());

    let client = execute_with_retry(
        || {
            let rpc_url = config.chain.rpc_url.clone();
            let chain_id = config.chain.chain_id;
            let rpc_timeout = Duration::from_secs(config.chain.rpc_timeout_seconds);
            async move { BlockchainClient::new(&rpc_url, chain_id, rpc_timeout).await }
        },
        &retry_config,
        "Blockchain connection",
    )
    .await?;
    let client = Arc::new(client);

    let settings = KeeperSettings::from_config(&config, signer.address())?;
    let oracle = Arc::new(gas_oracle(&config)?);

    let job = HarvestJob::new(client.clone(), oracle, signer, settings, dry_run)?;
    Ok((job, client))
}

/// Best-effort status lines before harvesting; failures here are not fatal.
async fn log_strategy_state(job: &HarvestJob, client: &BlockchainClient) {
    let settings = job.settings();
    let strategy = StrategyContract::new(settings.strategy, client.provider());

    match strategy.name().await {
        Ok(name) => info!("🌾 Strategy {} ({})", name, strategy.address()),
        Err(e) => warn!(error = %e, "Could not read strategy name"),
    }
    match strategy.get_harvestable().await {
        Ok(amount) => info!("💰 Harvestable: {}", amount),
        Err(e) => warn!(error = %e, "Could not read harvestable amount"),
    }
    match client.get_balance(settings.sender).await {
        Ok(balance) => info!("⛽ Sender balance: {} wei", balance),
        Err(e) => warn!(error = %e, "Could not read sender balance"),
    }
}

async fn run(config_path: &str, dry_run: bool) -> Result<()> {
    let (mut job, client) = build_job(config_path, dry_run).await?;
    log_strategy_state(&job, &client).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Interrupt received, stopping after the current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = job.run(shutdown_rx).await?;
    info!(
        "✅ Stopped after {} cycles ({} submitted, {} failed)",
        summary.cycles, summary.submitted, summary.failed
    );
    Ok(())
}

async fn once(config_path: &str, dry_run: bool) -> Result<()> {
    let (mut job, client) = build_job(config_path, dry_run).await?;
    log_strategy_state(&job, &client).await;

    let outcome = job.run_cycle().await?;
    info!("✅ Cycle finished: {:?}", outcome);
    Ok(())
}

async fn gas_quote(config_path: &str) -> Result<()> {
    let config = KeeperConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path))?;
    let oracle = gas_oracle(&config)?;

    let quote = oracle.fetch_quote().await?;
    println!("{} gwei ({} wei) [{}]", quote.gwei, quote.to_wei(), config.gas.tier);
    Ok(())
}
