use crate::blockchain::KeeperChain;
use crate::config::KeeperConfig;
use crate::error::{ErrorKind, KeeperError, KeeperResult};
use crate::gas_oracle::{GasOracle, GasQuote};
use crate::retry::RetryConfig;
use crate::transaction::HarvestTransaction;
use crate::transaction_monitor::{TransactionMonitor, TransactionStatus};
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Everything a harvest run needs, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct KeeperSettings {
    pub chain_id: u64,
    pub strategy: Address,
    pub sender: Address,
    pub gas_limit: u64,
    pub interval: Duration,
    /// Fetch a new gas quote every cycle. When false the first quote is
    /// reused for the lifetime of the job.
    pub refresh_gas_each_cycle: bool,
    pub max_gas_price_gwei: Option<f64>,
    pub retry: RetryConfig,
    pub max_consecutive_failures: u32,
    pub receipt_wait: Option<ReceiptWait>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptWait {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl KeeperSettings {
    /// `sender` is the address derived from the signing key.
    pub fn from_config(config: &KeeperConfig, sender: Address) -> KeeperResult<Self> {
        let strategy = Address::from_str(&config.contracts.strategy_address).map_err(|e| {
            KeeperError::Config(format!(
                "Invalid strategy_address {}: {}",
                config.contracts.strategy_address, e
            ))
        })?;

        if let Some(configured) = &config.contracts.sender_address {
            let configured = Address::from_str(configured).map_err(|e| {
                KeeperError::Config(format!("Invalid sender_address {}: {}", configured, e))
            })?;
            if configured != sender {
                return Err(KeeperError::Config(format!(
                    "sender_address {} does not match the signing key's address {}",
                    configured, sender
                )));
            }
        }

        let receipt_wait = config.monitoring.wait_for_receipt.then(|| ReceiptWait {
            timeout: Duration::from_secs(config.monitoring.transaction_timeout_seconds),
            poll_interval: Duration::from_secs(config.monitoring.poll_interval_seconds),
        });

        Ok(Self {
            chain_id: config.chain.chain_id,
            strategy,
            sender,
            gas_limit: config.gas.gas_limit,
            interval: Duration::from_secs(config.schedule.interval_seconds),
            refresh_gas_each_cycle: config.gas.refresh_each_cycle,
            max_gas_price_gwei: config.gas.max_price_gwei,
            retry: RetryConfig::from(&config.retry),
            max_consecutive_failures: config.retry.max_consecutive_failures,
            receipt_wait,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Broadcast, and mined successfully if receipt waiting is enabled.
    Submitted { hash: B256, nonce: u64 },
    /// Broadcast, but no receipt arrived in time.
    Unconfirmed { hash: B256, nonce: u64 },
    /// Built and signed only.
    DryRun { hash: B256, nonce: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub submitted: u64,
    pub failed: u64,
}

pub struct HarvestJob {
    chain: Arc<dyn KeeperChain>,
    gas_oracle: Arc<dyn GasOracle>,
    signer: PrivateKeySigner,
    settings: KeeperSettings,
    dry_run: bool,
    cached_quote: Option<GasQuote>,
}

impl HarvestJob {
    pub fn new(
        chain: Arc<dyn KeeperChain>,
        gas_oracle: Arc<dyn GasOracle>,
        signer: PrivateKeySigner,
        settings: KeeperSettings,
        dry_run: bool,
    ) -> KeeperResult<Self> {
        if signer.address() != settings.sender {
            return Err(KeeperError::Config(format!(
                "Signer {} does not match sender {}",
                signer.address(),
                settings.sender
            )));
        }

        Ok(Self {
            chain,
            gas_oracle,
            signer,
            settings,
            dry_run,
            cached_quote: None,
        })
    }

    pub fn settings(&self) -> &KeeperSettings {
        &self.settings
    }

    async fn gas_quote(&mut self) -> KeeperResult<GasQuote> {
        if !self.settings.refresh_gas_each_cycle {
            if let Some(quote) = self.cached_quote {
                return Ok(quote);
            }
        }

        let quote = self.gas_oracle.fetch_quote().await?;
        info!(gwei = quote.gwei, "⛽ Gas quote");
        self.cached_quote = Some(quote);
        Ok(quote)
    }

    /// One harvest attempt: quote, nonce, build, sign, broadcast.
    pub async fn run_cycle(&mut self) -> KeeperResult<CycleOutcome> {
        let quote = self.gas_quote().await?;
        if let Some(max_gwei) = self.settings.max_gas_price_gwei {
            if quote.gwei > max_gwei {
                return Err(KeeperError::GasPriceTooHigh {
                    quoted_gwei: quote.gwei,
                    max_gwei,
                });
            }
        }

        let nonce = self.chain.transaction_count(self.settings.sender).await?;
        info!(nonce, "🔢 Nonce");

        let tx = HarvestTransaction::new(
            self.settings.chain_id,
            self.settings.sender,
            self.settings.strategy,
            nonce,
            self.settings.gas_limit,
            quote.to_wei(),
        );
        let signed = tx.sign(&self.signer)?;

        if self.dry_run {
            info!(
                hash = %signed.hash,
                raw = %hex::encode(&signed.raw),
                "✅ DRY RUN: Would broadcast harvest transaction"
            );
            return Ok(CycleOutcome::DryRun {
                hash: signed.hash,
                nonce,
            });
        }

        let hash = self.chain.send_raw_transaction(&signed.raw).await?;
        info!(%hash, nonce, gas_price_wei = tx.gas_price, "🚀 Harvest transaction sent");

        let Some(wait) = self.settings.receipt_wait else {
            return Ok(CycleOutcome::Submitted { hash, nonce });
        };

        let monitor = TransactionMonitor::new(self.chain.clone(), wait.timeout, wait.poll_interval);
        let receipt = monitor.monitor_transaction(hash).await?;
        match receipt.status {
            TransactionStatus::Success => {
                info!(
                    block = receipt.block_number,
                    gas_used = %receipt.gas_used,
                    "🎉 Harvest confirmed"
                );
                Ok(CycleOutcome::Submitted { hash, nonce })
            }
            TransactionStatus::Failed => Err(KeeperError::Reverted(hash)),
            TransactionStatus::Timeout => Ok(CycleOutcome::Unconfirmed { hash, nonce }),
        }
    }

    /// Run cycles until `shutdown` turns true.
    ///
    /// A successful cycle is followed by the full interval. Transient
    /// failures back off exponentially and trip the circuit breaker after
    /// `max_consecutive_failures` in a row; deferred failures wait the full
    /// interval; permanent failures end the run. Shutdown is only observed
    /// between cycles, never while a transaction is being submitted.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> KeeperResult<RunSummary> {
        let mut summary = RunSummary::default();
        let mut consecutive_failures = 0u32;

        info!(
            strategy = %self.settings.strategy,
            sender = %self.settings.sender,
            interval_secs = self.settings.interval.as_secs(),
            dry_run = self.dry_run,
            "🌾 Harvest keeper starting"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            summary.cycles += 1;
            let pause = match self.run_cycle().await {
                Ok(outcome) => {
                    consecutive_failures = 0;
                    if let CycleOutcome::Unconfirmed { hash, .. } = &outcome {
                        warn!(%hash, "⏰ Harvest not mined within the monitoring window");
                    }
                    if !matches!(outcome, CycleOutcome::DryRun { .. }) {
                        summary.submitted += 1;
                    }
                    self.settings.interval
                }
                Err(e) => {
                    summary.failed += 1;
                    match e.kind() {
                        ErrorKind::Transient => {
                            consecutive_failures += 1;
                            if consecutive_failures >= self.settings.max_consecutive_failures {
                                error!(error = %e, consecutive_failures, "🛑 Circuit breaker open");
                                return Err(KeeperError::CircuitOpen {
                                    failures: consecutive_failures,
                                    last: Box::new(e),
                                });
                            }
                            let delay = self.settings.retry.delay_for(consecutive_failures);
                            warn!(
                                error = %e,
                                consecutive_failures,
                                retry_in = ?delay,
                                "❌ Harvest cycle failed, retrying"
                            );
                            delay
                        }
                        ErrorKind::Deferred => {
                            consecutive_failures = 0;
                            warn!(error = %e, "⏳ Harvest cycle skipped until next interval");
                            self.settings.interval
                        }
                        ErrorKind::Permanent => {
                            error!(error = %e, "🛑 Harvest cycle failed permanently");
                            return Err(e);
                        }
                    }
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        info!(
            cycles = summary.cycles,
            submitted = summary.submitted,
            failed = summary.failed,
            "👋 Harvest keeper stopped"
        );
        Ok(summary)
    }
}

/// Resolves once the flag is true. A dropped sender never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
