use crate::blockchain::KeeperChain;
use crate::error::KeeperResult;
use alloy::primitives::{B256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TransactionReceipt {
    pub hash: B256,
    pub block_number: u64,
    pub gas_used: U256,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionStatus {
    Success,
    Failed,
    Timeout,
}

pub struct TransactionMonitor {
    chain: Arc<dyn KeeperChain>,
    max_wait_time: Duration,
    poll_interval: Duration,
}

impl TransactionMonitor {
    pub fn new(chain: Arc<dyn KeeperChain>, max_wait_time: Duration, poll_interval: Duration) -> Self {
        Self {
            chain,
            max_wait_time,
            poll_interval,
        }
    }

    /// Poll for the receipt of `tx_hash` until it is mined or the wait
    /// time runs out. RPC errors while polling are logged and polling goes on.
    pub async fn monitor_transaction(&self, tx_hash: B256) -> KeeperResult<TransactionReceipt> {
        info!("🔍 Monitoring transaction: {:?}", tx_hash);

        let start_time = Instant::now();

        loop {
            if start_time.elapsed() > self.max_wait_time {
                warn!("⏰ Transaction monitoring timeout after {:?}", self.max_wait_time);
                return Ok(TransactionReceipt {
                    hash: tx_hash,
                    block_number: 0,
                    gas_used: U256::ZERO,
                    status: TransactionStatus::Timeout,
                });
            }

            match self.chain.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    info!(
                        "✅ Transaction mined: {:?} (Status: {:?})",
                        tx_hash, receipt.status
                    );
                    return Ok(receipt);
                }
                Ok(None) => {
                    info!("⏳ Transaction pending, waiting...");
                }
                Err(e) => {
                    warn!(error = %e, "❌ Error checking transaction status");
                }
            }

            sleep(self.poll_interval).await;
        }
    }
}
