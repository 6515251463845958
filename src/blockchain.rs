use crate::error::{KeeperError, KeeperResult};
use crate::transaction_monitor::{TransactionReceipt, TransactionStatus};
use alloy::network::Ethereum;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use anyhow::Result;
use async_trait::async_trait;
use std::future::IntoFuture;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;
use url::Url;

/// The chain operations a harvest cycle depends on.
#[async_trait]
pub trait KeeperChain: Send + Sync {
    /// Current on-chain transaction count of `address`, i.e. the next nonce.
    async fn transaction_count(&self, address: Address) -> KeeperResult<u64>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> KeeperResult<B256>;

    async fn transaction_receipt(&self, hash: B256) -> KeeperResult<Option<TransactionReceipt>>;
}

pub struct BlockchainClient {
    provider: Arc<dyn Provider<Ethereum>>,
    rpc_timeout: Duration,
}

impl BlockchainClient {
    pub async fn new(rpc_url: &str, expected_chain_id: u64, rpc_timeout: Duration) -> Result<Self> {
        info!("🔗 Connecting to RPC: {}", rpc_url);

        let url = Url::parse(rpc_url)?;
        let provider = ProviderBuilder::new().connect_http(url);

        let client = Self::from_provider(Arc::new(provider), rpc_timeout);

        let chain_id = client.with_timeout(client.provider.get_chain_id()).await?;
        if chain_id != expected_chain_id {
            return Err(anyhow::anyhow!(
                "Chain ID mismatch: expected {}, got {}",
                expected_chain_id,
                chain_id
            ));
        }

        info!("✅ Connected to chain {}", expected_chain_id);
        Ok(client)
    }

    /// Wrap an already connected provider without the chain id check.
    pub fn from_provider(provider: Arc<dyn Provider<Ethereum>>, rpc_timeout: Duration) -> Self {
        Self {
            provider,
            rpc_timeout,
        }
    }

    pub fn provider(&self) -> Arc<dyn Provider<Ethereum>> {
        self.provider.clone()
    }

    pub async fn get_balance(&self, address: Address) -> KeeperResult<U256> {
        self.with_timeout(self.provider.get_balance(address)).await
    }

    async fn with_timeout<T, E, F>(&self, fut: F) -> KeeperResult<T>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match timeout(self.rpc_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(KeeperError::from_rpc_message(e.to_string())),
            Err(_) => Err(KeeperError::Timeout(self.rpc_timeout.as_secs())),
        }
    }
}

#[async_trait]
impl KeeperChain for BlockchainClient {
    async fn transaction_count(&self, address: Address) -> KeeperResult<u64> {
        // Latest block, not pending: the nonce must match what the chain has mined
        self.with_timeout(self.provider.get_transaction_count(address).latest())
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> KeeperResult<B256> {
        let pending = self
            .with_timeout(self.provider.send_raw_transaction(raw))
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> KeeperResult<Option<TransactionReceipt>> {
        let receipt = self
            .with_timeout(self.provider.get_transaction_receipt(hash))
            .await?;

        Ok(receipt.map(|receipt| TransactionReceipt {
            hash,
            block_number: receipt.block_number.unwrap_or(0),
            gas_used: U256::from(receipt.gas_used),
            status: if receipt.status() {
                TransactionStatus::Success
            } else {
                TransactionStatus::Failed
            },
        }))
    }
}

/// Load the signing key from the environment variable `var`.
///
/// The key itself never leaves this function except inside the signer.
pub fn load_signer(var: &str, chain_id: u64) -> Result<PrivateKeySigner> {
    let key = std::env::var(var)
        .map_err(|_| anyhow::anyhow!("Environment variable {} is not set", var))?;
    let signer = PrivateKeySigner::from_str(key.trim())
        .map_err(|_| anyhow::anyhow!("Environment variable {} does not hold a valid private key", var))?;

    Ok(signer.with_chain_id(Some(chain_id)))
}
