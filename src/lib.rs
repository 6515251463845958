pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gas_oracle;
pub mod jobs;
pub mod retry;
pub mod transaction;
pub mod transaction_monitor;

pub use blockchain::{BlockchainClient, KeeperChain};
pub use config::KeeperConfig;
pub use error::{ErrorKind, KeeperError, KeeperResult};
pub use gas_oracle::{GasOracle, GasQuote, GasStationOracle};
pub use jobs::{CycleOutcome, HarvestJob, KeeperSettings, RunSummary};
pub use retry::{execute_with_retry, RetryConfig};
pub use transaction::{HarvestTransaction, SignedHarvest};
pub use transaction_monitor::{TransactionMonitor, TransactionReceipt, TransactionStatus};
