pub mod harvest;

pub use harvest::{CycleOutcome, HarvestJob, KeeperSettings, ReceiptWait, RunSummary};
