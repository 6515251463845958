use alloy::primitives::B256;
use thiserror::Error;

/// How the runner reacts to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry after a backoff delay; counts towards the circuit breaker.
    Transient,
    /// Nothing to gain from retrying early; wait the full interval.
    Deferred,
    /// Retrying cannot help; stop the keeper.
    Permanent,
}

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    #[error("Gas oracle error: {0}")]
    GasOracle(String),

    #[error("Gas price {quoted_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { quoted_gwei: f64, max_gwei: f64 },

    #[error("Nonce rejected: {0}")]
    StaleNonce(String),

    /// The node already holds a transaction for this nonce.
    #[error("Transaction already pending: {0}")]
    AlreadyPending(String),

    #[error("Insufficient funds for gas: {0}")]
    InsufficientFunds(String),

    #[error("Transaction reverted: {0}")]
    Reverted(B256),

    #[error("Invalid contract call: {0}")]
    InvalidCall(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Giving up after {failures} consecutive failures, last error: {last}")]
    CircuitOpen {
        failures: u32,
        last: Box<KeeperError>,
    },
}

pub type KeeperResult<T> = Result<T, KeeperError>;

impl KeeperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeeperError::Rpc(_)
            | KeeperError::Timeout(_)
            | KeeperError::GasOracle(_)
            | KeeperError::StaleNonce(_) => ErrorKind::Transient,
            KeeperError::GasPriceTooHigh { .. }
            | KeeperError::AlreadyPending(_)
            | KeeperError::InsufficientFunds(_)
            | KeeperError::Reverted(_) => ErrorKind::Deferred,
            KeeperError::InvalidCall(_)
            | KeeperError::Signing(_)
            | KeeperError::Config(_)
            | KeeperError::CircuitOpen { .. } => ErrorKind::Permanent,
        }
    }

    /// Map a node's error message onto the taxonomy.
    ///
    /// Nodes only report these conditions as free text, so matching is done
    /// on the lowercase message.
    pub fn from_rpc_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("insufficient funds") {
            KeeperError::InsufficientFunds(message)
        } else if lower.contains("already known")
            || lower.contains("replacement transaction underpriced")
        {
            KeeperError::AlreadyPending(message)
        } else if lower.contains("nonce too low") || lower.contains("nonce too high") {
            KeeperError::StaleNonce(message)
        } else if lower.contains("execution reverted")
            || lower.contains("invalid opcode")
            || lower.contains("invalid sender")
        {
            KeeperError::InvalidCall(message)
        } else {
            KeeperError::Rpc(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_messages_are_classified() {
        let funds = KeeperError::from_rpc_message(
            "insufficient funds for gas * price + value: balance 0, tx cost 27000000000000000",
        );
        assert!(matches!(funds, KeeperError::InsufficientFunds(_)));
        assert_eq!(funds.kind(), ErrorKind::Deferred);

        let nonce = KeeperError::from_rpc_message("Nonce too low");
        assert!(matches!(nonce, KeeperError::StaleNonce(_)));
        assert_eq!(nonce.kind(), ErrorKind::Transient);

        let known = KeeperError::from_rpc_message("already known");
        assert!(matches!(known, KeeperError::AlreadyPending(_)));
        assert_eq!(known.kind(), ErrorKind::Deferred);

        let underpriced = KeeperError::from_rpc_message("replacement transaction underpriced");
        assert!(matches!(underpriced, KeeperError::AlreadyPending(_)));
        assert_eq!(underpriced.kind(), ErrorKind::Deferred);

        let revert = KeeperError::from_rpc_message("execution reverted: Ownable: caller is not the owner");
        assert!(matches!(revert, KeeperError::InvalidCall(_)));
        assert_eq!(revert.kind(), ErrorKind::Permanent);

        let other = KeeperError::from_rpc_message("error sending request for url");
        assert!(matches!(other, KeeperError::Rpc(_)));
        assert_eq!(other.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_circuit_open_is_permanent() {
        let err = KeeperError::CircuitOpen {
            failures: 5,
            last: Box::new(KeeperError::Timeout(10)),
        };
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("5 consecutive failures"));
        assert!(err.to_string().contains("RPC timeout after 10 seconds"));
    }
}
