use crate::error::{KeeperError, KeeperResult};
use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::sync::Arc;

sol! {
    /// Yield strategy whose rewards are compounded by calling `harvest`.
    #[sol(rpc)]
    interface IStrategy {
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
        event SetJar(address indexed jar);

        function harvest() external;
        function getHarvestable() external view returns (uint256);
        function harvestCutoff() external view returns (uint256);
        function harvestedToken() external view returns (address);
        function getName() external pure returns (string);
        function pairName() external pure returns (string);
        function balanceOf() external view returns (uint256);
        function balanceOfPool() external view returns (uint256);
        function balanceOfWant() external view returns (uint256);
        function emergencyStatus() external view returns (bool);
        function jar() external view returns (address);
        function want() external view returns (address);
        function owner() external view returns (address);
        function strategist() external view returns (address);
    }
}

/// Calldata for `harvest()`: the bare 4-byte selector.
pub fn harvest_calldata() -> Bytes {
    IStrategy::harvestCall {}.abi_encode().into()
}

#[derive(Clone)]
pub struct StrategyContract {
    address: Address,
    provider: Arc<dyn Provider<Ethereum>>,
}

impl StrategyContract {
    pub fn new(address: Address, provider: Arc<dyn Provider<Ethereum>>) -> Self {
        Self { address, provider }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, data: Vec<u8>) -> KeeperResult<Bytes> {
        self.provider
            .call(TransactionRequest {
                to: Some(TxKind::Call(self.address)),
                input: TransactionInput::new(Bytes::from(data)),
                ..Default::default()
            })
            .await
            .map_err(|e| KeeperError::from_rpc_message(e.to_string()))
    }

    pub async fn get_harvestable(&self) -> KeeperResult<U256> {
        let result = self.call(IStrategy::getHarvestableCall {}.abi_encode()).await?;
        IStrategy::getHarvestableCall::abi_decode_returns(&result)
            .map_err(|e| KeeperError::InvalidCall(format!("getHarvestable returned bad data: {}", e)))
    }

    pub async fn name(&self) -> KeeperResult<String> {
        let result = self.call(IStrategy::getNameCall {}.abi_encode()).await?;
        IStrategy::getNameCall::abi_decode_returns(&result)
            .map_err(|e| KeeperError::InvalidCall(format!("getName returned bad data: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;
    use alloy::sol_types::SolValue;
    use alloy::transports::mock::Asserter;

    fn mocked_strategy(asserter: &Asserter) -> StrategyContract {
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        StrategyContract::new(Address::repeat_byte(0x11), Arc::new(provider))
    }

    #[test]
    fn test_harvest_calldata_is_selector_only() {
        let data = harvest_calldata();
        assert_eq!(data.len(), 4);
        assert_eq!(data.as_ref(), IStrategy::harvestCall::SELECTOR.as_slice());
        assert_eq!(hex::encode(&data), "4641257d");
    }

    #[tokio::test]
    async fn test_get_harvestable_decodes_uint() {
        let asserter = Asserter::new();
        asserter.push_success(&Bytes::from(U256::from(123_456_789u64).abi_encode()));
        let strategy = mocked_strategy(&asserter);

        assert_eq!(strategy.get_harvestable().await.unwrap(), U256::from(123_456_789u64));
    }

    #[tokio::test]
    async fn test_name_decodes_string() {
        let asserter = Asserter::new();
        asserter.push_success(&Bytes::from(("StrategyYeldMatic".to_string(),).abi_encode_params()));
        let strategy = mocked_strategy(&asserter);

        assert_eq!(strategy.name().await.unwrap(), "StrategyYeldMatic");
    }

    #[tokio::test]
    async fn test_short_return_data_is_invalid_call() {
        let asserter = Asserter::new();
        asserter.push_success(&Bytes::from(vec![0x01, 0x02]));
        let strategy = mocked_strategy(&asserter);

        assert!(matches!(
            strategy.get_harvestable().await,
            Err(KeeperError::InvalidCall(_))
        ));
    }

    #[tokio::test]
    async fn test_reverted_read_is_classified() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("execution reverted");
        let strategy = mocked_strategy(&asserter);

        assert!(matches!(strategy.name().await, Err(KeeperError::InvalidCall(_))));
    }
}
