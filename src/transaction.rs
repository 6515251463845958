use crate::contracts::strategy::harvest_calldata;
use crate::error::{KeeperError, KeeperResult};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;

/// Unsigned `harvest()` call, built fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestTransaction {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    pub gas_limit: u64,
    /// Wei per unit of gas.
    pub gas_price: u128,
    pub nonce: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedHarvest {
    pub hash: B256,
    pub raw: Bytes,
    pub nonce: u64,
}

impl HarvestTransaction {
    pub fn new(
        chain_id: u64,
        from: Address,
        to: Address,
        nonce: u64,
        gas_limit: u64,
        gas_price: u128,
    ) -> Self {
        Self {
            chain_id,
            from,
            to,
            input: harvest_calldata(),
            gas_limit,
            gas_price,
            nonce,
        }
    }

    fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: U256::ZERO,
            input: self.input.clone(),
        }
    }

    /// Sign with an EIP-155 legacy envelope.
    ///
    /// The signer must own `from`; signing for another account would produce
    /// a transaction the node attributes to a different sender.
    pub fn sign(&self, signer: &PrivateKeySigner) -> KeeperResult<SignedHarvest> {
        if signer.address() != self.from {
            return Err(KeeperError::Signing(format!(
                "Signer {} does not match sender {}",
                signer.address(),
                self.from
            )));
        }

        let mut tx = self.to_legacy();
        let signature = signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| KeeperError::Signing(e.to_string()))?;

        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let envelope = TxEnvelope::from(signed);

        Ok(SignedHarvest {
            hash,
            raw: envelope.encoded_2718().into(),
            nonce: self.nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IStrategy;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::keccak256;
    use alloy::sol_types::SolCall;
    use std::str::FromStr;

    const TEST_KEY: &str = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";

    fn strategy() -> Address {
        Address::from_str("0x11774a954ad130025380F518a7C0B5a63Abc320E").unwrap()
    }

    #[test]
    fn test_transaction_fields() {
        let signer = PrivateKeySigner::from_str(TEST_KEY).unwrap();
        let tx = HarvestTransaction::new(137, signer.address(), strategy(), 42, 900_000, 30_000_000_000);

        assert_eq!(tx.to, strategy());
        assert_eq!(tx.from, signer.address());
        assert_eq!(tx.nonce, 42);
        assert_eq!(tx.gas_limit, 900_000);
        assert_eq!(tx.gas_price, 30_000_000_000);
        assert_eq!(tx.input.as_ref(), IStrategy::harvestCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_signed_raw_decodes_to_same_fields() {
        let signer = PrivateKeySigner::from_str(TEST_KEY).unwrap();
        let tx = HarvestTransaction::new(137, signer.address(), strategy(), 7, 900_000, 31_500_000_000);

        let signed = tx.sign(&signer).unwrap();
        assert_eq!(signed.nonce, 7);
        assert_eq!(keccak256(&signed.raw), signed.hash);

        let envelope = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
        let legacy = envelope.as_legacy().expect("legacy envelope").tx();
        assert_eq!(legacy.chain_id, Some(137));
        assert_eq!(legacy.nonce, 7);
        assert_eq!(legacy.gas_limit, 900_000);
        assert_eq!(legacy.gas_price, 31_500_000_000);
        assert_eq!(legacy.to, TxKind::Call(strategy()));
        assert_eq!(legacy.value, U256::ZERO);
        assert_eq!(legacy.input, harvest_calldata());
    }

    #[test]
    fn test_sign_rejects_foreign_sender() {
        let signer = PrivateKeySigner::from_str(TEST_KEY).unwrap();
        let tx = HarvestTransaction::new(137, strategy(), strategy(), 0, 900_000, 1);

        assert!(matches!(tx.sign(&signer), Err(KeeperError::Signing(_))));
    }
}
