//! Chain module - the network collaborator the disburser talks to
//!
//! This module provides:
//! - The `Ledger` trait, the only surface the core uses to reach the network
//! - Funding accounts and the transfer shape sent through the ledger
//! - A closed classification of broadcast failures
//! - `EthersLedger`, the JSON-RPC implementation

pub mod provider;
pub mod transport;

pub use provider::EthersLedger;

use crate::error::{DisburseError, DisburseResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use thiserror::Error;

/// Failures reported by a ledger, classified at the transport boundary
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Same nonce already pending at an equal or higher price
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,

    /// Nonce already consumed
    #[error("nonce expired: {0}")]
    NonceExpired(String),

    /// HTTP 502/503 from the RPC endpoint
    #[error("RPC server unavailable (HTTP {status})")]
    ServerUnavailable { status: u16 },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A funding account: signing key plus its derived address
#[derive(Debug, Clone)]
pub struct Account {
    wallet: LocalWallet,
}

impl Account {
    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> DisburseResult<Self> {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| DisburseError::Wallet(format!("Invalid private key: {}", e)))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

/// A native-value transfer as broadcast: legacy gas price, explicit nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub nonce: U256,
}

/// Network operations the disburser depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Chain id transactions are signed for
    fn chain_id(&self) -> u64;

    async fn get_balance(&self, address: Address) -> LedgerResult<U256>;

    /// Pending-inclusive transaction count, i.e. the next usable nonce
    async fn get_transaction_count(&self, address: Address) -> LedgerResult<U256>;

    /// Network-suggested legacy gas price
    async fn get_gas_price(&self) -> LedgerResult<U256>;

    /// Gas limit for a plain value transfer
    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> LedgerResult<U256>;

    /// Sign with the account key and broadcast
    async fn send_transfer(
        &self,
        account: &Account,
        request: TransferRequest,
    ) -> LedgerResult<H256>;

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> LedgerResult<Option<TransactionReceipt>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Deterministic test key (anvil account #0)
    pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    pub fn test_account() -> Account {
        Account::from_private_key(TEST_KEY).expect("valid test key")
    }

    pub fn receipt(tx_hash: H256) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: tx_hash,
            status: Some(1u64.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_account_address_derivation() {
        let account = test_account();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            .parse()
            .unwrap();
        assert_eq!(account.address(), expected);

        let prefixed = Account::from_private_key(&format!("0x{}", TEST_KEY)).unwrap();
        assert_eq!(prefixed.address(), expected);
    }

    #[test]
    fn test_invalid_private_key() {
        let err = Account::from_private_key("not-a-key").unwrap_err();
        assert!(matches!(err, DisburseError::Wallet(_)));
    }
}
