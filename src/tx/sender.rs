//! Transaction sender with fee escalation and bounded retries
//!
//! One call to [`TransactionSender::send`] owns one transfer's lifecycle:
//! fresh nonce per attempt, broadcast, classification of the rejection,
//! escalation or backoff, and finally the receipt wait.

use super::confirmation::ConfirmationPoller;
use super::gas::FeePolicy;
use crate::chain::{Account, Ledger, LedgerError, TransferRequest};
use crate::config::SubmissionConfig;
use crate::error::{DisburseError, DisburseResult};

use ethers::types::{Address, TransactionReceipt, H256, U256};
use ethers::utils::format_units;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-transfer retry state; lives only inside one `send` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    pub gas_price: U256,
    pub attempt: u32,
    pub max_retries: u32,
}

impl AttemptState {
    fn new(initial_price: U256, max_retries: u32) -> Self {
        Self {
            gas_price: initial_price,
            attempt: 0,
            max_retries,
        }
    }

    fn has_budget(&self) -> bool {
        self.attempt < self.max_retries
    }
}

/// A broadcast transfer that the ledger reported included
#[derive(Debug, Clone)]
pub struct SubmittedTransfer {
    pub tx_hash: H256,
    pub nonce: U256,
    pub gas_price: U256,
    /// Broadcasts issued, including the accepted one
    pub attempts: u32,
    pub receipt: TransactionReceipt,
}

/// Broadcasts a transfer, escalating or backing off on contention
pub struct TransactionSender {
    ledger: Arc<dyn Ledger>,
    fee_policy: FeePolicy,
    poller: ConfirmationPoller,
    max_retries: u32,
    contention_delay: Duration,
    server_retry_delay: Duration,
}

impl TransactionSender {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        fee_policy: FeePolicy,
        poller: ConfirmationPoller,
        config: &SubmissionConfig,
    ) -> Self {
        Self {
            ledger,
            fee_policy,
            poller,
            max_retries: config.max_retries,
            contention_delay: config.contention_retry_delay(),
            server_retry_delay: config.server_retry_delay(),
        }
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.fee_policy
    }

    /// Send `value` to `to` and wait for the receipt
    pub async fn send(
        &self,
        account: &Account,
        to: Address,
        value: U256,
        gas_limit: U256,
        initial_price: U256,
    ) -> DisburseResult<SubmittedTransfer> {
        let mut state = AttemptState::new(initial_price, self.max_retries);

        while state.has_budget() {
            // A previous attempt may have been superseded elsewhere
            let nonce = self.ledger.get_transaction_count(account.address()).await?;

            let request = TransferRequest {
                to,
                value,
                gas_limit,
                gas_price: state.gas_price,
                nonce,
            };

            let delay = match self.ledger.send_transfer(account, request).await {
                Ok(tx_hash) => {
                    info!(
                        "Sent transaction | Tx: {:?} | Gas Price: {} gwei | Nonce: {}",
                        tx_hash,
                        gwei(state.gas_price),
                        nonce
                    );
                    let receipt = self.poller.await_receipt(tx_hash).await?;
                    return Ok(SubmittedTransfer {
                        tx_hash,
                        nonce,
                        gas_price: state.gas_price,
                        attempts: state.attempt + 1,
                        receipt,
                    });
                }
                Err(LedgerError::ReplacementUnderpriced) => {
                    state.attempt += 1;
                    state.gas_price = self.fee_policy.escalate(state.gas_price);
                    crate::metrics::record_submission_retry("underpriced");
                    info!(
                        "Retry {}/{} with higher gas price: {} gwei",
                        state.attempt,
                        state.max_retries,
                        gwei(state.gas_price)
                    );
                    self.contention_delay
                }
                Err(LedgerError::NonceExpired(reason)) => {
                    state.attempt += 1;
                    crate::metrics::record_submission_retry("nonce_expired");
                    info!(
                        "Retry {}/{} because nonce expired ({}), fetching a fresh nonce",
                        state.attempt, state.max_retries, reason
                    );
                    self.contention_delay
                }
                Err(LedgerError::ServerUnavailable { status }) => {
                    state.attempt += 1;
                    crate::metrics::record_submission_retry("server_unavailable");
                    warn!(
                        "Retry {}/{} because of server error {}",
                        state.attempt, state.max_retries, status
                    );
                    self.server_retry_delay
                }
                Err(e) => return Err(e.into()),
            };

            if state.has_budget() {
                tokio::time::sleep(delay).await;
            }
        }

        Err(DisburseError::RetriesExhausted {
            destination: format!("{:?}", to),
        })
    }
}

fn gwei(price: U256) -> String {
    format_units(price, "gwei").unwrap_or_else(|_| price.to_string())
}
