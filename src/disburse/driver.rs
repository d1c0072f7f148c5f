//! Sequential disbursement over every (wallet, recipient) pair

use super::amount::AmountRange;
use super::inputs::parse_destination;
use crate::chain::{Account, Ledger};
use crate::config::DisbursementConfig;
use crate::error::{DisburseError, DisburseResult};
use crate::tx::{FeePolicy, SubmittedTransfer, TransactionSender};

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use ethers::utils::{format_ether, to_checksum};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Terminal result for one (wallet, recipient) pair
#[derive(Debug)]
pub enum TransferOutcome {
    Sent {
        amount: U256,
        transfer: SubmittedTransfer,
    },
    InvalidAddress,
    InsufficientBalance {
        balance: U256,
        required: U256,
    },
    Failed(DisburseError),
}

impl TransferOutcome {
    fn is_sent(&self) -> bool {
        matches!(self, TransferOutcome::Sent { .. })
    }
}

/// Counters for a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub sent: u64,
    pub failed: u64,
    pub skipped_invalid: u64,
    pub skipped_insufficient: u64,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            sent: 0,
            failed: 0,
            skipped_invalid: 0,
            skipped_insufficient: 0,
        }
    }

    fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Sent { .. } => {
                self.sent += 1;
                crate::metrics::record_transfer_sent();
            }
            TransferOutcome::InvalidAddress => {
                self.skipped_invalid += 1;
                crate::metrics::record_transfer_skipped("invalid_address");
            }
            TransferOutcome::InsufficientBalance { .. } => {
                self.skipped_insufficient += 1;
                crate::metrics::record_transfer_skipped("insufficient_balance");
            }
            TransferOutcome::Failed(_) => {
                self.failed += 1;
                crate::metrics::record_transfer_failed();
            }
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_invalid + self.skipped_insufficient
    }
}

/// Drives transfers from every account to every destination, in order
pub struct DisbursementDriver {
    ledger: Arc<dyn Ledger>,
    sender: TransactionSender,
    amounts: AmountRange,
    tx_delay: Duration,
    token_symbol: String,
}

impl DisbursementDriver {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        sender: TransactionSender,
        amounts: AmountRange,
        config: &DisbursementConfig,
    ) -> Self {
        Self {
            ledger,
            sender,
            amounts,
            tx_delay: Duration::from_millis(config.tx_delay_ms),
            token_symbol: config.token_symbol.clone(),
        }
    }

    /// Process every pair; per-pair failures are logged and never abort the run
    pub async fn run(&self, accounts: &[Account], destinations: &[String]) -> RunSummary {
        let mut summary = RunSummary::new();
        let span = info_span!("run", run_id = %summary.run_id);

        async {
            for (index, account) in accounts.iter().enumerate() {
                info!("Wallet {}: {}", index + 1, to_checksum(&account.address(), None));

                for destination in destinations {
                    let outcome = self.attempt_transfer(account, destination).await;
                    self.report(account, destination, &outcome, summary.sent + 1);
                    summary.record(&outcome);

                    // Pacing applies between confirmed sends only
                    if outcome.is_sent() {
                        tokio::time::sleep(self.tx_delay).await;
                    }
                }

                info!("--- Finished sending from this wallet ---");
            }

            let elapsed = Utc::now() - summary.started_at;
            info!(
                "Finished sending to all addresses: {} sent, {} failed, {} skipped in {}s",
                summary.sent,
                summary.failed,
                summary.skipped(),
                elapsed.num_seconds()
            );
        }
        .instrument(span)
        .await;

        summary
    }

    /// Resolve one pair into exactly one outcome
    pub async fn attempt_transfer(&self, account: &Account, destination: &str) -> TransferOutcome {
        let Some(to) = parse_destination(destination) else {
            return TransferOutcome::InvalidAddress;
        };

        let amount = self.amounts.random_amount();
        match self.fund_and_send(account, to, amount).await {
            Ok(outcome) => outcome,
            Err(e) => TransferOutcome::Failed(e),
        }
    }

    async fn fund_and_send(
        &self,
        account: &Account,
        to: Address,
        amount: U256,
    ) -> DisburseResult<TransferOutcome> {
        let from = account.address();

        let balance = self.ledger.get_balance(from).await?;
        let gas_price = self
            .sender
            .fee_policy()
            .initial_price(self.ledger.as_ref())
            .await?;
        let gas_limit = self.ledger.estimate_gas(from, to, amount).await?;

        // Checked against the pre-escalation price
        let required = amount.saturating_add(FeePolicy::calculate_cost(gas_limit, gas_price));
        if balance < required {
            return Ok(TransferOutcome::InsufficientBalance { balance, required });
        }

        let transfer = self
            .sender
            .send(account, to, amount, gas_limit, gas_price)
            .await?;
        Ok(TransferOutcome::Sent { amount, transfer })
    }

    fn report(&self, account: &Account, destination: &str, outcome: &TransferOutcome, number: u64) {
        let wallet = to_checksum(&account.address(), None);
        match outcome {
            TransferOutcome::Sent { amount, transfer } => {
                debug!(
                    "Transfer {:?} included in block {:?} (nonce {}, {} attempt(s))",
                    transfer.tx_hash,
                    transfer.receipt.block_number,
                    transfer.nonce,
                    transfer.attempts
                );
                info!(
                    target: "disbursement",
                    "{}. Sent {} {} to {} | Tx: {:?}",
                    number,
                    format_ether(*amount),
                    self.token_symbol,
                    destination,
                    transfer.tx_hash
                )
            }
            TransferOutcome::InvalidAddress => {
                error!(target: "disbursement", "Invalid address: {}", destination)
            }
            TransferOutcome::InsufficientBalance { balance, required } => warn!(
                target: "disbursement",
                "Wallet {} has insufficient balance ({} {}, needs {}) for {}",
                wallet,
                format_ether(*balance),
                self.token_symbol,
                format_ether(*required),
                destination
            ),
            TransferOutcome::Failed(e) => error!(
                target: "disbursement",
                "Failed to send to {} from {}: {}",
                destination, wallet, e
            ),
        }
    }
}
