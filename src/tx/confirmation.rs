//! Receipt polling for broadcast transactions
//!
//! The poller is a bounded, in-line wait: it queries the receipt up to
//! `max_attempts` times, sleeping `interval` between queries, and returns as
//! soon as the ledger reports the transaction included. A transaction that
//! is not found within the budget may still be pending; the caller gets
//! `NotConfirmed` and nothing is resubmitted.

use crate::chain::Ledger;
use crate::error::{DisburseError, DisburseResult};

use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Waits for inclusion of a single transaction
pub struct ConfirmationPoller {
    ledger: Arc<dyn Ledger>,
    max_attempts: u32,
    interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(ledger: Arc<dyn Ledger>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            ledger,
            max_attempts,
            interval,
        }
    }

    /// Poll until a receipt appears or the attempt budget runs out
    pub async fn await_receipt(&self, tx_hash: H256) -> DisburseResult<TransactionReceipt> {
        let started = Instant::now();

        for attempt in 1..=self.max_attempts {
            match self.ledger.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(0u64.into()) {
                        warn!("Transaction {:?} included but reverted", tx_hash);
                    }
                    debug!(
                        "Receipt for {:?} found on attempt {}/{}",
                        tx_hash, attempt, self.max_attempts
                    );
                    crate::metrics::record_confirmation_latency(started.elapsed().as_secs_f64());
                    return Ok(receipt);
                }
                Ok(None) => {
                    debug!(
                        "No receipt yet for {:?} (attempt {}/{})",
                        tx_hash, attempt, self.max_attempts
                    );
                }
                Err(e) => {
                    info!("Waiting for receipt... (attempt {}): {}", attempt, e);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(DisburseError::NotConfirmed {
            tx_hash: format!("{:?}", tx_hash),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::receipt;
    use crate::chain::{LedgerError, MockLedger};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn poller(ledger: MockLedger, max_attempts: u32) -> ConfirmationPoller {
        ConfirmationPoller::new(Arc::new(ledger), max_attempts, Duration::from_millis(5000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_as_soon_as_receipt_appears() {
        let tx_hash = H256::repeat_byte(0xab);
        let calls = Arc::new(AtomicU32::new(0));

        let mut ledger = MockLedger::new();
        let counter = calls.clone();
        ledger
            .expect_get_transaction_receipt()
            .times(3)
            .returning(move |hash| {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                    Ok(None)
                } else {
                    Ok(Some(receipt(hash)))
                }
            });

        let start = tokio::time::Instant::now();
        let found = poller(ledger, 10).await_receipt(tx_hash).await.unwrap();

        assert_eq!(found.transaction_hash, tx_hash);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two sleeps between three queries, none after success
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(10_000));
        assert!(elapsed < Duration::from_millis(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_query_errors_do_not_abort() {
        let tx_hash = H256::repeat_byte(0x01);
        let calls = Arc::new(AtomicU32::new(0));

        let mut ledger = MockLedger::new();
        let counter = calls.clone();
        ledger
            .expect_get_transaction_receipt()
            .times(2)
            .returning(move |hash| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LedgerError::ServerUnavailable { status: 502 })
                } else {
                    Ok(Some(receipt(hash)))
                }
            });

        let found = poller(ledger, 10).await_receipt(tx_hash).await;
        assert!(found.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_is_not_confirmed() {
        let tx_hash = H256::repeat_byte(0x02);

        let mut ledger = MockLedger::new();
        ledger
            .expect_get_transaction_receipt()
            .times(4)
            .returning(|_| Ok(None));

        let err = poller(ledger, 4).await_receipt(tx_hash).await.unwrap_err();
        match err {
            DisburseError::NotConfirmed { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
