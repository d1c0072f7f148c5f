//! Gas price policy: floor-guarded initial price and escalation on contention

use crate::chain::{Ledger, LedgerResult};

use ethers::types::U256;
use tracing::debug;

/// Percentage applied on every escalation step (120 = +20%)
pub const ESCALATION_PERCENT: u64 = 120;

/// Decides the gas price offered for each broadcast attempt
#[derive(Debug, Clone)]
pub struct FeePolicy {
    /// Lowest price ever offered, in wei
    floor: U256,
}

impl FeePolicy {
    pub fn new(floor: U256) -> Self {
        Self { floor }
    }

    /// Network-suggested price, raised to the floor when below it
    pub async fn initial_price(&self, ledger: &dyn Ledger) -> LedgerResult<U256> {
        let suggested = ledger.get_gas_price().await?;
        let price = suggested.max(self.floor);

        debug!(
            "Gas price for chain {}: suggested {} wei, offering {} wei",
            ledger.chain_id(),
            suggested,
            price
        );
        Ok(price)
    }

    /// Next price after a replacement-underpriced rejection: ceil(price * 1.2)
    pub fn escalate(&self, price: U256) -> U256 {
        let scaled = price.saturating_mul(U256::from(ESCALATION_PERCENT));
        let (quotient, remainder) = scaled.div_mod(U256::from(100u64));
        if remainder.is_zero() {
            quotient
        } else {
            quotient + 1
        }
    }

    /// Upper bound of the fee paid for a transfer, in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: U256) -> U256 {
        gas_limit.saturating_mul(gas_price)
    }
}
