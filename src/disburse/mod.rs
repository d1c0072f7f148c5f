//! Disbursement of native tokens from funding wallets to recipients
//!
//! The driver walks wallets in order and, for each wallet, every recipient
//! in order:
//! 1. Validates the recipient address
//! 2. Draws a random amount in the configured range
//! 3. Checks the wallet covers amount plus fee at the initial gas price
//! 4. Hands the transfer to the resilient sender
//!
//! Each pair resolves to one `TransferOutcome` and one log line.

pub mod amount;
pub mod driver;
pub mod inputs;

pub use amount::AmountRange;
pub use driver::{DisbursementDriver, RunSummary};
pub use inputs::{load_accounts, load_string_list};
