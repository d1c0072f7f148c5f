//! Transaction submission: fee policy, resilient broadcast and receipt polling

mod confirmation;
mod gas;
mod sender;

pub use confirmation::ConfirmationPoller;
pub use gas::FeePolicy;
pub use sender::{SubmittedTransfer, TransactionSender};
