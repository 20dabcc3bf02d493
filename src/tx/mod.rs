//! Transaction lifecycle: gas policy, approval, submission and confirmation

pub mod approval;
pub mod confirm;
mod gas;
pub mod outcome;

pub use approval::ensure_allowance;
pub use confirm::ConfirmationWaiter;
pub use gas::GasPolicy;
pub use outcome::TransactionOutcome;
