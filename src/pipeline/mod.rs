//! Purchase pipeline - filter, quote, execute.
//!
//! Events flow through [`SnipePipeline::dispatch`]: the [`CandidateFilter`]
//! claims the vault in the [`InFlightRegistry`], then a [`PurchaseExecutor`]
//! runs the purchase on its own task.

pub mod attempt;
pub mod backoff;
pub mod coordinator;
pub mod executor;
pub mod filter;
pub mod quote;
pub mod registry;
pub mod subprocess;

pub use attempt::{AttemptError, Confirmation, DirectAttempt, Fill, PurchaseAttempt, PurchaseOrder, Slippage};
pub use backoff::BackoffSchedule;
pub use coordinator::SnipePipeline;
pub use executor::{ExecutorConfig, PurchaseExecutor, PurchaseOutcome};
pub use filter::{CandidateFilter, Rejection};
pub use quote::QuoteAcquirer;
pub use registry::{InFlightGuard, InFlightRegistry};
pub use subprocess::{BuyCommand, SubprocessAttempt};
