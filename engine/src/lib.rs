//! `keel-engine`: deterministic operation evaluation and contract execution.
//!
//! This crate applies operations to the chain state held in a
//! [`keel_db::Database`]:
//!
//! ## Architecture
//!
//! - [`chain::Chain`]: applies signed transactions all-or-nothing
//! - [`evaluator`]: two-phase evaluate/apply dispatch with common fee handling
//! - [`context::TransactionContext`]: CPU deadline, RAM ledger and inline call budget of one contract transaction
//! - [`apply_context::ApplyContext`]: what a running contract sees; contract table storage lives in `contract_table`
//! - [`runtime::ContractRuntime`]: seam to the code executor, and [`runtime::NativeRuntime`] runs Rust closures
//! - [`objects`]: chain state objects and the billable sizes of contract storage

pub mod objects;
pub mod ledger;
pub mod clock;
pub mod context;
pub mod runtime;
pub mod apply_context;
mod contract_table;
pub mod evaluator;
pub mod account_evaluator;
pub mod transfer_evaluator;
pub mod balance_lock_evaluator;
pub mod contract_evaluator;
pub mod authority;
pub mod chain;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use apply_context::{Action, ApplyContext};
pub use authority::{AllowAll, AuthorityOracle, SignedUidsOracle};
pub use chain::Chain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::TransactionContext;
pub use contract_evaluator::RAM_ACCOUNT_NAME;
pub use evaluator::{apply_operation, ChainEnv, EvalState, Evaluator};
pub use runtime::{ContractRuntime, NativeContract, NativeRuntime};
