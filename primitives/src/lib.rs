//! `keel-primitives`: foundational types for the Keel execution layer.
//!
//! This crate provides identifiers, bounded amounts, the error taxonomy, the
//! closed set of operations with their fee and authority rules, the fee
//! schedule and chain parameters, and receipts. It has no notion of storage;
//! the object store lives in `keel-db` and the evaluators in `keel-engine`.

pub mod types;
pub mod error;
pub mod amount;
pub mod crypto;
pub mod fee;
pub mod params;
pub mod operation;
pub mod execution;

// Re-export commonly used types at the crate root for convenience.
pub use types::{
    AccountUid, AssetAid, Hash, ObjectId, Timestamp, BLOCKCHAIN_PRECISION, CORE_ASSET_AID,
    IMPLEMENTATION_SPACE, MAX_SHARE_SUPPLY, PROTOCOL_SPACE,
};
pub use error::{ErrorCode, ErrorKind, ExecError, ExecResult};
pub use amount::{Amount, Asset};
pub use fee::FeeSchedule;
pub use params::ChainParameters;
pub use operation::{
    Abi, AccountCreateOperation, ActionDef, BalanceLockUpdateOperation, ContractCallOperation,
    ContractDeployOperation, InterContractCallOperation, Operation, RequiredAuthorities,
    TransferOperation,
};
pub use execution::{
    AccountReceipt, ContractReceipt, OperationResult, SignedTransaction, TransactionReceipt,
};
