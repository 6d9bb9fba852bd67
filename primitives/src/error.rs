//! Error types for the Keel execution layer.
//!
//! Every failure surfaces as an [`ExecError`]. Errors fall into three kinds
//! (see [`ErrorKind`]); the applier treats all of them the same way and undoes
//! the enclosing transaction, but callers use the kind to decide whether a
//! transaction may be retried with more resources.

use core::fmt;

use crate::types::AccountUid;

/// Stable numeric result codes reported in receipts and logs.
///
/// These repr values are persisted by callers and MUST NOT be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Validation = 1,
    InsufficientBalance = 2,
    InsufficientFee = 3,
    Unauthorized = 4,
    NotFound = 5,
    Overflow = 6,
    DbAccessViolation = 7,
    CpuUsageExceeded = 8,
    InterContractDepthExceeded = 9,
    UniqueViolation = 10,
    Internal = 11,
}

impl ErrorCode {
    /// Convert from an i32 result code.
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Validation),
            2 => Some(Self::InsufficientBalance),
            3 => Some(Self::InsufficientFee),
            4 => Some(Self::Unauthorized),
            5 => Some(Self::NotFound),
            6 => Some(Self::Overflow),
            7 => Some(Self::DbAccessViolation),
            8 => Some(Self::CpuUsageExceeded),
            9 => Some(Self::InterContractDepthExceeded),
            10 => Some(Self::UniqueViolation),
            11 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Return the i32 representation of this result code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns true if this is the `Ok` variant.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Validation => write!(f, "ERR_VALIDATION"),
            Self::InsufficientBalance => write!(f, "ERR_INSUFFICIENT_BALANCE"),
            Self::InsufficientFee => write!(f, "ERR_INSUFFICIENT_FEE"),
            Self::Unauthorized => write!(f, "ERR_UNAUTHORIZED"),
            Self::NotFound => write!(f, "ERR_NOT_FOUND"),
            Self::Overflow => write!(f, "ERR_OVERFLOW"),
            Self::DbAccessViolation => write!(f, "ERR_DB_ACCESS_VIOLATION"),
            Self::CpuUsageExceeded => write!(f, "ERR_CPU_USAGE_EXCEEDED"),
            Self::InterContractDepthExceeded => write!(f, "ERR_INTER_CONTRACT_DEPTH"),
            Self::UniqueViolation => write!(f, "ERR_UNIQUE_VIOLATION"),
            Self::Internal => write!(f, "ERR_INTERNAL"),
        }
    }
}

/// Broad classification of an [`ExecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation is malformed or not allowed by current state.
    Validation,
    /// A transaction-wide resource limit (CPU time, call depth) was hit.
    ResourceExceeded,
    /// The store would become inconsistent, or an internal invariant broke.
    Consistency,
}

/// Execution engine error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    /// Stateless or stateful validation of an operation failed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient balance: account {account} has {available}, needs {required}")]
    InsufficientBalance {
        account: AccountUid,
        available: i64,
        required: i64,
    },

    #[error("insufficient fee: paid {paid}, required {required}")]
    InsufficientFee { paid: i64, required: i64 },

    /// The authority oracle rejected the required authorities.
    #[error("missing required authority: {0}")]
    Unauthorized(String),

    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// Checked arithmetic left the representable / allowed range.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// A contract touched a table or payer it is not allowed to.
    #[error("db access violation: {0}")]
    DbAccessViolation(String),

    #[error("transaction was executing for too long: {elapsed_us}us, limit {limit_us}us")]
    CpuUsageExceeded { elapsed_us: u64, limit_us: u64 },

    #[error("max cross contract calling can not exceed {max}")]
    InterContractDepthExceeded { max: u32 },

    /// A unique secondary index would hold two records with the same key.
    #[error("unique index `{index}` violated on {type_name}")]
    UniqueViolation {
        type_name: &'static str,
        index: &'static str,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecError {
    /// Shorthand for [`ExecError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`ExecError::NotFound`].
    pub fn not_found(what: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::InsufficientBalance { .. }
            | Self::InsufficientFee { .. }
            | Self::Unauthorized(_)
            | Self::NotFound { .. }
            | Self::Overflow(_)
            | Self::DbAccessViolation(_) => ErrorKind::Validation,
            Self::CpuUsageExceeded { .. } | Self::InterContractDepthExceeded { .. } => {
                ErrorKind::ResourceExceeded
            }
            Self::UniqueViolation { .. } | Self::Internal(_) => ErrorKind::Consistency,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::InsufficientFee { .. } => ErrorCode::InsufficientFee,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Overflow(_) => ErrorCode::Overflow,
            Self::DbAccessViolation(_) => ErrorCode::DbAccessViolation,
            Self::CpuUsageExceeded { .. } => ErrorCode::CpuUsageExceeded,
            Self::InterContractDepthExceeded { .. } => ErrorCode::InterContractDepthExceeded,
            Self::UniqueViolation { .. } => ErrorCode::UniqueViolation,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Returns true for CPU deadline and call depth failures.
    pub fn is_resource_exceeded(&self) -> bool {
        self.kind() == ErrorKind::ResourceExceeded
    }
}

/// Convenience result type for the execution layer.
pub type ExecResult<T> = core::result::Result<T, ExecError>;
