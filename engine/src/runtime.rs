//! Contract runtime abstraction.
//!
//! The engine never interprets contract code itself. It hands the deployed
//! code version and an [`ApplyContext`] to a [`ContractRuntime`], which runs
//! the requested method and talks back to the chain only through the context
//! (table storage, inline calls, CPU checks).
//!
//! [`NativeRuntime`] binds code versions to Rust closures. It backs the test
//! suite and any chain that ships built-in contracts.

use std::collections::BTreeMap;

use keel_primitives::types::hash_to_hex;
use keel_primitives::{crypto, ExecError, ExecResult, Hash};
use tracing::debug;

use crate::apply_context::ApplyContext;

/// Executes contract code on behalf of the engine.
pub trait ContractRuntime: Send + Sync {
    /// Run `ctx`'s action against the code identified by `code_version`.
    fn apply(&self, code_version: &Hash, ctx: &mut ApplyContext<'_>) -> ExecResult<()>;

    /// Reject code that can never run. Called when a contract is deployed.
    fn validate(&self, _code: &[u8]) -> ExecResult<()> {
        Ok(())
    }
}

/// Signature of a native contract entry point.
pub type NativeContract = Box<dyn Fn(&mut ApplyContext<'_>) -> ExecResult<()> + Send + Sync>;

/// Runtime whose contracts are Rust closures keyed by code version.
#[derive(Default)]
pub struct NativeRuntime {
    contracts: BTreeMap<Hash, NativeContract>,
}

impl NativeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `code` to `entry`. Returns the code version to expect on deploy.
    pub fn register<F>(&mut self, code: &[u8], entry: F) -> Hash
    where
        F: Fn(&mut ApplyContext<'_>) -> ExecResult<()> + Send + Sync + 'static,
    {
        let version = crypto::code_version(code);
        debug!(code_version = %hash_to_hex(&version), "native contract registered");
        self.contracts.insert(version, Box::new(entry));
        version
    }

    /// Builder form of [`NativeRuntime::register`].
    pub fn with_contract<F>(mut self, code: &[u8], entry: F) -> Self
    where
        F: Fn(&mut ApplyContext<'_>) -> ExecResult<()> + Send + Sync + 'static,
    {
        self.register(code, entry);
        self
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl ContractRuntime for NativeRuntime {
    fn apply(&self, code_version: &Hash, ctx: &mut ApplyContext<'_>) -> ExecResult<()> {
        let entry = self
            .contracts
            .get(code_version)
            .ok_or_else(|| ExecError::not_found("native contract", hash_to_hex(code_version)))?;
        entry(ctx)
    }

    fn validate(&self, code: &[u8]) -> ExecResult<()> {
        let version = crypto::code_version(code);
        if !self.contracts.contains_key(&version) {
            return Err(ExecError::validation(format!(
                "no native contract for code version {}",
                hash_to_hex(&version)
            )));
        }
        Ok(())
    }
}
