//! Transaction applier.
//!
//! [`Chain`] owns the object store and applies signed transactions against it
//! one at a time. A transaction is all-or-nothing: every operation is
//! validated, authorized, evaluated and applied in order, and the first
//! failure reverts everything the transaction did.

use std::sync::Arc;

use keel_db::Database;
use keel_primitives::{
    AccountUid, Asset, AssetAid, ChainParameters, ExecError, ExecResult, ObjectId, OperationResult,
    SignedTransaction, Timestamp, TransactionReceipt,
};
use tracing::{debug, info_span, warn};

use crate::authority::{AuthorityOracle, SignedUidsOracle};
use crate::clock::{Clock, SystemClock};
use crate::evaluator::{apply_operation, ChainEnv, EvalState};
use crate::ledger;
use crate::objects::{register_tables, DynamicGlobalPropertyObject};
use crate::runtime::{ContractRuntime, NativeRuntime};

pub struct Chain {
    db: Database,
    params: ChainParameters,
    runtime: Arc<dyn ContractRuntime>,
    clock: Arc<dyn Clock>,
    head_block_time: Timestamp,
    enabled_hardfork: bool,
    billed_cpu_time_us: u64,
}

impl Chain {
    /// Fresh chain with no contracts and the system clock.
    pub fn new(params: ChainParameters) -> ExecResult<Self> {
        Self::with_runtime(params, Arc::new(NativeRuntime::new()), Arc::new(SystemClock::new()))
    }

    pub fn with_runtime(
        params: ChainParameters,
        runtime: Arc<dyn ContractRuntime>,
        clock: Arc<dyn Clock>,
    ) -> ExecResult<Self> {
        let mut db = Database::new();
        register_tables(&mut db)?;
        db.create::<DynamicGlobalPropertyObject>(|_| {})?;
        Ok(Self {
            db,
            params,
            runtime,
            clock,
            head_block_time: 0,
            enabled_hardfork: true,
            billed_cpu_time_us: 0,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn params(&self) -> &ChainParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: ChainParameters) {
        self.params = params;
    }

    pub fn set_head_block_time(&mut self, time: Timestamp) -> ExecResult<()> {
        self.head_block_time = time;
        self.db
            .modify::<DynamicGlobalPropertyObject>(ledger::dgp_id(), |d| d.head_block_time = time)
    }

    pub fn set_enabled_hardfork(&mut self, enabled: bool) {
        self.enabled_hardfork = enabled;
    }

    /// CPU time to bill contract calls with instead of measuring it, as when
    /// replaying. `0` measures.
    pub fn set_billed_cpu_time_us(&mut self, billed: u64) {
        self.billed_cpu_time_us = billed;
    }

    /// Apply `trx`, authorizing operations against its signers.
    pub fn apply_transaction(&mut self, trx: &SignedTransaction) -> ExecResult<TransactionReceipt> {
        let oracle = SignedUidsOracle::new(&trx.signed_uids, &trx.signed_keys);
        self.apply_transaction_with(trx, &oracle)
    }

    pub fn apply_transaction_with(
        &mut self,
        trx: &SignedTransaction,
        oracle: &dyn AuthorityOracle,
    ) -> ExecResult<TransactionReceipt> {
        let span = info_span!("transaction", ops = trx.operations.len());
        let _enter = span.enter();

        let Chain {
            db,
            params,
            runtime,
            clock,
            head_block_time,
            enabled_hardfork,
            billed_cpu_time_us,
        } = self;
        let env = ChainEnv {
            params,
            runtime: runtime.as_ref(),
            clock,
            head_block_time: *head_block_time,
            enabled_hardfork: *enabled_hardfork,
            billed_cpu_time_us: *billed_cpu_time_us,
        };

        db.start_undo_session();
        match apply_operations(db, env, trx, oracle) {
            Ok(operation_results) => {
                db.squash()?;
                debug!(results = operation_results.len(), "transaction applied");
                Ok(TransactionReceipt { operation_results })
            }
            Err(err) => {
                warn!(error = %err, code = err.code().as_i32(), "transaction rejected");
                db.undo()?;
                Err(err)
            }
        }
    }

    // ── Genesis helpers ──

    /// Register an account directly, bypassing fees and authorities.
    pub fn create_account(
        &mut self,
        uid: AccountUid,
        name: &str,
        registrar: AccountUid,
    ) -> ExecResult<ObjectId> {
        if ledger::find_account_by_uid(&self.db, uid)?.is_some() {
            return Err(ExecError::validation(format!("account uid {} already exists", uid)));
        }
        let create_time = self.head_block_time;
        ledger::create_account_objects(&mut self.db, |a| {
            a.uid = uid;
            a.name = name.to_string();
            a.registrar = registrar;
            a.create_time = create_time;
        })
    }

    /// Credit `amount` to `uid` out of thin air.
    pub fn deposit(&mut self, uid: AccountUid, amount: Asset) -> ExecResult<()> {
        ledger::get_account_by_uid(&self.db, uid)?;
        ledger::adjust_balance(&mut self.db, uid, amount)
    }

    pub fn balance(&self, uid: AccountUid, asset: AssetAid) -> ExecResult<Asset> {
        ledger::get_balance(&self.db, uid, asset)
    }
}

fn apply_operations(
    db: &mut Database,
    env: ChainEnv<'_>,
    trx: &SignedTransaction,
    oracle: &dyn AuthorityOracle,
) -> ExecResult<Vec<OperationResult>> {
    let mut results = Vec::with_capacity(trx.operations.len());
    for op in &trx.operations {
        op.validate()?;
        let required = op.required_authorities(env.enabled_hardfork);
        if !oracle.check(&required) {
            return Err(ExecError::Unauthorized(format!(
                "{} requires {:?}",
                op.name(),
                required.accounts()
            )));
        }
        let mut state = EvalState::new(env);
        results.push(apply_operation(db, &mut state, op)?);
    }
    Ok(results)
}
