//! Two-phase operation evaluation.
//!
//! Every operation kind has an [`Evaluator`]: `do_evaluate` checks the
//! operation against current state without touching it, `do_apply` performs
//! the state change. [`apply_operation`] wraps both with the common fee
//! handling and runs them inside an undo session so a failing operation
//! leaves no trace.

use std::sync::Arc;

use keel_db::Database;
use keel_primitives::{
    AccountUid, Asset, ChainParameters, ExecError, ExecResult, Operation, OperationResult,
    Timestamp, CORE_ASSET_AID,
};
use tracing::{debug, debug_span};

use crate::account_evaluator::AccountCreateEvaluator;
use crate::balance_lock_evaluator::BalanceLockUpdateEvaluator;
use crate::clock::Clock;
use crate::context::TransactionContext;
use crate::contract_evaluator::{
    ContractCallEvaluator, ContractDeployEvaluator, InterContractCallEvaluator,
};
use crate::ledger;
use crate::objects::{AccountStatisticsObject, DynamicGlobalPropertyObject};
use crate::runtime::ContractRuntime;
use crate::transfer_evaluator::TransferEvaluator;

/// Chain-wide inputs every evaluator may read.
#[derive(Clone, Copy)]
pub struct ChainEnv<'a> {
    pub params: &'a ChainParameters,
    pub runtime: &'a dyn ContractRuntime,
    pub clock: &'a Arc<dyn Clock>,
    pub head_block_time: Timestamp,
    pub enabled_hardfork: bool,
    /// CPU time already billed for this transaction (replay); 0 when live.
    pub billed_cpu_time_us: u64,
}

/// Per-dispatch evaluation state.
pub struct EvalState<'a> {
    pub env: ChainEnv<'a>,
    /// Set for operations dispatched by a running contract.
    pub skip_fee_schedule_check: bool,
    /// The enclosing contract transaction, if any.
    pub trx_context: Option<&'a mut TransactionContext>,
}

impl<'a> EvalState<'a> {
    /// State for an operation submitted in a transaction.
    pub fn new(env: ChainEnv<'a>) -> Self {
        Self {
            env,
            skip_fee_schedule_check: false,
            trx_context: None,
        }
    }

    /// State for an operation dispatched from inside `trx`.
    pub fn nested(env: ChainEnv<'a>, trx: &'a mut TransactionContext) -> Self {
        Self {
            env,
            skip_fee_schedule_check: true,
            trx_context: Some(trx),
        }
    }
}

pub trait Evaluator: Default {
    type Op;

    /// Stateful checks. Must not modify the database.
    fn do_evaluate(&mut self, db: &Database, state: &EvalState<'_>, op: &Self::Op) -> ExecResult<()>;

    fn do_apply(
        &mut self,
        db: &mut Database,
        state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult>;

    /// Receives the fee prepared for this operation before `do_evaluate`.
    fn set_fee_from_account(&mut self, _fee: Asset) {}
}

/// Evaluate and apply `op` inside its own undo session.
///
/// On error every change made by the operation, including nested
/// dispatches, is reverted before the error is returned.
pub fn apply_operation(
    db: &mut Database,
    state: &mut EvalState<'_>,
    op: &Operation,
) -> ExecResult<OperationResult> {
    let span = debug_span!("operation", op = op.name(), payer = op.fee_payer_uid());
    let _enter = span.enter();

    db.start_undo_session();
    match dispatch(db, state, op) {
        Ok(result) => {
            db.squash()?;
            Ok(result)
        }
        Err(err) => {
            debug!(error = %err, "operation rejected");
            db.undo()?;
            Err(err)
        }
    }
}

fn dispatch(db: &mut Database, state: &mut EvalState<'_>, op: &Operation) -> ExecResult<OperationResult> {
    match op {
        Operation::AccountCreate(inner) => run::<AccountCreateEvaluator>(db, state, op, inner),
        Operation::Transfer(inner) => run::<TransferEvaluator>(db, state, op, inner),
        Operation::BalanceLockUpdate(inner) => {
            run::<BalanceLockUpdateEvaluator>(db, state, op, inner)
        }
        Operation::ContractDeploy(inner) => run::<ContractDeployEvaluator>(db, state, op, inner),
        Operation::ContractCall(inner) => run::<ContractCallEvaluator>(db, state, op, inner),
        Operation::InterContractCall(inner) => {
            run::<InterContractCallEvaluator>(db, state, op, inner)
        }
    }
}

fn run<E: Evaluator>(
    db: &mut Database,
    state: &mut EvalState<'_>,
    op: &Operation,
    inner: &E::Op,
) -> ExecResult<OperationResult> {
    let mut evaluator = E::default();
    let fee = prepare_fee(db, state, op)?;
    evaluator.set_fee_from_account(fee);
    evaluator.do_evaluate(db, state, inner)?;
    let result = evaluator.do_apply(db, state, inner)?;
    pay_fee(db, op.fee_payer_uid(), fee)?;
    Ok(result)
}

/// Payer exists, fee is core, fee meets the schedule, payer can afford it.
fn prepare_fee(db: &Database, state: &EvalState<'_>, op: &Operation) -> ExecResult<Asset> {
    let fee = op.fee();
    if !fee.is_core() || fee.amount.is_negative() {
        return Err(ExecError::validation(format!(
            "{} fee must be a non-negative core asset amount",
            op.name()
        )));
    }
    let payer = op.fee_payer_uid();
    ledger::get_account_by_uid(db, payer)?;

    if !state.skip_fee_schedule_check {
        let required = op.calculate_fee(&state.env.params.current_fees)?;
        if fee.amount < required {
            return Err(ExecError::InsufficientFee {
                paid: fee.amount.value(),
                required: required.value(),
            });
        }
    }

    if fee.amount.is_positive() {
        let balance = ledger::get_balance(db, payer, CORE_ASSET_AID)?;
        if balance.amount < fee.amount {
            return Err(ExecError::InsufficientBalance {
                account: payer,
                available: balance.amount.value(),
                required: fee.amount.value(),
            });
        }
    }
    Ok(fee)
}

/// Debit the fee and record it in the fee pool and the payer's statistics.
fn pay_fee(db: &mut Database, payer: AccountUid, fee: Asset) -> ExecResult<()> {
    if fee.amount.is_zero() {
        return Ok(());
    }
    ledger::adjust_balance(db, payer, fee.checked_neg()?)?;

    let accumulated = ledger::dynamic_global_properties(db)?
        .accumulated_fees
        .checked_add(fee.amount)?;
    db.modify::<DynamicGlobalPropertyObject>(ledger::dgp_id(), |d| {
        d.accumulated_fees = accumulated
    })?;

    let stats = ledger::get_account_statistics(db, payer)?;
    let (id, total) = (stats.id, stats.total_fees_paid.checked_add(fee.amount)?);
    db.modify::<AccountStatisticsObject>(id, |s| s.total_fees_paid = total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, CONTRACT, OTHER_CONTRACT, PLAIN_ACCOUNT, SENDER};
    use bytes::Bytes;
    use keel_primitives::{Amount, FeeSchedule, InterContractCallOperation, TransferOperation};

    fn core(v: i64) -> Asset {
        Asset::core(Amount::new(v).unwrap())
    }

    fn transfer(from: AccountUid, amount: i64, fee: i64) -> Operation {
        Operation::Transfer(TransferOperation {
            fee: core(fee),
            from,
            to: CONTRACT,
            amount: core(amount),
            memo: None,
        })
    }

    fn free_fixture() -> Fixture {
        let params = ChainParameters {
            current_fees: FeeSchedule::zero(),
            ..Default::default()
        };
        let mut f = Fixture::with_params(1_000_000, params);
        ledger::adjust_balance(&mut f.db, PLAIN_ACCOUNT, core(100)).unwrap();
        f
    }

    #[test]
    fn test_failed_operation_leaves_no_trace() {
        let mut f = free_fixture();
        let before = f.db.state_digest().unwrap();
        let (db, _, env) = f.split();
        let err = apply_operation(db, &mut EvalState::new(env), &transfer(PLAIN_ACCOUNT, 1_000, 0))
            .unwrap_err();
        assert!(matches!(err, ExecError::InsufficientBalance { .. }));
        assert_eq!(db.undo_depth(), 0);
        assert_eq!(f.db.state_digest().unwrap(), before);
    }

    #[test]
    fn test_fee_moves_to_pool() {
        let mut f = free_fixture();
        let (db, _, env) = f.split();
        let result = apply_operation(db, &mut EvalState::new(env), &transfer(PLAIN_ACCOUNT, 50, 10)).unwrap();
        assert_eq!(result, OperationResult::Void);

        assert_eq!(ledger::get_balance(&f.db, PLAIN_ACCOUNT, CORE_ASSET_AID).unwrap(), core(40));
        assert_eq!(ledger::get_balance(&f.db, CONTRACT, CORE_ASSET_AID).unwrap(), core(50));
        let dgp = ledger::dynamic_global_properties(&f.db).unwrap();
        assert_eq!(dgp.accumulated_fees.value(), 10);
        let stats = ledger::get_account_statistics(&f.db, PLAIN_ACCOUNT).unwrap();
        assert_eq!(stats.total_fees_paid.value(), 10);
    }

    #[test]
    fn test_fee_must_be_affordable() {
        let mut f = free_fixture();
        let (db, _, env) = f.split();
        // amount plus fee exceeds the balance
        let err = apply_operation(db, &mut EvalState::new(env), &transfer(PLAIN_ACCOUNT, 95, 10))
            .unwrap_err();
        assert!(matches!(err, ExecError::InsufficientBalance { required: 105, .. }));
        let err = apply_operation(db, &mut EvalState::new(env), &transfer(PLAIN_ACCOUNT, 1, 101))
            .unwrap_err();
        assert!(matches!(err, ExecError::InsufficientBalance { required: 101, .. }));
    }

    #[test]
    fn test_fee_schedule_enforced_unless_skipped() {
        let mut f = Fixture::new(1_000_000);
        ledger::adjust_balance(&mut f.db, PLAIN_ACCOUNT, core(100)).unwrap();
        let required = transfer(PLAIN_ACCOUNT, 1, 0)
            .calculate_fee(&f.params.current_fees)
            .unwrap();

        let (db, trx, env) = f.split();
        let err = apply_operation(db, &mut EvalState::new(env), &transfer(PLAIN_ACCOUNT, 1, 0))
            .unwrap_err();
        assert_eq!(
            err,
            ExecError::InsufficientFee { paid: 0, required: required.value() }
        );

        let mut nested = EvalState::nested(env, trx);
        apply_operation(db, &mut nested, &transfer(PLAIN_ACCOUNT, 1, 0)).unwrap();
    }

    #[test]
    fn test_fee_payer_must_exist() {
        let mut f = free_fixture();
        let (db, _, env) = f.split();
        let err = apply_operation(db, &mut EvalState::new(env), &transfer(SENDER, 1, 0)).unwrap_err();
        assert!(matches!(err, ExecError::NotFound { .. }));
    }

    #[test]
    fn test_inter_contract_call_needs_transaction() {
        let mut f = free_fixture();
        let (db, _, env) = f.split();
        let op = Operation::InterContractCall(InterContractCallOperation {
            fee: core(0),
            sender_contract: CONTRACT,
            contract_id: OTHER_CONTRACT,
            amount: None,
            method_name: "run".into(),
            data: Bytes::new(),
        });
        let err = apply_operation(db, &mut EvalState::new(env), &op).unwrap_err();
        assert!(matches!(err, ExecError::Validation(_)));
    }
}
