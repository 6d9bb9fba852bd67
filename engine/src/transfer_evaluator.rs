use keel_db::Database;
use keel_primitives::{ExecError, ExecResult, ObjectId, OperationResult, TransferOperation};

use crate::evaluator::{EvalState, Evaluator};
use crate::ledger;

/// Moves an asset amount between two balances.
#[derive(Default)]
pub struct TransferEvaluator {
    from_balance: Option<ObjectId>,
    /// `None` until the recipient first holds the asset.
    to_balance: Option<ObjectId>,
}

impl Evaluator for TransferEvaluator {
    type Op = TransferOperation;

    fn do_evaluate(&mut self, db: &Database, _state: &EvalState<'_>, op: &Self::Op) -> ExecResult<()> {
        ledger::get_account_by_uid(db, op.from)?;
        ledger::get_account_by_uid(db, op.to)?;

        // the fee leaves the same balance when both are core
        let mut required = op.amount.amount;
        if op.amount.is_core() {
            required = required.checked_add(op.fee.amount)?;
        }
        let from = ledger::find_balance(db, op.from, op.amount.asset_id)?;
        let available = from.map(|b| b.balance).unwrap_or_default();
        if available < required {
            return Err(ExecError::InsufficientBalance {
                account: op.from,
                available: available.value(),
                required: required.value(),
            });
        }
        self.from_balance = from.map(|b| b.id);
        self.to_balance = ledger::find_balance(db, op.to, op.amount.asset_id)?.map(|b| b.id);
        Ok(())
    }

    fn do_apply(
        &mut self,
        db: &mut Database,
        _state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult> {
        let from = self
            .from_balance
            .ok_or_else(|| ExecError::Internal("transfer applied before evaluation".into()))?;
        ledger::adjust_balance_object(db, op.from, Some(from), op.amount.checked_neg()?)?;
        ledger::adjust_balance_object(db, op.to, self.to_balance, op.amount)?;
        Ok(OperationResult::Void)
    }
}
