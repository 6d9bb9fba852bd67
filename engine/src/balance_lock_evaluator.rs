use keel_db::Database;
use keel_primitives::{
    BalanceLockUpdateOperation, ExecError, ExecResult, ObjectId, OperationResult, CORE_ASSET_AID,
};

use crate::evaluator::{EvalState, Evaluator};
use crate::ledger;
use crate::objects::AccountStatisticsObject;

/// Changes the part of an account's core balance locked for fee points.
#[derive(Default)]
pub struct BalanceLockUpdateEvaluator {
    stats_id: Option<ObjectId>,
}

impl Evaluator for BalanceLockUpdateEvaluator {
    type Op = BalanceLockUpdateOperation;

    fn do_evaluate(&mut self, db: &Database, state: &EvalState<'_>, op: &Self::Op) -> ExecResult<()> {
        if !state.env.enabled_hardfork {
            return Err(ExecError::validation("balance locking is not enabled yet"));
        }
        let stats = ledger::get_account_statistics(db, op.account)?;

        if op.new_lock_balance.is_positive() {
            if op.new_lock_balance == stats.locked_balance_for_feepoint {
                return Err(ExecError::validation("lock balance did not change"));
            }
            let available = ledger::get_balance(db, op.account, CORE_ASSET_AID)?.amount;
            if available < op.new_lock_balance {
                return Err(ExecError::InsufficientBalance {
                    account: op.account,
                    available: available.value(),
                    required: op.new_lock_balance.value(),
                });
            }
        }
        self.stats_id = Some(stats.id);
        Ok(())
    }

    fn do_apply(
        &mut self,
        db: &mut Database,
        state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult> {
        let id = self
            .stats_id
            .ok_or_else(|| ExecError::Internal("balance lock applied before evaluation".into()))?;
        let now = state.env.head_block_time;
        db.modify::<AccountStatisticsObject>(id, |s| {
            s.locked_balance_for_feepoint = op.new_lock_balance;
            s.last_lock_update_time = now;
        })?;
        Ok(OperationResult::Void)
    }
}
