use keel_db::Database;
use keel_primitives::{AccountCreateOperation, ExecError, ExecResult, OperationResult};

use crate::evaluator::{EvalState, Evaluator};
use crate::ledger;

#[derive(Default)]
pub struct AccountCreateEvaluator;

impl Evaluator for AccountCreateEvaluator {
    type Op = AccountCreateOperation;

    fn do_evaluate(&mut self, db: &Database, _state: &EvalState<'_>, op: &Self::Op) -> ExecResult<()> {
        ledger::get_account_by_uid(db, op.registrar)?;
        if ledger::find_account_by_uid(db, op.uid)?.is_some() {
            return Err(ExecError::validation(format!("account uid {} already exists", op.uid)));
        }
        if ledger::find_account_by_name(db, &op.name)?.is_some() {
            return Err(ExecError::validation(format!("account name {} already exists", op.name)));
        }
        Ok(())
    }

    fn do_apply(
        &mut self,
        db: &mut Database,
        state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult> {
        let create_time = state.env.head_block_time;
        let id = ledger::create_account_objects(db, |a| {
            a.uid = op.uid;
            a.name = op.name.clone();
            a.registrar = op.registrar;
            a.create_time = create_time;
        })?;
        Ok(OperationResult::ObjectId(id))
    }
}
