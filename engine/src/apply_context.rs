//! The environment one contract action runs in.
//!
//! An [`ApplyContext`] is built for every contract action, top-level or
//! inline. It gives the runtime access to the action, contract table storage
//! (see `contract_table.rs`), the enclosing [`TransactionContext`] and a queue
//! of inline calls that run once the action itself has returned.

use bytes::Bytes;
use keel_db::Database;
use keel_primitives::{
    AccountUid, Amount, Asset, ExecError, ExecResult, InterContractCallOperation, Operation,
};
use tracing::debug;

use crate::context::TransactionContext;
use crate::evaluator::{apply_operation, ChainEnv, EvalState};
use crate::ledger;

/// A contract method invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub sender: AccountUid,
    pub contract_id: AccountUid,
    pub method_name: String,
    pub data: Bytes,
    pub amount: Option<Asset>,
}

pub struct ApplyContext<'a> {
    pub(crate) db: &'a mut Database,
    pub(crate) trx: &'a mut TransactionContext,
    env: ChainEnv<'a>,
    act: Action,
    receiver: AccountUid,
    inline_operations: Vec<InterContractCallOperation>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(
        db: &'a mut Database,
        trx: &'a mut TransactionContext,
        env: ChainEnv<'a>,
        act: Action,
    ) -> Self {
        let receiver = act.contract_id;
        Self {
            db,
            trx,
            env,
            act,
            receiver,
            inline_operations: Vec::new(),
        }
    }

    pub fn action(&self) -> &Action {
        &self.act
    }

    /// The contract whose code is running.
    pub fn receiver(&self) -> AccountUid {
        self.receiver
    }

    pub fn sender(&self) -> AccountUid {
        self.act.sender
    }

    /// Read-only view of chain state.
    pub fn db(&self) -> &Database {
        self.db
    }

    pub fn trx_context(&self) -> &TransactionContext {
        self.trx
    }

    /// Run `f` with the billing timer paused. The timer is running again
    /// when this returns, whatever `f` did.
    pub fn unbilled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if self.trx.is_paused() {
            return f(self);
        }
        self.trx.pause_billing_timer();
        let result = f(self);
        self.trx.resume_billing_timer();
        result
    }

    pub fn head_block_time(&self) -> u64 {
        self.env.head_block_time
    }

    pub fn checktime(&mut self) -> ExecResult<()> {
        self.trx.checktime()
    }

    /// Run the action, then every inline call it queued, in order.
    pub fn exec(&mut self) -> ExecResult<()> {
        if let Some(amount) = self.act.amount {
            ledger::adjust_balance(self.db, self.act.sender, amount.checked_neg()?)?;
            ledger::adjust_balance(self.db, self.receiver, amount)?;
        }

        self.exec_one()?;

        for op in std::mem::take(&mut self.inline_operations) {
            self.execute_inline(op)?;
        }
        self.trx.check_exceeded()
    }

    fn exec_one(&mut self) -> ExecResult<()> {
        let started = self.trx.clock().now_us();
        let account = ledger::get_account_by_uid(self.db, self.receiver)?;
        let code_version = account.code_version;
        let runtime = self.env.runtime;
        let result = runtime.apply(&code_version, self);
        // a resource failure ends the transaction even if the code dropped it
        self.trx.check_exceeded()?;
        result?;
        self.trx.checktime()?;
        debug!(
            receiver = self.receiver,
            method = %self.act.method_name,
            elapsed_us = self.trx.clock().now_us().saturating_sub(started),
            "contract action executed"
        );
        Ok(())
    }

    /// Queue a call to another contract on behalf of the receiver.
    ///
    /// The call counts towards the transaction's inter-contract limit as soon
    /// as it is sent, and runs after the current action returns.
    pub fn send_inline(&mut self, act: Action) -> ExecResult<()> {
        let max_size = self.trx.max_inline_action_size() as usize;
        if act.data.len() > max_size {
            return Err(ExecError::validation(format!(
                "inline action too big: {} > {}",
                act.data.len(),
                max_size
            )));
        }
        self.trx.check_inter_contract_depth()?;

        if act.sender != self.receiver {
            return Err(ExecError::Unauthorized(format!(
                "contract {} cannot send inline actions as {}",
                self.receiver, act.sender
            )));
        }
        let contract = ledger::get_account_by_uid(self.db, act.contract_id)?;
        if !contract.is_contract() {
            return Err(ExecError::validation(format!(
                "inline action target {} has no code",
                act.contract_id
            )));
        }
        let action_def = contract.abi.find_action(&act.method_name).ok_or_else(|| {
            ExecError::validation(format!("method {} not found in abi", act.method_name))
        })?;

        let amount = match act.amount {
            Some(a) if a.amount.is_negative() => {
                return Err(ExecError::validation("inline action amount cannot be negative"))
            }
            Some(a) if a.amount.is_positive() => {
                if !action_def.payable {
                    return Err(ExecError::validation(format!(
                        "method {} is not payable",
                        act.method_name
                    )));
                }
                Some(a)
            }
            _ => None,
        };

        self.inline_operations.push(InterContractCallOperation {
            fee: Asset::core(Amount::ZERO),
            sender_contract: self.receiver,
            contract_id: act.contract_id,
            amount,
            method_name: act.method_name,
            data: act.data,
        });
        Ok(())
    }

    /// Dispatch `op` through the evaluator framework within this transaction.
    pub fn execute_inline(&mut self, op: InterContractCallOperation) -> ExecResult<()> {
        let op = Operation::InterContractCall(op);
        let mut state = EvalState::nested(self.env, &mut *self.trx);
        apply_operation(&mut *self.db, &mut state, &op)?;
        Ok(())
    }

    /// Resolve the account billed for a storage write.
    ///
    /// Only the sender, the transaction origin or the receiver may be billed.
    /// A payer of `0` means the receiver.
    pub fn check_payer_permission(&self, payer: AccountUid) -> ExecResult<AccountUid> {
        if payer == 0 {
            return Ok(self.receiver);
        }
        if payer == self.act.sender || payer == self.trx.trx_origin() || payer == self.receiver {
            return Ok(payer);
        }
        Err(ExecError::DbAccessViolation(format!(
            "cannot charge RAM to account {}",
            payer
        )))
    }

    /// Pending inline calls, for inspection by the runtime.
    pub fn inline_operations(&self) -> &[InterContractCallOperation] {
        &self.inline_operations
    }
}
