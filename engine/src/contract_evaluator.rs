//! Contract deployment and invocation.
//!
//! A contract call runs under a fresh [`TransactionContext`]: the CPU
//! deadline, RAM ledger and inline call budget cover the call and every
//! inter-contract call it triggers. Once the code has run, CPU and RAM usage
//! are settled against the caller and the RAM account.

use std::sync::Arc;

use keel_db::Database;
use keel_primitives::fee::{calculate_cpu_fee, calculate_ram_fee};
use keel_primitives::{
    crypto, AccountReceipt, AccountUid, Amount, Asset, ContractCallOperation,
    ContractDeployOperation, ContractReceipt, ExecError, ExecResult, InterContractCallOperation,
    ObjectId, OperationResult, CORE_ASSET_AID,
};
use tracing::debug;

use crate::apply_context::{Action, ApplyContext};
use crate::context::TransactionContext;
use crate::evaluator::{EvalState, Evaluator};
use crate::ledger;
use crate::objects::AccountBalanceObject;

/// Account collecting RAM fees and paying RAM refunds.
pub const RAM_ACCOUNT_NAME: &str = "ramaccount";

#[derive(Default)]
pub struct ContractDeployEvaluator;

impl Evaluator for ContractDeployEvaluator {
    type Op = ContractDeployOperation;

    fn do_evaluate(&mut self, db: &Database, state: &EvalState<'_>, op: &Self::Op) -> ExecResult<()> {
        if ledger::find_account_by_uid(db, op.contract_id)?.is_some() {
            return Err(ExecError::validation(format!(
                "account uid {} already exists",
                op.contract_id
            )));
        }
        if ledger::find_account_by_name(db, &op.name)?.is_some() {
            return Err(ExecError::validation(format!("account name {} already exists", op.name)));
        }
        state.env.runtime.validate(&op.code)
    }

    fn do_apply(
        &mut self,
        db: &mut Database,
        state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult> {
        let create_time = state.env.head_block_time;
        let id = ledger::create_account_objects(db, |a| {
            a.uid = op.contract_id;
            a.name = op.name.clone();
            a.registrar = op.owner;
            a.create_time = create_time;
            a.vm_type = op.vm_type.clone();
            a.vm_version = op.vm_version.clone();
            a.code = op.code.clone();
            a.code_version = crypto::code_version(&op.code);
            a.abi = op.abi.clone();
        })?;
        debug!(contract = op.contract_id, name = %op.name, "contract deployed");
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub struct ContractCallEvaluator {
    fee_from_account: Asset,
    ram_account: AccountUid,
    caller: AccountUid,
    /// Core balance objects of the caller and the RAM account, when they
    /// existed at evaluation. Balance objects are never removed.
    caller_balance: Option<ObjectId>,
    ram_account_balance: Option<ObjectId>,
}

impl ContractCallEvaluator {
    fn adjust_core(&self, db: &mut Database, account: AccountUid, delta: Asset) -> ExecResult<()> {
        let cached = if account == self.ram_account {
            self.ram_account_balance
        } else if account == self.caller {
            self.caller_balance
        } else {
            None
        };
        match cached {
            Some(id) => ledger::adjust_balance_object(db, account, Some(id), delta),
            None => ledger::adjust_balance(db, account, delta),
        }
    }

    /// Move the fee for `ram_bytes` between `account` and the RAM account.
    ///
    /// A refund never exceeds what the RAM account holds.
    fn charge_ram_fee(
        &self,
        db: &mut Database,
        account: AccountUid,
        ram_bytes: i64,
        price_per_kbyte_ram: u64,
    ) -> ExecResult<AccountReceipt> {
        let mut fee = calculate_ram_fee(ram_bytes, price_per_kbyte_ram)?;
        if fee < 0 {
            let available = match self.ram_account_balance {
                Some(id) => db.get::<AccountBalanceObject>(id)?.balance,
                None => ledger::get_balance(db, self.ram_account, CORE_ASSET_AID)?.amount,
            };
            fee = -available.value().min(-fee);
        }
        let ram_fee = Asset::core(Amount::new(fee)?);
        self.adjust_core(db, account, ram_fee.checked_neg()?)?;
        self.adjust_core(db, self.ram_account, ram_fee)?;
        Ok(AccountReceipt {
            account,
            ram_bytes,
            ram_fee,
        })
    }
}

impl Evaluator for ContractCallEvaluator {
    type Op = ContractCallOperation;

    fn do_evaluate(&mut self, db: &Database, _state: &EvalState<'_>, op: &Self::Op) -> ExecResult<()> {
        let contract = ledger::get_account_by_uid(db, op.contract_id)?;
        if !contract.is_contract() {
            return Err(ExecError::validation(format!(
                "contract has no code, contract_id {}",
                op.contract_id
            )));
        }
        let action = contract.abi.find_action(&op.method_name).ok_or_else(|| {
            ExecError::validation(format!("method_name {} not found in abi", op.method_name))
        })?;

        if let Some(amount) = op.amount {
            if !action.payable {
                return Err(ExecError::validation(format!(
                    "method_name {} not payable",
                    op.method_name
                )));
            }
            let balance = ledger::get_balance(db, op.account, amount.asset_id)?;
            if balance.amount < amount.amount {
                return Err(ExecError::InsufficientBalance {
                    account: op.account,
                    available: balance.amount.value(),
                    required: amount.amount.value(),
                });
            }
        }

        let ram_account = ledger::find_account_by_name(db, RAM_ACCOUNT_NAME)?
            .ok_or_else(|| ExecError::not_found("account", RAM_ACCOUNT_NAME))?;
        self.ram_account = ram_account.uid;
        self.caller = op.account;
        self.caller_balance = ledger::find_balance(db, op.account, CORE_ASSET_AID)?.map(|b| b.id);
        self.ram_account_balance =
            ledger::find_balance(db, ram_account.uid, CORE_ASSET_AID)?.map(|b| b.id);
        Ok(())
    }

    fn do_apply(
        &mut self,
        db: &mut Database,
        state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult> {
        let env = state.env;
        let max_cpu_us = env.params.contract_cpu_limit_us(env.billed_cpu_time_us);
        let mut trx = TransactionContext::new(Arc::clone(env.clock), op.account, max_cpu_us, env.params);

        let act = Action {
            sender: op.account,
            contract_id: op.contract_id,
            method_name: op.method_name.clone(),
            data: op.data.clone(),
            amount: op.amount,
        };
        ApplyContext::new(&mut *db, &mut trx, env, act).exec()?;

        let fee_param = &env.params.current_fees.contract_call;
        let cpu_time_us = if env.billed_cpu_time_us > 0 {
            env.billed_cpu_time_us
        } else {
            trx.cpu_usage_us()
        };
        // sub-millisecond calls pay for one started millisecond
        if cpu_time_us < 1000 {
            let cpu_fee = calculate_cpu_fee(cpu_time_us, fee_param.price_per_ms_cpu)?;
            let cpu_fee = Asset::core(Amount::from_u64(cpu_fee)?);
            self.adjust_core(db, op.account, cpu_fee.checked_neg()?)?;
        }

        let mut ram_receipts = Vec::with_capacity(trx.ram_statistics().len());
        for (&account, &ram_bytes) in trx.ram_statistics() {
            let receipt = if ram_bytes == 0 {
                AccountReceipt {
                    account,
                    ram_bytes,
                    ram_fee: Asset::core(Amount::ZERO),
                }
            } else {
                self.charge_ram_fee(db, account, ram_bytes, fee_param.price_per_kbyte_ram)?
            };
            ram_receipts.push(receipt);
        }

        debug!(
            contract = op.contract_id,
            method = %op.method_name,
            cpu_us = cpu_time_us,
            ram_accounts = ram_receipts.len(),
            "contract call settled"
        );
        Ok(OperationResult::Contract(ContractReceipt {
            billed_cpu_time_us: cpu_time_us,
            fee: self.fee_from_account,
            ram_receipts,
        }))
    }

    fn set_fee_from_account(&mut self, fee: Asset) {
        self.fee_from_account = fee;
    }
}

/// Runs a call dispatched by a contract inside the caller's transaction.
#[derive(Default)]
pub struct InterContractCallEvaluator;

impl Evaluator for InterContractCallEvaluator {
    type Op = InterContractCallOperation;

    fn do_evaluate(&mut self, _db: &Database, state: &EvalState<'_>, _op: &Self::Op) -> ExecResult<()> {
        if state.trx_context.is_none() {
            return Err(ExecError::validation(
                "inter-contract call outside of a contract transaction",
            ));
        }
        Ok(())
    }

    fn do_apply(
        &mut self,
        db: &mut Database,
        state: &mut EvalState<'_>,
        op: &Self::Op,
    ) -> ExecResult<OperationResult> {
        let env = state.env;
        let trx = state
            .trx_context
            .as_deref_mut()
            .ok_or_else(|| ExecError::Internal("missing contract transaction context".into()))?;
        let act = Action {
            sender: op.sender_contract,
            contract_id: op.contract_id,
            method_name: op.method_name.clone(),
            data: op.data.clone(),
            amount: op.amount,
        };
        ApplyContext::new(db, trx, env, act).exec()?;
        Ok(OperationResult::Void)
    }
}
