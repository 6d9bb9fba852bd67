//! Operation definitions.
//!
//! [`Operation`] is a closed sum type: adding a kind means adding a variant,
//! and every `match` over it (fee payer, validation, fees, authorities, the
//! engine's evaluator dispatch) has to be extended or the build fails.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Asset};
use crate::crypto::is_valid_account_uid;
use crate::error::{ExecError, ExecResult};
use crate::fee::{calculate_data_fee, FeeSchedule};
use crate::types::{AccountUid, Hash, MAX_MEMO_SIZE, MAX_NAME_LENGTH};

// ── Contract interface description ──

/// One callable action exported by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    /// Whether the action accepts an attached amount.
    pub payable: bool,
}

/// The contract's exported interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abi {
    pub actions: Vec<ActionDef>,
}

impl Abi {
    pub fn find_action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Byte size used for data fees: each name plus a length byte and a flag byte.
    pub fn packed_size(&self) -> usize {
        self.actions.iter().map(|a| a.name.len() + 2).sum()
    }
}

// ── Required authorities ──

/// Signatures an operation needs: accounts by authority level, plus `other`
/// authorities that belong to no account and are named by key id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredAuthorities {
    pub owner: BTreeSet<AccountUid>,
    pub active: BTreeSet<AccountUid>,
    pub secondary: BTreeSet<AccountUid>,
    pub other: BTreeSet<Hash>,
}

impl RequiredAuthorities {
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
            && self.active.is_empty()
            && self.secondary.is_empty()
            && self.other.is_empty()
    }

    /// Every account named at any level, deduplicated and ordered. Does not
    /// include `other`.
    pub fn accounts(&self) -> BTreeSet<AccountUid> {
        self.owner
            .iter()
            .chain(self.active.iter())
            .chain(self.secondary.iter())
            .copied()
            .collect()
    }

    fn active_of(uid: AccountUid) -> Self {
        let mut r = Self::default();
        r.active.insert(uid);
        r
    }

    fn secondary_of(uid: AccountUid) -> Self {
        let mut r = Self::default();
        r.secondary.insert(uid);
        r
    }
}

// ── Operation payloads ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    pub fee: Asset,
    /// Uid of the new account.
    pub uid: AccountUid,
    pub name: String,
    /// Existing account that registers, and pays for, the new one.
    pub registrar: AccountUid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub fee: Asset,
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Asset,
    pub memo: Option<String>,
}

/// Sets the amount of core balance locked for fee points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLockUpdateOperation {
    pub fee: Asset,
    pub account: AccountUid,
    pub new_lock_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDeployOperation {
    pub fee: Asset,
    /// Registrar of the contract account; pays the deployment fee.
    pub owner: AccountUid,
    pub contract_id: AccountUid,
    pub name: String,
    pub vm_type: String,
    pub vm_version: String,
    pub code: Bytes,
    pub abi: Abi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallOperation {
    pub fee: Asset,
    pub account: AccountUid,
    pub contract_id: AccountUid,
    /// Amount moved from `account` to the contract before the action runs.
    pub amount: Option<Asset>,
    pub method_name: String,
    pub data: Bytes,
}

/// Call from one contract into another, created while a contract runs.
///
/// Never accepted in a signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterContractCallOperation {
    pub fee: Asset,
    pub sender_contract: AccountUid,
    pub contract_id: AccountUid,
    pub amount: Option<Asset>,
    pub method_name: String,
    pub data: Bytes,
}

/// Every state transition the engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    AccountCreate(AccountCreateOperation),
    Transfer(TransferOperation),
    BalanceLockUpdate(BalanceLockUpdateOperation),
    ContractDeploy(ContractDeployOperation),
    ContractCall(ContractCallOperation),
    InterContractCall(InterContractCallOperation),
}

impl Operation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountCreate(_) => "account_create",
            Self::Transfer(_) => "transfer",
            Self::BalanceLockUpdate(_) => "balance_lock_update",
            Self::ContractDeploy(_) => "contract_deploy",
            Self::ContractCall(_) => "contract_call",
            Self::InterContractCall(_) => "inter_contract_call",
        }
    }

    /// The fee declared by the submitter.
    pub fn fee(&self) -> Asset {
        match self {
            Self::AccountCreate(op) => op.fee,
            Self::Transfer(op) => op.fee,
            Self::BalanceLockUpdate(op) => op.fee,
            Self::ContractDeploy(op) => op.fee,
            Self::ContractCall(op) => op.fee,
            Self::InterContractCall(op) => op.fee,
        }
    }

    /// The account charged the operation's fee.
    pub fn fee_payer_uid(&self) -> AccountUid {
        match self {
            Self::AccountCreate(op) => op.registrar,
            Self::Transfer(op) => op.from,
            Self::BalanceLockUpdate(op) => op.account,
            Self::ContractDeploy(op) => op.owner,
            Self::ContractCall(op) => op.account,
            Self::InterContractCall(op) => op.sender_contract,
        }
    }

    /// Stateless format checks.
    pub fn validate(&self) -> ExecResult<()> {
        match self {
            Self::AccountCreate(op) => {
                validate_op_fee(&op.fee, "account_create")?;
                validate_account_uid(op.uid, "new account")?;
                validate_account_uid(op.registrar, "registrar")?;
                validate_account_name(&op.name)
            }
            Self::Transfer(op) => {
                validate_op_fee(&op.fee, "transfer")?;
                validate_account_uid(op.from, "from")?;
                validate_account_uid(op.to, "to")?;
                if op.from == op.to {
                    return Err(ExecError::validation("cannot transfer to self"));
                }
                if !op.amount.amount.is_positive() {
                    return Err(ExecError::validation("transfer amount must be positive"));
                }
                if let Some(memo) = &op.memo {
                    if memo.len() > MAX_MEMO_SIZE {
                        return Err(ExecError::validation(format!(
                            "memo too large: {} > {}",
                            memo.len(),
                            MAX_MEMO_SIZE
                        )));
                    }
                }
                Ok(())
            }
            Self::BalanceLockUpdate(op) => {
                validate_op_fee(&op.fee, "balance_lock_update")?;
                validate_account_uid(op.account, "account")?;
                if op.new_lock_balance.is_negative() {
                    return Err(ExecError::validation("lock balance cannot be negative"));
                }
                Ok(())
            }
            Self::ContractDeploy(op) => {
                validate_op_fee(&op.fee, "contract_deploy")?;
                validate_account_uid(op.owner, "owner")?;
                validate_account_uid(op.contract_id, "contract_id")?;
                validate_account_name(&op.name)?;
                if op.code.is_empty() {
                    return Err(ExecError::validation("contract code cannot be empty"));
                }
                if op.abi.actions.is_empty() {
                    return Err(ExecError::validation("contract has no actions"));
                }
                Ok(())
            }
            Self::ContractCall(op) => {
                validate_op_fee(&op.fee, "contract_call")?;
                validate_account_uid(op.account, "account")?;
                validate_account_uid(op.contract_id, "contract_id")?;
                if let Some(amount) = &op.amount {
                    if !amount.amount.is_positive() {
                        return Err(ExecError::validation("amount must > 0"));
                    }
                }
                Ok(())
            }
            Self::InterContractCall(_) => Err(ExecError::validation("virtual operation")),
        }
    }

    /// Minimum fee required by `schedule`, in core asset units.
    pub fn calculate_fee(&self, schedule: &FeeSchedule) -> ExecResult<Amount> {
        let required = match self {
            Self::AccountCreate(op) => {
                let k = &schedule.account_create;
                let data = calculate_data_fee(op.name.len() as u64, k.price_per_kbyte)?;
                k.basic_fee.checked_add(data)
            }
            Self::Transfer(op) => {
                let k = &schedule.transfer;
                let memo_len = op.memo.as_ref().map_or(0, |m| m.len()) as u64;
                let data = calculate_data_fee(memo_len, k.price_per_kbyte)?;
                k.fee.checked_add(data)
            }
            Self::BalanceLockUpdate(_) => Some(schedule.balance_lock_update.fee),
            Self::ContractDeploy(op) => {
                let k = &schedule.contract_deploy;
                let size = op.vm_type.len() + op.vm_version.len() + op.code.len() + op.abi.packed_size();
                let data = calculate_data_fee(size as u64, k.price_per_kbyte)?;
                k.fee.checked_add(data)
            }
            // the real contract fee is settled after the code runs
            Self::ContractCall(_) => Some(schedule.contract_call.fee),
            Self::InterContractCall(_) => Some(schedule.inter_contract_call.fee),
        };
        let required = required
            .ok_or_else(|| ExecError::Overflow(format!("{} fee overflows", self.name())))?;
        Amount::from_u64(required)
    }

    /// Authorities that must approve the operation.
    ///
    /// `enabled_hardfork` relaxes a contract call without attached amount to
    /// the caller's secondary authority.
    pub fn required_authorities(&self, enabled_hardfork: bool) -> RequiredAuthorities {
        match self {
            Self::AccountCreate(op) => RequiredAuthorities::active_of(op.registrar),
            Self::Transfer(op) => RequiredAuthorities::active_of(op.from),
            Self::BalanceLockUpdate(op) => RequiredAuthorities::active_of(op.account),
            Self::ContractDeploy(op) => RequiredAuthorities::active_of(op.owner),
            Self::ContractCall(op) => {
                if enabled_hardfork && op.amount.is_none() {
                    RequiredAuthorities::secondary_of(op.account)
                } else {
                    RequiredAuthorities::active_of(op.account)
                }
            }
            // authorized by the running contract, not by signatures
            Self::InterContractCall(_) => RequiredAuthorities::default(),
        }
    }
}

// ── Validation helpers ──

pub fn validate_account_uid(uid: AccountUid, what: &str) -> ExecResult<()> {
    if !is_valid_account_uid(uid) {
        return Err(ExecError::validation(format!(
            "{} account uid {} is not valid",
            what, uid
        )));
    }
    Ok(())
}

/// Fees are paid in the core asset and never negative.
pub fn validate_op_fee(fee: &Asset, op_name: &str) -> ExecResult<()> {
    if !fee.is_core() {
        return Err(ExecError::validation(format!(
            "{} fee must be paid in the core asset",
            op_name
        )));
    }
    if fee.amount.is_negative() {
        return Err(ExecError::validation(format!("{} fee cannot be negative", op_name)));
    }
    Ok(())
}

/// Lowercase letters, digits, `-` and `.`, starting with a letter.
pub fn validate_account_name(name: &str) -> ExecResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if !valid {
        return Err(ExecError::validation(format!("invalid account name `{}`", name)));
    }
    Ok(())
}
