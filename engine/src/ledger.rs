//! Account and balance helpers shared by the evaluators.

use keel_db::{Database, IndexKey, Object};
use keel_primitives::{AccountUid, Amount, Asset, AssetAid, ExecError, ExecResult, ObjectId};

use crate::objects::{
    AccountBalanceObject, AccountObject, AccountStatisticsObject, DynamicGlobalPropertyObject,
};

/// The singleton dynamic global property object.
pub fn dynamic_global_properties(db: &Database) -> ExecResult<&DynamicGlobalPropertyObject> {
    db.get::<DynamicGlobalPropertyObject>(dgp_id())
}

pub(crate) fn dgp_id() -> ObjectId {
    ObjectId::new(
        DynamicGlobalPropertyObject::SPACE_ID,
        DynamicGlobalPropertyObject::TYPE_ID,
        0,
    )
}

pub fn find_account_by_uid(db: &Database, uid: AccountUid) -> ExecResult<Option<&AccountObject>> {
    db.find_by::<AccountObject>("by_uid", &IndexKey::u64(uid))
}

pub fn get_account_by_uid(db: &Database, uid: AccountUid) -> ExecResult<&AccountObject> {
    find_account_by_uid(db, uid)?.ok_or_else(|| ExecError::not_found("account", uid))
}

pub fn find_account_by_name<'a>(db: &'a Database, name: &str) -> ExecResult<Option<&'a AccountObject>> {
    db.find_by::<AccountObject>("by_name", &IndexKey::str(name))
}

pub fn get_account_statistics(db: &Database, owner: AccountUid) -> ExecResult<&AccountStatisticsObject> {
    db.get_by::<AccountStatisticsObject>("by_owner", &IndexKey::u64(owner))
}

pub fn find_balance<'a>(
    db: &'a Database,
    owner: AccountUid,
    asset: AssetAid,
) -> ExecResult<Option<&'a AccountBalanceObject>> {
    db.find_by::<AccountBalanceObject>("by_account_asset", &IndexKey::u64(owner).push_u64(asset))
}

/// Current balance of `owner` in `asset`; zero when no balance object exists.
pub fn get_balance(db: &Database, owner: AccountUid, asset: AssetAid) -> ExecResult<Asset> {
    let amount = find_balance(db, owner, asset)?.map_or(Amount::ZERO, |b| b.balance);
    Ok(Asset::new(amount, asset))
}

/// Add `delta` to `owner`'s balance, creating the balance object on first
/// credit. A resulting negative balance fails with `InsufficientBalance`.
pub fn adjust_balance(db: &mut Database, owner: AccountUid, delta: Asset) -> ExecResult<()> {
    if delta.amount.is_zero() {
        return Ok(());
    }
    let id = find_balance(db, owner, delta.asset_id)?.map(|b| b.id);
    adjust_balance_object(db, owner, id, delta)
}

/// [`adjust_balance`] for a balance object already looked up, as evaluators
/// do during evaluation. `None` means `owner` has no balance in the asset yet.
pub fn adjust_balance_object(
    db: &mut Database,
    owner: AccountUid,
    id: Option<ObjectId>,
    delta: Asset,
) -> ExecResult<()> {
    if delta.amount.is_zero() {
        return Ok(());
    }
    let Some(id) = id else {
        if delta.amount.is_negative() {
            return Err(insufficient(owner, Amount::ZERO, delta.amount));
        }
        db.create::<AccountBalanceObject>(|b| {
            b.owner = owner;
            b.asset_type = delta.asset_id;
            b.balance = delta.amount;
        })?;
        return Ok(());
    };

    let current = db.get::<AccountBalanceObject>(id)?;
    if current.owner != owner || current.asset_type != delta.asset_id {
        return Err(ExecError::Internal(format!("balance object {} does not match {}", id, owner)));
    }
    let current = current.balance;
    let updated = current.checked_add(delta.amount)?;
    if updated.is_negative() {
        return Err(insufficient(owner, current, delta.amount));
    }
    db.modify::<AccountBalanceObject>(id, |b| b.balance = updated)
}

fn insufficient(account: AccountUid, available: Amount, delta: Amount) -> ExecError {
    ExecError::InsufficientBalance {
        account,
        available: available.value(),
        required: delta.value().saturating_neg(),
    }
}

/// Create the account record and its statistics object.
pub(crate) fn create_account_objects(
    db: &mut Database,
    init: impl FnOnce(&mut AccountObject),
) -> ExecResult<ObjectId> {
    let account = db.create::<AccountObject>(init)?;
    let (id, uid) = (account.id, account.uid);
    db.create::<AccountStatisticsObject>(|s| s.owner = uid)?;
    Ok(id)
}
