//! Chain state objects and their indices.
//!
//! Protocol-space objects are created by user operations (accounts and
//! contracts). Implementation-space objects are bookkeeping the engine
//! maintains on the side: balances, statistics, global properties and
//! contract tables.

use bytes::Bytes;
use keel_db::{Database, IndexKey, IndexSpec, Object};
use keel_primitives::{
    Abi, AccountUid, Amount, AssetAid, ExecResult, Hash, ObjectId, Timestamp,
    IMPLEMENTATION_SPACE, PROTOCOL_SPACE,
};
use serde::Serialize;

/// Fixed bytes billed for every contract table descriptor.
pub const TABLE_ID_BILLABLE_SIZE: i64 = 112;
/// Fixed bytes billed for every key/value row on top of its payload.
pub const KEY_VALUE_BILLABLE_SIZE: i64 = 112;
/// Bytes billed for every 64-bit secondary index row.
pub const INDEX64_BILLABLE_SIZE: i64 = 128;

macro_rules! impl_object {
    ($ty:ty, $space:expr, $type_id:expr, $name:literal) => {
        impl_object!($ty, $space, $type_id, $name, Vec::new());
    };
    ($ty:ty, $space:expr, $type_id:expr, $name:literal, $indices:expr) => {
        impl Object for $ty {
            const SPACE_ID: u8 = $space;
            const TYPE_ID: u8 = $type_id;
            const TYPE_NAME: &'static str = $name;

            fn id(&self) -> ObjectId {
                self.id
            }

            fn set_id(&mut self, id: ObjectId) {
                self.id = id;
            }

            fn indices() -> Vec<IndexSpec<Self>> {
                $indices
            }
        }
    };
}

// ── Protocol space ──

/// A registered account. Accounts with code are contracts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountObject {
    pub id: ObjectId,
    pub uid: AccountUid,
    pub name: String,
    pub registrar: AccountUid,
    pub create_time: Timestamp,
    pub code: Bytes,
    pub code_version: Hash,
    pub abi: Abi,
    pub vm_type: String,
    pub vm_version: String,
}

impl AccountObject {
    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }
}

impl_object!(
    AccountObject,
    PROTOCOL_SPACE,
    2,
    "account",
    vec![
        IndexSpec::unique("by_uid", |a: &AccountObject| IndexKey::u64(a.uid)),
        IndexSpec::unique("by_name", |a: &AccountObject| IndexKey::str(&a.name)),
    ]
);

// ── Implementation space ──

#[derive(Debug, Clone, Default, Serialize)]
pub struct DynamicGlobalPropertyObject {
    pub id: ObjectId,
    pub head_block_time: Timestamp,
    /// Operation fees collected and not yet distributed.
    pub accumulated_fees: Amount,
}

impl_object!(
    DynamicGlobalPropertyObject,
    IMPLEMENTATION_SPACE,
    1,
    "dynamic_global_property"
);

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountBalanceObject {
    pub id: ObjectId,
    pub owner: AccountUid,
    pub asset_type: AssetAid,
    pub balance: Amount,
}

impl_object!(
    AccountBalanceObject,
    IMPLEMENTATION_SPACE,
    5,
    "account_balance",
    vec![IndexSpec::unique("by_account_asset", |b: &AccountBalanceObject| {
        IndexKey::u64(b.owner).push_u64(b.asset_type)
    })]
);

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountStatisticsObject {
    pub id: ObjectId,
    pub owner: AccountUid,
    pub locked_balance_for_feepoint: Amount,
    pub last_lock_update_time: Timestamp,
    pub total_fees_paid: Amount,
}

impl_object!(
    AccountStatisticsObject,
    IMPLEMENTATION_SPACE,
    6,
    "account_statistics",
    vec![IndexSpec::unique("by_owner", |s: &AccountStatisticsObject| {
        IndexKey::u64(s.owner)
    })]
);

/// Descriptor of one contract table, identified by `(code, scope, table)`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableIdObject {
    pub id: ObjectId,
    /// Contract that owns the table.
    pub code: AccountUid,
    pub scope: u64,
    pub table: u64,
    /// Account billed for the descriptor.
    pub payer: AccountUid,
    /// Live rows attached to this descriptor.
    pub count: u32,
}

impl_object!(
    TableIdObject,
    IMPLEMENTATION_SPACE,
    20,
    "table_id",
    vec![IndexSpec::unique("by_code_scope_table", |t: &TableIdObject| {
        IndexKey::u64(t.code).push_u64(t.scope).push_u64(t.table)
    })]
);

/// One contract row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyValueObject {
    pub id: ObjectId,
    pub t_id: ObjectId,
    pub primary_key: u64,
    pub payer: AccountUid,
    pub value: Bytes,
}

impl KeyValueObject {
    /// Bytes billed to the payer for this row.
    pub fn billable_size(&self) -> i64 {
        self.value.len() as i64 + KEY_VALUE_BILLABLE_SIZE
    }
}

impl_object!(
    KeyValueObject,
    IMPLEMENTATION_SPACE,
    21,
    "key_value",
    vec![IndexSpec::unique("by_scope_primary", |kv: &KeyValueObject| {
        IndexKey::u64(kv.t_id.instance).push_u64(kv.primary_key)
    })]
);

/// Secondary index row mapping a primary key to a 64-bit secondary key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Index64Object {
    pub id: ObjectId,
    pub t_id: ObjectId,
    pub primary_key: u64,
    pub payer: AccountUid,
    pub secondary_key: u64,
}

impl_object!(
    Index64Object,
    IMPLEMENTATION_SPACE,
    22,
    "index64",
    vec![
        IndexSpec::unique("by_primary", |i: &Index64Object| {
            IndexKey::u64(i.t_id.instance).push_u64(i.primary_key)
        }),
        IndexSpec::unique("by_secondary", |i: &Index64Object| {
            IndexKey::u64(i.t_id.instance)
                .push_u64(i.secondary_key)
                .push_u64(i.primary_key)
        }),
    ]
);

/// Register every chain table on `db`.
pub fn register_tables(db: &mut Database) -> ExecResult<()> {
    db.add_table::<AccountObject>()?;
    db.add_table::<DynamicGlobalPropertyObject>()?;
    db.add_table::<AccountBalanceObject>()?;
    db.add_table::<AccountStatisticsObject>()?;
    db.add_table::<TableIdObject>()?;
    db.add_table::<KeyValueObject>()?;
    db.add_table::<Index64Object>()?;
    Ok(())
}
