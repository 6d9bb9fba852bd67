//! Contract table storage.
//!
//! Contracts persist rows in tables addressed by `(code, scope, table)`.
//! A [`TableIdObject`] descriptor is created on the first write and removed
//! with its last row. Every row, descriptor and secondary index entry is
//! billed to a payer through the transaction's RAM ledger:
//!
//! - descriptor: `TABLE_ID_BILLABLE_SIZE`
//! - row: payload length + `KEY_VALUE_BILLABLE_SIZE`
//! - 64-bit secondary index entry: `INDEX64_BILLABLE_SIZE`
//!
//! Only the receiver may write to its own tables. Any contract may read any
//! table.

use std::ops::Bound;

use bytes::Bytes;
use keel_db::IndexKey;
use keel_primitives::{AccountUid, ExecError, ExecResult, ObjectId};

use crate::apply_context::ApplyContext;
use crate::objects::{
    Index64Object, KeyValueObject, TableIdObject, INDEX64_BILLABLE_SIZE, KEY_VALUE_BILLABLE_SIZE,
    TABLE_ID_BILLABLE_SIZE,
};

const KV_INDEX: &str = "by_scope_primary";

fn table_key(code: AccountUid, scope: u64, table: u64) -> IndexKey {
    IndexKey::u64(code).push_u64(scope).push_u64(table)
}

fn row_key(t_id: ObjectId, primary: u64) -> IndexKey {
    IndexKey::u64(t_id.instance).push_u64(primary)
}

fn table_end(t_id: ObjectId) -> IndexKey {
    row_key(t_id, u64::MAX)
}

impl<'a> ApplyContext<'a> {
    // ── Descriptors ──

    pub fn find_table(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
    ) -> ExecResult<Option<&TableIdObject>> {
        self.db
            .find_by::<TableIdObject>("by_code_scope_table", &table_key(code, scope, table))
    }

    fn find_table_id(&self, code: AccountUid, scope: u64, table: u64) -> ExecResult<Option<ObjectId>> {
        Ok(self.find_table(code, scope, table)?.map(|t| t.id))
    }

    fn find_or_create_table(
        &mut self,
        code: AccountUid,
        scope: u64,
        table: u64,
        payer: AccountUid,
    ) -> ExecResult<ObjectId> {
        if let Some(id) = self.find_table_id(code, scope, table)? {
            return Ok(id);
        }
        self.trx.update_ram_statistics(payer, TABLE_ID_BILLABLE_SIZE);
        let t = self.db.create::<TableIdObject>(|t| {
            t.code = code;
            t.scope = scope;
            t.table = table;
            t.payer = payer;
        })?;
        Ok(t.id)
    }

    /// Descriptor of a table the receiver is allowed to modify.
    fn writable_table(&self, code: AccountUid, scope: u64, table: u64) -> ExecResult<TableIdObject> {
        if code != self.receiver() {
            return Err(ExecError::DbAccessViolation(format!(
                "contract {} cannot write to tables of {}",
                self.receiver(),
                code
            )));
        }
        self.find_table(code, scope, table)?
            .cloned()
            .ok_or_else(|| ExecError::not_found("table", format!("{}/{}/{}", code, scope, table)))
    }

    fn adjust_row_count(&mut self, t_id: ObjectId, delta: i32) -> ExecResult<()> {
        let tab = self.db.get::<TableIdObject>(t_id)?;
        let count = tab.count.checked_add_signed(delta).ok_or_else(|| {
            ExecError::Internal(format!("row count of table {} out of range", t_id))
        })?;
        if count == 0 {
            self.trx.update_ram_statistics(tab.payer, -TABLE_ID_BILLABLE_SIZE);
            return self.db.remove::<TableIdObject>(t_id);
        }
        self.db.modify::<TableIdObject>(t_id, |t| t.count = count)
    }

    // ── Primary rows ──

    /// Insert a row into the receiver's `(scope, table)`.
    pub fn store_row(
        &mut self,
        scope: u64,
        table: u64,
        payer: AccountUid,
        key: u64,
        value: impl Into<Bytes>,
    ) -> ExecResult<ObjectId> {
        let payer = self.check_payer_permission(payer)?;
        let value = value.into();
        let code = self.receiver();
        let t_id = self.find_or_create_table(code, scope, table, payer)?;

        let row = self.db.create::<KeyValueObject>(|kv| {
            kv.t_id = t_id;
            kv.primary_key = key;
            kv.payer = payer;
            kv.value = value;
        })?;
        let (id, size) = (row.id, row.billable_size());

        self.trx.update_ram_statistics(payer, size);
        self.adjust_row_count(t_id, 1)?;
        self.checktime()?;
        Ok(id)
    }

    /// Replace a row's payload and payer.
    ///
    /// A new payer takes over the whole row: the old payer is refunded in
    /// full and the new one charged in full. Otherwise only the size
    /// difference is billed.
    pub fn update_row(
        &mut self,
        code: AccountUid,
        scope: u64,
        table: u64,
        key: u64,
        payer: AccountUid,
        value: impl Into<Bytes>,
    ) -> ExecResult<()> {
        let payer = self.check_payer_permission(payer)?;
        let value = value.into();
        let tab = self.writable_table(code, scope, table)?;
        let row = self.db.get_by::<KeyValueObject>(KV_INDEX, &row_key(tab.id, key))?;
        let (id, old_payer, old_size) = (row.id, row.payer, row.billable_size());
        let new_size = value.len() as i64 + KEY_VALUE_BILLABLE_SIZE;

        if old_payer != payer {
            self.trx.update_ram_statistics(old_payer, -old_size);
            self.trx.update_ram_statistics(payer, new_size);
        } else if old_size != new_size {
            self.trx.update_ram_statistics(payer, new_size - old_size);
        }

        self.db.modify::<KeyValueObject>(id, |kv| {
            kv.value = value;
            kv.payer = payer;
        })?;
        self.checktime()
    }

    /// Delete a row, refunding its payer. The table goes with its last row.
    pub fn remove_row(&mut self, code: AccountUid, scope: u64, table: u64, key: u64) -> ExecResult<()> {
        let tab = self.writable_table(code, scope, table)?;
        let row = self.db.get_by::<KeyValueObject>(KV_INDEX, &row_key(tab.id, key))?;
        let (id, payer, size) = (row.id, row.payer, row.billable_size());

        self.trx.update_ram_statistics(payer, -size);
        self.db.remove::<KeyValueObject>(id)?;
        self.adjust_row_count(tab.id, -1)?;
        self.checktime()
    }

    pub fn get_row(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        key: u64,
    ) -> ExecResult<Option<KeyValueObject>> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        Ok(self
            .db
            .find_by::<KeyValueObject>(KV_INDEX, &row_key(t_id, key))?
            .cloned())
    }

    /// First row with primary key `>= key`.
    pub fn lower_bound_row(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        key: u64,
    ) -> ExecResult<Option<KeyValueObject>> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        let mut rows = self
            .db
            .range_by::<KeyValueObject, _>(KV_INDEX, row_key(t_id, key)..=table_end(t_id))?;
        Ok(rows.next().cloned())
    }

    /// First row with primary key `> key`.
    pub fn upper_bound_row(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        key: u64,
    ) -> ExecResult<Option<KeyValueObject>> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        self.row_after(t_id, key)
    }

    fn row_after(&self, t_id: ObjectId, key: u64) -> ExecResult<Option<KeyValueObject>> {
        let range = (
            Bound::Excluded(row_key(t_id, key)),
            Bound::Included(table_end(t_id)),
        );
        let mut rows = self.db.range_by::<KeyValueObject, _>(KV_INDEX, range)?;
        Ok(rows.next().cloned())
    }

    fn row_before(&self, t_id: ObjectId, key: u64) -> ExecResult<Option<KeyValueObject>> {
        let range = IndexKey::u64(t_id.instance)..row_key(t_id, key);
        let mut rows = self.db.range_by::<KeyValueObject, _>(KV_INDEX, range)?;
        Ok(rows.next_back().cloned())
    }

    /// Row following `row` in its table.
    pub fn next_row(&mut self, row: &KeyValueObject) -> ExecResult<Option<KeyValueObject>> {
        self.checktime()?;
        self.row_after(row.t_id, row.primary_key)
    }

    /// Row preceding `row` in its table.
    pub fn previous_row(&mut self, row: &KeyValueObject) -> ExecResult<Option<KeyValueObject>> {
        self.checktime()?;
        self.row_before(row.t_id, row.primary_key)
    }

    /// Row with the highest primary key.
    pub fn last_row(
        &mut self,
        code: AccountUid,
        scope: u64,
        table: u64,
    ) -> ExecResult<Option<KeyValueObject>> {
        self.checktime()?;
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        let mut rows = self
            .db
            .range_by::<KeyValueObject, _>(KV_INDEX, IndexKey::u64(t_id.instance)..=table_end(t_id))?;
        Ok(rows.next_back().cloned())
    }

    /// Visit the rows of a table in primary key order, billing each step.
    /// Stops at the first error from `f` or from the CPU deadline.
    pub fn scan_rows(
        &mut self,
        code: AccountUid,
        scope: u64,
        table: u64,
        mut f: impl FnMut(&KeyValueObject) -> ExecResult<()>,
    ) -> ExecResult<()> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(());
        };
        let db = &*self.db;
        let trx = &mut *self.trx;
        for row in db.range_by::<KeyValueObject, _>(KV_INDEX, IndexKey::u64(t_id.instance)..=table_end(t_id))? {
            trx.checktime()?;
            f(row)?;
        }
        Ok(())
    }

    /// All rows of a table in primary key order.
    pub fn rows(&mut self, code: AccountUid, scope: u64, table: u64) -> ExecResult<Vec<KeyValueObject>> {
        let mut rows = Vec::new();
        self.scan_rows(code, scope, table, |row| {
            rows.push(row.clone());
            Ok(())
        })?;
        Ok(rows)
    }

    // ── 64-bit secondary index ──

    pub fn idx64_store(
        &mut self,
        scope: u64,
        table: u64,
        payer: AccountUid,
        primary: u64,
        secondary: u64,
    ) -> ExecResult<ObjectId> {
        let payer = self.check_payer_permission(payer)?;
        let code = self.receiver();
        let t_id = self.find_or_create_table(code, scope, table, payer)?;

        let id = self
            .db
            .create::<Index64Object>(|i| {
                i.t_id = t_id;
                i.primary_key = primary;
                i.payer = payer;
                i.secondary_key = secondary;
            })?
            .id;

        self.trx.update_ram_statistics(payer, INDEX64_BILLABLE_SIZE);
        self.adjust_row_count(t_id, 1)?;
        self.checktime()?;
        Ok(id)
    }

    pub fn idx64_update(
        &mut self,
        code: AccountUid,
        scope: u64,
        table: u64,
        primary: u64,
        payer: AccountUid,
        secondary: u64,
    ) -> ExecResult<()> {
        let payer = self.check_payer_permission(payer)?;
        let tab = self.writable_table(code, scope, table)?;
        let entry = self.db.get_by::<Index64Object>("by_primary", &row_key(tab.id, primary))?;
        let (id, old_payer) = (entry.id, entry.payer);

        if old_payer != payer {
            self.trx.update_ram_statistics(old_payer, -INDEX64_BILLABLE_SIZE);
            self.trx.update_ram_statistics(payer, INDEX64_BILLABLE_SIZE);
        }
        self.db.modify::<Index64Object>(id, |i| {
            i.secondary_key = secondary;
            i.payer = payer;
        })?;
        self.checktime()
    }

    pub fn idx64_remove(&mut self, code: AccountUid, scope: u64, table: u64, primary: u64) -> ExecResult<()> {
        let tab = self.writable_table(code, scope, table)?;
        let entry = self.db.get_by::<Index64Object>("by_primary", &row_key(tab.id, primary))?;
        let (id, payer) = (entry.id, entry.payer);

        self.trx.update_ram_statistics(payer, -INDEX64_BILLABLE_SIZE);
        self.db.remove::<Index64Object>(id)?;
        self.adjust_row_count(tab.id, -1)?;
        self.checktime()
    }

    pub fn idx64_find_primary(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        primary: u64,
    ) -> ExecResult<Option<Index64Object>> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        Ok(self
            .db
            .find_by::<Index64Object>("by_primary", &row_key(t_id, primary))?
            .cloned())
    }

    /// Entry with the given secondary key and the lowest primary key.
    pub fn idx64_find_secondary(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        secondary: u64,
    ) -> ExecResult<Option<Index64Object>> {
        Ok(self
            .idx64_lower_bound(code, scope, table, secondary)?
            .filter(|i| i.secondary_key == secondary))
    }

    /// First entry with secondary key `>= secondary`.
    pub fn idx64_lower_bound(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        secondary: u64,
    ) -> ExecResult<Option<Index64Object>> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        let from = row_key(t_id, secondary);
        let to = table_end(t_id).push_u64(u64::MAX);
        let mut entries = self.db.range_by::<Index64Object, _>("by_secondary", from..=to)?;
        Ok(entries.next().cloned())
    }

    /// First entry with secondary key `> secondary`.
    pub fn idx64_upper_bound(
        &self,
        code: AccountUid,
        scope: u64,
        table: u64,
        secondary: u64,
    ) -> ExecResult<Option<Index64Object>> {
        let Some(t_id) = self.find_table_id(code, scope, table)? else {
            return Ok(None);
        };
        let range = (
            Bound::Excluded(row_key(t_id, secondary).push_u64(u64::MAX)),
            Bound::Included(table_end(t_id).push_u64(u64::MAX)),
        );
        let mut entries = self.db.range_by::<Index64Object, _>("by_secondary", range)?;
        Ok(entries.next().cloned())
    }
}
