//! The object store: a set of typed tables sharing undo sessions.

use std::any::Any;
use std::collections::BTreeMap;
use std::ops::RangeBounds;

use keel_primitives::{ExecError, ExecResult, Hash, ObjectId};
use tracing::{debug, trace};

use crate::object::{IndexKey, Object};
use crate::table::Table;

/// Type-erased view of a [`Table`] used for whole-store operations.
trait AnyTable: Any {
    fn start_undo_session(&mut self);
    fn undo(&mut self);
    fn squash(&mut self);
    fn commit(&mut self);
    fn digest_into(&self, hasher: &mut blake3::Hasher) -> ExecResult<()>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Object> AnyTable for Table<T> {
    fn start_undo_session(&mut self) {
        Table::start_undo_session(self)
    }

    fn undo(&mut self) {
        Table::undo(self)
    }

    fn squash(&mut self) {
        Table::squash(self)
    }

    fn commit(&mut self) {
        Table::commit(self)
    }

    fn digest_into(&self, hasher: &mut blake3::Hasher) -> ExecResult<()> {
        Table::digest_into(self, hasher)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Versioned, multi-indexed store of every persisted object.
///
/// Tables are keyed by `(space, type_id)` and must be registered with
/// [`Database::add_table`] before use. Undo sessions span all tables: a
/// session started here is started on every table, including tables
/// registered later.
#[derive(Default)]
pub struct Database {
    tables: BTreeMap<(u8, u8), Box<dyn AnyTable>>,
    undo_depth: usize,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the table for `T`.
    pub fn add_table<T: Object>(&mut self) -> ExecResult<()> {
        let key = (T::SPACE_ID, T::TYPE_ID);
        if self.tables.contains_key(&key) {
            return Err(ExecError::Internal(format!(
                "table {}.{} ({}) registered twice",
                key.0,
                key.1,
                T::TYPE_NAME
            )));
        }
        let mut table = Table::<T>::new();
        for _ in 0..self.undo_depth {
            table.start_undo_session();
        }
        debug!(table = T::TYPE_NAME, space = key.0, type_id = key.1, "registered table");
        self.tables.insert(key, Box::new(table));
        Ok(())
    }

    pub fn has_table<T: Object>(&self) -> bool {
        self.tables.contains_key(&(T::SPACE_ID, T::TYPE_ID))
    }

    pub fn table<T: Object>(&self) -> ExecResult<&Table<T>> {
        self.tables
            .get(&(T::SPACE_ID, T::TYPE_ID))
            .and_then(|t| t.as_any().downcast_ref::<Table<T>>())
            .ok_or_else(|| unregistered::<T>())
    }

    pub fn table_mut<T: Object>(&mut self) -> ExecResult<&mut Table<T>> {
        self.tables
            .get_mut(&(T::SPACE_ID, T::TYPE_ID))
            .and_then(|t| t.as_any_mut().downcast_mut::<Table<T>>())
            .ok_or_else(|| unregistered::<T>())
    }

    // ── Mutation ──

    pub fn create<T: Object>(&mut self, init: impl FnOnce(&mut T)) -> ExecResult<&T> {
        self.table_mut::<T>()?.create(init)
    }

    pub fn modify<T: Object>(&mut self, id: ObjectId, mutate: impl FnOnce(&mut T)) -> ExecResult<()> {
        check_id::<T>(id)?;
        self.table_mut::<T>()?.modify(id.instance, mutate)
    }

    pub fn remove<T: Object>(&mut self, id: ObjectId) -> ExecResult<()> {
        check_id::<T>(id)?;
        self.table_mut::<T>()?.remove(id.instance)
    }

    // ── Queries ──

    /// Look up by id. Unregistered tables and ids of another type yield `None`.
    pub fn find<T: Object>(&self, id: ObjectId) -> Option<&T> {
        if id.table() != (T::SPACE_ID, T::TYPE_ID) {
            return None;
        }
        self.table::<T>().ok()?.find(id.instance)
    }

    pub fn get<T: Object>(&self, id: ObjectId) -> ExecResult<&T> {
        check_id::<T>(id)?;
        self.table::<T>()?.get(id.instance)
    }

    pub fn find_by<T: Object>(&self, index: &str, key: &IndexKey) -> ExecResult<Option<&T>> {
        self.table::<T>()?.find_by(index, key)
    }

    pub fn get_by<T: Object>(&self, index: &str, key: &IndexKey) -> ExecResult<&T> {
        self.find_by::<T>(index, key)?
            .ok_or_else(|| ExecError::not_found(T::TYPE_NAME, format!("{}={:?}", index, key.0)))
    }

    pub fn range_by<T: Object, R: RangeBounds<IndexKey>>(
        &self,
        index: &str,
        range: R,
    ) -> ExecResult<impl DoubleEndedIterator<Item = &T>> {
        self.table::<T>()?.range_by(index, range)
    }

    pub fn lower_bound<T: Object>(&self, index: &str, key: &IndexKey) -> ExecResult<Option<&T>> {
        self.table::<T>()?.lower_bound(index, key)
    }

    pub fn upper_bound<T: Object>(&self, index: &str, key: &IndexKey) -> ExecResult<Option<&T>> {
        self.table::<T>()?.upper_bound(index, key)
    }

    pub fn iter<T: Object>(&self) -> ExecResult<impl DoubleEndedIterator<Item = &T>> {
        Ok(self.table::<T>()?.iter())
    }

    /// Number of live records of type `T`.
    pub fn count<T: Object>(&self) -> ExecResult<usize> {
        Ok(self.table::<T>()?.len())
    }

    // ── Undo sessions ──

    /// Open a nested undo session on every table. Returns the new depth.
    pub fn start_undo_session(&mut self) -> usize {
        for table in self.tables.values_mut() {
            table.start_undo_session();
        }
        self.undo_depth += 1;
        trace!(depth = self.undo_depth, "undo session started");
        self.undo_depth
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_depth
    }

    /// Revert all changes made since the innermost session started and close it.
    pub fn undo(&mut self) -> ExecResult<()> {
        self.require_session("undo")?;
        for table in self.tables.values_mut() {
            table.undo();
        }
        self.undo_depth -= 1;
        trace!(depth = self.undo_depth, "undo session reverted");
        Ok(())
    }

    /// Merge the innermost session into its parent.
    pub fn squash(&mut self) -> ExecResult<()> {
        self.require_session("squash")?;
        for table in self.tables.values_mut() {
            table.squash();
        }
        self.undo_depth -= 1;
        trace!(depth = self.undo_depth, "undo session squashed");
        Ok(())
    }

    /// Make everything permanent and drop all sessions.
    pub fn commit(&mut self) {
        for table in self.tables.values_mut() {
            table.commit();
        }
        self.undo_depth = 0;
    }

    fn require_session(&self, what: &str) -> ExecResult<()> {
        if self.undo_depth == 0 {
            return Err(ExecError::Internal(format!("{} without an open undo session", what)));
        }
        Ok(())
    }

    // ── Digest ──

    /// BLAKE3 digest of every record and index membership.
    ///
    /// Allocation counters are not part of the digest, so undoing a create
    /// restores the digest exactly even though the instance stays consumed.
    pub fn state_digest(&self) -> ExecResult<Hash> {
        let mut hasher = blake3::Hasher::new();
        for table in self.tables.values() {
            table.digest_into(&mut hasher)?;
        }
        Ok(*hasher.finalize().as_bytes())
    }
}

fn unregistered<T: Object>() -> ExecError {
    ExecError::Internal(format!(
        "table {}.{} ({}) is not registered",
        T::SPACE_ID,
        T::TYPE_ID,
        T::TYPE_NAME
    ))
}

fn check_id<T: Object>(id: ObjectId) -> ExecResult<()> {
    if id.table() != (T::SPACE_ID, T::TYPE_ID) {
        return Err(ExecError::Internal(format!(
            "object id {} does not belong to {}",
            id,
            T::TYPE_NAME
        )));
    }
    Ok(())
}
