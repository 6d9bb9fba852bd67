//! A single typed table: records addressed by instance number, secondary
//! indices as ordered sets, and a stack of undo states.
//!
//! Undo states follow the classic three-set layout. Each session remembers
//! - `new_ids`: instances created inside the session,
//! - `old_values`: the pre-session value of instances modified inside it,
//! - `removed`: the pre-session value of instances removed inside it.
//!
//! Replaying a state restores records and index membership exactly. Instance
//! numbers are never handed back, so an undone create leaves a gap.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Bound, RangeBounds};

use keel_primitives::{ExecError, ExecResult, ObjectId};

use crate::object::{IndexKey, IndexSpec, Object};

struct UndoState<T> {
    old_values: BTreeMap<u64, T>,
    new_ids: BTreeSet<u64>,
    removed: BTreeMap<u64, T>,
}

impl<T> Default for UndoState<T> {
    fn default() -> Self {
        Self {
            old_values: BTreeMap::new(),
            new_ids: BTreeSet::new(),
            removed: BTreeMap::new(),
        }
    }
}

/// Typed table of `T` records.
pub struct Table<T: Object> {
    next_instance: u64,
    records: BTreeMap<u64, T>,
    specs: Vec<IndexSpec<T>>,
    /// One ordered set of `(key, instance)` per entry in `specs`.
    indices: Vec<BTreeSet<(IndexKey, u64)>>,
    sessions: Vec<UndoState<T>>,
}

impl<T: Object> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Table<T> {
    pub fn new() -> Self {
        let specs = T::indices();
        let indices = specs.iter().map(|_| BTreeSet::new()).collect();
        Self {
            next_instance: 0,
            records: BTreeMap::new(),
            specs,
            indices,
            sessions: Vec::new(),
        }
    }

    fn object_id(instance: u64) -> ObjectId {
        ObjectId::new(T::SPACE_ID, T::TYPE_ID, instance)
    }

    fn not_found(instance: u64) -> ExecError {
        ExecError::not_found(T::TYPE_NAME, Self::object_id(instance))
    }

    // ── Index maintenance ──

    fn check_unique(&self, obj: &T, instance: u64) -> ExecResult<()> {
        for (spec, index) in self.specs.iter().zip(&self.indices) {
            if !spec.unique {
                continue;
            }
            let key = (spec.extract)(obj);
            let clash = index
                .range((key.clone(), 0)..=(key, u64::MAX))
                .any(|(_, id)| *id != instance);
            if clash {
                return Err(ExecError::UniqueViolation {
                    type_name: T::TYPE_NAME,
                    index: spec.name,
                });
            }
        }
        Ok(())
    }

    fn insert_indices(&mut self, obj: &T, instance: u64) {
        for (spec, index) in self.specs.iter().zip(self.indices.iter_mut()) {
            index.insert(((spec.extract)(obj), instance));
        }
    }

    fn remove_indices(&mut self, obj: &T, instance: u64) {
        for (spec, index) in self.specs.iter().zip(self.indices.iter_mut()) {
            index.remove(&((spec.extract)(obj), instance));
        }
    }

    fn index_pos(&self, name: &str) -> ExecResult<usize> {
        self.specs.iter().position(|s| s.name == name).ok_or_else(|| {
            ExecError::Internal(format!("unknown index `{}` on {}", name, T::TYPE_NAME))
        })
    }

    // ── Mutation ──

    /// Allocate the next instance, initialize a default record and insert it.
    ///
    /// On a unique violation nothing is inserted, but the instance number
    /// stays consumed.
    pub fn create(&mut self, init: impl FnOnce(&mut T)) -> ExecResult<&T> {
        let instance = self.next_instance;
        self.next_instance += 1;
        let id = Self::object_id(instance);

        let mut obj = T::default();
        obj.set_id(id);
        init(&mut obj);
        assert_eq!(obj.id(), id, "{} initializer changed the object id", T::TYPE_NAME);

        self.check_unique(&obj, instance)?;
        self.insert_indices(&obj, instance);
        if let Some(state) = self.sessions.last_mut() {
            state.new_ids.insert(instance);
        }
        let stored: &T = self.records.entry(instance).or_insert(obj);
        Ok(stored)
    }

    /// Apply `mutate` to a record, re-indexing it afterwards.
    ///
    /// # Panics
    ///
    /// If the mutator changes the object id.
    pub fn modify(&mut self, instance: u64, mutate: impl FnOnce(&mut T)) -> ExecResult<()> {
        let old = self
            .records
            .get(&instance)
            .cloned()
            .ok_or_else(|| Self::not_found(instance))?;
        self.remove_indices(&old, instance);

        let mut new = old.clone();
        mutate(&mut new);
        assert_eq!(new.id(), old.id(), "{} mutator changed the object id", T::TYPE_NAME);

        if let Err(err) = self.check_unique(&new, instance) {
            self.insert_indices(&old, instance);
            return Err(err);
        }
        self.insert_indices(&new, instance);
        self.records.insert(instance, new);
        self.on_modify(instance, old);
        Ok(())
    }

    pub fn remove(&mut self, instance: u64) -> ExecResult<()> {
        let old = self
            .records
            .remove(&instance)
            .ok_or_else(|| Self::not_found(instance))?;
        self.remove_indices(&old, instance);
        self.on_remove(instance, old);
        Ok(())
    }

    fn on_modify(&mut self, instance: u64, old: T) {
        let Some(state) = self.sessions.last_mut() else {
            return;
        };
        if state.new_ids.contains(&instance) || state.old_values.contains_key(&instance) {
            return;
        }
        state.old_values.insert(instance, old);
    }

    fn on_remove(&mut self, instance: u64, old: T) {
        let Some(state) = self.sessions.last_mut() else {
            return;
        };
        if state.new_ids.remove(&instance) {
            return;
        }
        let original = state.old_values.remove(&instance).unwrap_or(old);
        state.removed.insert(instance, original);
    }

    // ── Undo sessions ──

    pub fn start_undo_session(&mut self) {
        self.sessions.push(UndoState::default());
    }

    pub fn undo_depth(&self) -> usize {
        self.sessions.len()
    }

    /// Revert every change made since the top session started.
    pub fn undo(&mut self) {
        let Some(state) = self.sessions.pop() else {
            return;
        };
        for instance in state.new_ids {
            if let Some(obj) = self.records.remove(&instance) {
                self.remove_indices(&obj, instance);
            }
        }
        for (instance, old) in state.old_values {
            if let Some(current) = self.records.remove(&instance) {
                self.remove_indices(&current, instance);
            }
            self.insert_indices(&old, instance);
            self.records.insert(instance, old);
        }
        for (instance, old) in state.removed {
            self.insert_indices(&old, instance);
            self.records.insert(instance, old);
        }
    }

    /// Fold the top session into the one below it. The outermost session is
    /// simply dropped, which makes its changes permanent.
    pub fn squash(&mut self) {
        let Some(top) = self.sessions.pop() else {
            return;
        };
        let Some(prev) = self.sessions.last_mut() else {
            return;
        };
        for (instance, old) in top.old_values {
            if prev.new_ids.contains(&instance) || prev.old_values.contains_key(&instance) {
                continue;
            }
            prev.old_values.insert(instance, old);
        }
        prev.new_ids.extend(top.new_ids);
        for (instance, old) in top.removed {
            if prev.new_ids.remove(&instance) {
                continue;
            }
            let original = prev.old_values.remove(&instance).unwrap_or(old);
            prev.removed.insert(instance, original);
        }
    }

    /// Forget all undo history.
    pub fn commit(&mut self) {
        self.sessions.clear();
    }

    // ── Queries ──

    pub fn find(&self, instance: u64) -> Option<&T> {
        self.records.get(&instance)
    }

    pub fn get(&self, instance: u64) -> ExecResult<&T> {
        self.find(instance).ok_or_else(|| Self::not_found(instance))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Instance number the next create will receive.
    pub fn next_instance(&self) -> u64 {
        self.next_instance
    }

    /// All records in primary key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.records.values()
    }

    /// First record whose key in `index` equals `key`.
    pub fn find_by(&self, index: &str, key: &IndexKey) -> ExecResult<Option<&T>> {
        let pos = self.index_pos(index)?;
        let hit = self.indices[pos]
            .range((key.clone(), 0)..=(key.clone(), u64::MAX))
            .next()
            .and_then(|(_, id)| self.records.get(id));
        Ok(hit)
    }

    /// Records whose key in `index` falls in `range`, ordered by
    /// `(key, instance)`.
    pub fn range_by<R: RangeBounds<IndexKey>>(
        &self,
        index: &str,
        range: R,
    ) -> ExecResult<impl DoubleEndedIterator<Item = &T>> {
        let pos = self.index_pos(index)?;
        let lo = match range.start_bound() {
            Bound::Included(k) => Bound::Included((k.clone(), 0)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), u64::MAX)),
            Bound::Unbounded => Bound::Unbounded,
        };
        let hi = match range.end_bound() {
            Bound::Included(k) => Bound::Included((k.clone(), u64::MAX)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), 0)),
            Bound::Unbounded => Bound::Unbounded,
        };
        let non_empty = match (&lo, &hi) {
            (Bound::Included(a), Bound::Included(b)) => a <= b,
            (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
                a < b
            }
            _ => true,
        };
        let entries = non_empty
            .then(|| self.indices[pos].range((lo, hi)))
            .into_iter()
            .flatten();
        Ok(entries.filter_map(move |(_, id)| self.records.get(id)))
    }

    /// First record with key `>= key` in `index`.
    pub fn lower_bound(&self, index: &str, key: &IndexKey) -> ExecResult<Option<&T>> {
        Ok(self.range_by(index, key.clone()..)?.next())
    }

    /// First record with key `> key` in `index`.
    pub fn upper_bound(&self, index: &str, key: &IndexKey) -> ExecResult<Option<&T>> {
        let range = (Bound::Excluded(key.clone()), Bound::Unbounded);
        Ok(self.range_by(index, range)?.next())
    }

    /// Number of entries in a secondary index.
    pub fn index_len(&self, index: &str) -> ExecResult<usize> {
        let pos = self.index_pos(index)?;
        Ok(self.indices[pos].len())
    }

    // ── Digest ──

    /// Feed records and index membership into `hasher` in a canonical order.
    pub(crate) fn digest_into(&self, hasher: &mut blake3::Hasher) -> ExecResult<()> {
        hasher.update(&[T::SPACE_ID, T::TYPE_ID]);
        hasher.update(&(self.records.len() as u64).to_le_bytes());
        for (instance, record) in &self.records {
            hasher.update(&instance.to_le_bytes());
            write_json(hasher, record)?;
        }
        for (spec, index) in self.specs.iter().zip(&self.indices) {
            hasher.update(spec.name.as_bytes());
            hasher.update(&(index.len() as u64).to_le_bytes());
            for (key, instance) in index {
                write_json(hasher, key)?;
                hasher.update(&instance.to_le_bytes());
            }
        }
        Ok(())
    }
}

fn write_json<V: serde::Serialize>(hasher: &mut blake3::Hasher, value: &V) -> ExecResult<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| ExecError::Internal(format!("digest encoding failed: {}", e)))?;
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(&bytes);
    Ok(())
}
