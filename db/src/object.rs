//! Object trait and secondary index keys.

use core::fmt::Debug;

use keel_primitives::ObjectId;
use serde::Serialize;

/// One component of an index key.
///
/// Variants order by declaration first, then by value, so keys built from the
/// same shape of parts sort component-wise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum KeyPart {
    U64(u64),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Ordered composite key produced by an index's extractor.
///
/// A shorter key sorts before every longer key it is a prefix of, which lets
/// `[t]` act as a lower bound for all `[t, x]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct IndexKey(pub Vec<KeyPart>);

impl IndexKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    pub fn u64(v: u64) -> Self {
        Self(vec![KeyPart::U64(v)])
    }

    pub fn str(s: &str) -> Self {
        Self(vec![KeyPart::Str(s.to_string())])
    }

    /// Append a component, builder style.
    pub fn push_u64(mut self, v: u64) -> Self {
        self.0.push(KeyPart::U64(v));
        self
    }

    pub fn push_i64(mut self, v: i64) -> Self {
        self.0.push(KeyPart::I64(v));
        self
    }
}

/// Description of one secondary index over `T`.
pub struct IndexSpec<T> {
    pub name: &'static str,
    pub unique: bool,
    pub extract: fn(&T) -> IndexKey,
}

impl<T> IndexSpec<T> {
    pub fn unique(name: &'static str, extract: fn(&T) -> IndexKey) -> Self {
        Self {
            name,
            unique: true,
            extract,
        }
    }

    pub fn non_unique(name: &'static str, extract: fn(&T) -> IndexKey) -> Self {
        Self {
            name,
            unique: false,
            extract,
        }
    }
}

/// A record type stored in a [`crate::Database`] table.
///
/// Every object carries its own id; the store assigns it before the
/// creator's initializer runs and it must never change afterwards.
pub trait Object: Clone + Debug + Default + Serialize + 'static {
    const SPACE_ID: u8;
    const TYPE_ID: u8;
    /// Human readable name used in errors and logs.
    const TYPE_NAME: &'static str;

    fn id(&self) -> ObjectId;
    fn set_id(&mut self, id: ObjectId);

    /// Secondary indices maintained alongside the primary `by_id` index.
    fn indices() -> Vec<IndexSpec<Self>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_sorts_first() {
        let prefix = IndexKey::u64(3);
        let full = IndexKey::u64(3).push_u64(0);
        let next = IndexKey::u64(4);
        assert!(prefix < full);
        assert!(full < next);
    }

    #[test]
    fn test_component_ordering() {
        let a = IndexKey::u64(1).push_i64(-5);
        let b = IndexKey::u64(1).push_i64(2);
        assert!(a < b);
        assert!(IndexKey::str("alice") < IndexKey::str("bob"));
    }
}
