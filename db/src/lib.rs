//! `keel-db`: the versioned, multi-indexed object store.
//!
//! Records are typed ([`Object`]), addressed by an instance number assigned
//! at creation, and may carry any number of unique or non-unique secondary
//! indices that the store keeps consistent with every mutation. Nested undo
//! sessions make any sequence of mutations reversible, which is how the
//! engine gives operations and transactions all-or-nothing semantics.

pub mod object;
pub mod table;
pub mod database;

pub use object::{IndexKey, IndexSpec, KeyPart, Object};
pub use table::Table;
pub use database::Database;
