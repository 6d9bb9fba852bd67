//! Authority checks for submitted operations.
//!
//! Signature verification happens before a transaction reaches the engine.
//! The engine only asks an [`AuthorityOracle`] whether the verified signers
//! satisfy an operation's [`RequiredAuthorities`].

use std::collections::BTreeSet;

use keel_primitives::{AccountUid, Hash, RequiredAuthorities};

pub trait AuthorityOracle {
    fn check(&self, required: &RequiredAuthorities) -> bool;
}

/// Approves when every required account is among the signers, whatever the
/// authority level, and every `other` authority's key signed.
pub struct SignedUidsOracle<'a> {
    signed: &'a BTreeSet<AccountUid>,
    keys: &'a BTreeSet<Hash>,
}

impl<'a> SignedUidsOracle<'a> {
    pub fn new(signed: &'a BTreeSet<AccountUid>, keys: &'a BTreeSet<Hash>) -> Self {
        Self { signed, keys }
    }
}

impl AuthorityOracle for SignedUidsOracle<'_> {
    fn check(&self, required: &RequiredAuthorities) -> bool {
        required.accounts().iter().all(|uid| self.signed.contains(uid))
            && required.other.is_subset(self.keys)
    }
}

/// Approves everything. For genesis and replay of trusted history.
pub struct AllowAll;

impl AuthorityOracle for AllowAll {
    fn check(&self, _required: &RequiredAuthorities) -> bool {
        true
    }
}
