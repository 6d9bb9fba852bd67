//! Transactions and execution receipts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::amount::Asset;
use crate::operation::Operation;
use crate::types::{AccountUid, Hash, ObjectId};

/// A transaction whose signatures have already been verified.
///
/// `signed_uids` lists the accounts whose authorities the signatures satisfy
/// and `signed_keys` the ids of the keys that signed. Authority checks consult
/// them through an oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub operations: Vec<Operation>,
    pub signed_uids: BTreeSet<AccountUid>,
    #[serde(default)]
    pub signed_keys: BTreeSet<Hash>,
}

impl SignedTransaction {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            signed_uids: BTreeSet::new(),
            signed_keys: BTreeSet::new(),
        }
    }

    /// Record that `uid` signed the transaction.
    pub fn signed_by(mut self, uid: AccountUid) -> Self {
        self.signed_uids.insert(uid);
        self
    }

    /// Record a signature by the key with id `key`.
    pub fn signed_with_key(mut self, key: Hash) -> Self {
        self.signed_keys.insert(key);
        self
    }
}

/// RAM usage and fee settled for one account after a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReceipt {
    pub account: AccountUid,
    /// Net bytes charged (negative when storage was released).
    pub ram_bytes: i64,
    pub ram_fee: Asset,
}

/// Outcome of a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractReceipt {
    pub billed_cpu_time_us: u64,
    /// Base fee charged from the caller.
    pub fee: Asset,
    pub ram_receipts: Vec<AccountReceipt>,
}

/// Value returned by an operation's `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Void,
    /// Id of an object the operation created.
    ObjectId(ObjectId),
    Contract(ContractReceipt),
}

/// Per-operation results of a successfully applied transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub operation_results: Vec<OperationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    #[test]
    fn test_signed_by_collects_uids() {
        let trx = SignedTransaction::new(Vec::new()).signed_by(5).signed_by(3).signed_by(5);
        assert_eq!(trx.signed_uids.iter().copied().collect::<Vec<_>>(), vec![3, 5]);
        assert!(trx.signed_keys.is_empty());

        let trx = trx.signed_with_key([1u8; 32]);
        assert_eq!(trx.signed_keys.len(), 1);
    }

    #[test]
    fn test_contract_receipt_json() {
        let receipt = OperationResult::Contract(ContractReceipt {
            billed_cpu_time_us: 120,
            fee: Asset::core(Amount::new(10).unwrap()),
            ram_receipts: vec![AccountReceipt {
                account: 7,
                ram_bytes: -112,
                ram_fee: Asset::core(Amount::new(-5).unwrap()),
            }],
        });
        let json = serde_json::to_string(&receipt).unwrap();
        assert!(json.contains("billed_cpu_time_us"));
        let back: OperationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(receipt, back);
    }
}
