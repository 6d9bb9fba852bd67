//! Chain-wide parameters in force while a transaction executes.

use serde::{Deserialize, Serialize};

use crate::fee::FeeSchedule;

/// Resource limits and fees applied by the engine.
///
/// Carried by the chain and copied into each execution context so a single
/// transaction sees one consistent set of limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParameters {
    /// Node-local upper bound on CPU time for one contract transaction.
    pub max_trx_cpu_us: u64,

    /// Consensus CPU budget for one contract transaction. The effective
    /// deadline is the smaller of this and `max_trx_cpu_us`.
    pub trx_cpu_limit_us: u64,

    /// CPU budget used when a billed CPU time is supplied with the call
    /// (replaying a block rather than producing one).
    pub replay_cpu_limit_us: u64,

    /// Number of inline contract calls allowed per transaction.
    pub max_inter_contract_depth: u32,

    /// Maximum size in bytes of an inline call's data.
    pub max_inline_action_size: u32,

    pub current_fees: FeeSchedule,
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            max_trx_cpu_us: 10_000,
            trx_cpu_limit_us: 10_000,
            replay_cpu_limit_us: 3_000_000,
            max_inter_contract_depth: 3,
            max_inline_action_size: 4 * 1024,
            current_fees: FeeSchedule::default(),
        }
    }
}

impl ChainParameters {
    /// CPU budget for a contract call.
    pub fn contract_cpu_limit_us(&self, billed_cpu_time_us: u64) -> u64 {
        if billed_cpu_time_us > 0 {
            self.replay_cpu_limit_us
        } else {
            self.trx_cpu_limit_us.min(self.max_trx_cpu_us)
        }
    }
}
