//! Per-transaction execution context.
//!
//! One [`TransactionContext`] wraps the processing of one contract
//! transaction, including every inline call it triggers. It owns:
//! - the CPU billing timer (start, deadline, pause bookkeeping),
//! - the RAM ledger: signed byte deltas per payer account,
//! - the inline call counter bounding contract-to-contract dispatch.
//!
//! The first resource failure (CPU deadline or call limit) is latched: every
//! later `checktime` returns it again, so contract code that drops the error
//! cannot keep the transaction alive.
//!
//! The context is passed explicitly; there is no ambient "current
//! transaction".

use std::collections::BTreeMap;
use std::sync::Arc;

use keel_primitives::{AccountUid, ChainParameters, ExecError, ExecResult};
use tracing::trace;

use crate::clock::Clock;

pub struct TransactionContext {
    clock: Arc<dyn Clock>,
    trx_origin: AccountUid,
    start_us: u64,
    deadline_us: u64,
    /// Set while the billing timer is paused.
    pause_time_us: Option<u64>,
    cpu_usage_us: u64,
    ram_statistics: BTreeMap<AccountUid, i64>,
    inter_contract_calling_count: u32,
    max_inter_contract_depth: u32,
    max_inline_action_size: u32,
    exceeded: Option<ExecError>,
}

impl TransactionContext {
    /// Start the billing timer now, with `max_cpu_us` of budget.
    pub fn new(
        clock: Arc<dyn Clock>,
        trx_origin: AccountUid,
        max_cpu_us: u64,
        params: &ChainParameters,
    ) -> Self {
        let start_us = clock.now_us();
        Self {
            clock,
            trx_origin,
            start_us,
            deadline_us: start_us.saturating_add(max_cpu_us),
            pause_time_us: None,
            cpu_usage_us: 0,
            ram_statistics: BTreeMap::new(),
            inter_contract_calling_count: 0,
            max_inter_contract_depth: params.max_inter_contract_depth,
            max_inline_action_size: params.max_inline_action_size,
            exceeded: None,
        }
    }

    /// Account that pays for the transaction.
    pub fn trx_origin(&self) -> AccountUid {
        self.trx_origin
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // ── CPU ──

    /// Fail with `CpuUsageExceeded` once the deadline has passed.
    ///
    /// Records the CPU time used so far. The deadline is not enforced while
    /// paused, but a latched resource failure always is.
    pub fn checktime(&mut self) -> ExecResult<()> {
        self.check_exceeded()?;
        if self.pause_time_us.is_some() {
            return Ok(());
        }
        let now = self.clock.now_us();
        self.cpu_usage_us = now.saturating_sub(self.start_us);
        if now > self.deadline_us {
            return Err(self.latch(ExecError::CpuUsageExceeded {
                elapsed_us: self.cpu_usage_us,
                limit_us: self.deadline_us - self.start_us,
            }));
        }
        Ok(())
    }

    /// The first resource failure of this transaction, if any.
    pub fn check_exceeded(&self) -> ExecResult<()> {
        match &self.exceeded {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn latch(&mut self, err: ExecError) -> ExecError {
        if self.exceeded.is_none() {
            trace!(error = %err, "resource limit latched");
            self.exceeded = Some(err.clone());
        }
        err
    }

    /// Stop billing. Pausing an already paused timer keeps the first pause.
    pub fn pause_billing_timer(&mut self) {
        if self.pause_time_us.is_none() {
            self.pause_time_us = Some(self.clock.now_us());
        }
    }

    /// Resume billing, shifting start and deadline by the time spent paused.
    pub fn resume_billing_timer(&mut self) {
        let Some(paused_at) = self.pause_time_us.take() else {
            return;
        };
        let paused = self.clock.now_us().saturating_sub(paused_at);
        self.start_us = self.start_us.saturating_add(paused);
        self.deadline_us = self.deadline_us.saturating_add(paused);
        trace!(paused_us = paused, deadline_us = self.deadline_us, "billing timer resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.pause_time_us.is_some()
    }

    /// CPU time recorded by the last `checktime`.
    pub fn cpu_usage_us(&self) -> u64 {
        self.cpu_usage_us
    }

    pub fn deadline_us(&self) -> u64 {
        self.deadline_us
    }

    // ── RAM ──

    /// Add `ram_delta` bytes to `account`'s tally for this transaction.
    /// Account `0` is never charged.
    pub fn update_ram_statistics(&mut self, account: AccountUid, ram_delta: i64) {
        if account == 0 {
            return;
        }
        *self.ram_statistics.entry(account).or_insert(0) += ram_delta;
    }

    /// Net bytes per account, in account order.
    pub fn ram_statistics(&self) -> &BTreeMap<AccountUid, i64> {
        &self.ram_statistics
    }

    // ── Inline calls ──

    /// Count one more inline call, failing once the limit is reached.
    pub fn check_inter_contract_depth(&mut self) -> ExecResult<()> {
        if self.inter_contract_calling_count >= self.max_inter_contract_depth {
            return Err(self.latch(ExecError::InterContractDepthExceeded {
                max: self.max_inter_contract_depth,
            }));
        }
        self.inter_contract_calling_count += 1;
        Ok(())
    }

    pub fn inter_contract_calling_count(&self) -> u32 {
        self.inter_contract_calling_count
    }

    pub fn max_inline_action_size(&self) -> u32 {
        self.max_inline_action_size
    }
}
