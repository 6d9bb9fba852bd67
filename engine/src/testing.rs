//! Fixture for unit tests that drive an [`ApplyContext`] directly.

use std::sync::Arc;

use bytes::Bytes;
use keel_db::Database;
use keel_primitives::{Abi, AccountUid, ActionDef, ChainParameters};

use crate::apply_context::{Action, ApplyContext};
use crate::clock::{Clock, ManualClock};
use crate::context::TransactionContext;
use crate::evaluator::ChainEnv;
use crate::ledger;
use crate::objects::{register_tables, DynamicGlobalPropertyObject};
use crate::runtime::NativeRuntime;

pub const CONTRACT: AccountUid = 100;
pub const OTHER_CONTRACT: AccountUid = 101;
pub const PLAIN_ACCOUNT: AccountUid = 102;
pub const SENDER: AccountUid = 200;

pub struct Fixture {
    pub db: Database,
    pub trx: TransactionContext,
    pub params: ChainParameters,
    pub runtime: NativeRuntime,
    pub clock: ManualClock,
    clock_dyn: Arc<dyn Clock>,
}

impl Fixture {
    /// Two deployed contracts and one plain account; `SENDER` originates
    /// the transaction with `max_cpu_us` of budget.
    pub fn new(max_cpu_us: u64) -> Self {
        Self::with_params(max_cpu_us, ChainParameters::default())
    }

    pub fn with_params(max_cpu_us: u64, params: ChainParameters) -> Self {
        let mut db = Database::new();
        register_tables(&mut db).unwrap();
        db.create::<DynamicGlobalPropertyObject>(|_| {}).unwrap();

        let abi = Abi {
            actions: vec![
                ActionDef { name: "run".into(), payable: false },
                ActionDef { name: "pay".into(), payable: true },
            ],
        };
        for (uid, name) in [(CONTRACT, "store"), (OTHER_CONTRACT, "mirror")] {
            let abi = abi.clone();
            ledger::create_account_objects(&mut db, |a| {
                a.uid = uid;
                a.name = name.into();
                a.code = Bytes::from_static(b"code");
                a.abi = abi;
            })
            .unwrap();
        }
        ledger::create_account_objects(&mut db, |a| {
            a.uid = PLAIN_ACCOUNT;
            a.name = "plain".into();
        })
        .unwrap();

        let clock = ManualClock::new(0);
        let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
        let trx = TransactionContext::new(Arc::clone(&clock_dyn), SENDER, max_cpu_us, &params);
        Self {
            db,
            trx,
            params,
            runtime: NativeRuntime::new(),
            clock,
            clock_dyn,
        }
    }

    /// The store alongside an environment borrowing the rest of the fixture.
    pub fn split(&mut self) -> (&mut Database, &mut TransactionContext, ChainEnv<'_>) {
        let env = ChainEnv {
            params: &self.params,
            runtime: &self.runtime,
            clock: &self.clock_dyn,
            head_block_time: 0,
            enabled_hardfork: true,
            billed_cpu_time_us: 0,
        };
        (&mut self.db, &mut self.trx, env)
    }

    pub fn ctx(&mut self) -> ApplyContext<'_> {
        let act = Action {
            sender: SENDER,
            contract_id: CONTRACT,
            method_name: "run".into(),
            data: Bytes::new(),
            amount: None,
        };
        let (db, trx, env) = self.split();
        ApplyContext::new(db, trx, env, act)
    }

    /// Net RAM bytes billed to `account` so far.
    pub fn ram(&self, account: AccountUid) -> i64 {
        self.trx.ram_statistics().get(&account).copied().unwrap_or(0)
    }
}
