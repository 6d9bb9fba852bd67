//! Test chain with two deployed copies of a scriptable native contract.
//!
//! The contract reads a JSON list of [`Cmd`] from the call data and performs
//! them in order, which lets each test describe the storage writes, clock
//! movement and inline calls it needs without a new contract per test.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use keel_engine::{Action, ApplyContext, Chain, ManualClock, NativeRuntime};
use keel_primitives::crypto::make_account_uid;
use keel_primitives::{
    Abi, AccountUid, ActionDef, Amount, Asset, AssetAid, ChainParameters, ContractCallOperation,
    ContractDeployOperation, ExecError, ExecResult, Operation, SignedTransaction,
    TransactionReceipt, BLOCKCHAIN_PRECISION, CORE_ASSET_AID,
};
use serde::{Deserialize, Serialize};

pub const P: i64 = BLOCKCHAIN_PRECISION;
pub const SCRIPT_CODE: &[u8] = b"scripted-contract-v1";
pub const INITIAL_FUNDS: i64 = 1_000 * P;

pub fn alice() -> AccountUid {
    make_account_uid(1)
}

pub fn bob() -> AccountUid {
    make_account_uid(2)
}

pub fn ram_account() -> AccountUid {
    make_account_uid(3)
}

pub fn store_contract() -> AccountUid {
    make_account_uid(10)
}

pub fn mirror_contract() -> AccountUid {
    make_account_uid(11)
}

/// One step performed by the scripted contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cmd {
    Store { scope: u64, table: u64, payer: AccountUid, key: u64, value: Vec<u8> },
    Update { scope: u64, table: u64, payer: AccountUid, key: u64, value: Vec<u8> },
    Remove { scope: u64, table: u64, key: u64 },
    /// Send an inline call to `contract`, running `cmds` there.
    Call { contract: AccountUid, method: String, amount: i64, cmds: Vec<Cmd> },
    /// Like `Call`, but carry on if sending fails.
    TryCall { contract: AccountUid, method: String, cmds: Vec<Cmd> },
    /// Burn CPU time.
    Spin { us: u64 },
    /// Let time pass without billing it.
    Sleep { us: u64 },
    Fail,
}

pub fn encode(cmds: &[Cmd]) -> Bytes {
    Bytes::from(serde_json::to_vec(cmds).unwrap())
}

/// `depth` inline calls, each one sent by the previous.
pub fn nested_calls(contract: AccountUid, depth: u32) -> Vec<Cmd> {
    if depth == 0 {
        return Vec::new();
    }
    vec![Cmd::Call {
        contract,
        method: "run".into(),
        amount: 0,
        cmds: nested_calls(contract, depth - 1),
    }]
}

fn run_script(ctx: &mut ApplyContext<'_>, clock: &ManualClock) -> ExecResult<()> {
    let cmds: Vec<Cmd> = serde_json::from_slice(&ctx.action().data)
        .map_err(|e| ExecError::validation(format!("bad script: {}", e)))?;
    for cmd in cmds {
        match cmd {
            Cmd::Store { scope, table, payer, key, value } => {
                ctx.store_row(scope, table, payer, key, value)?;
            }
            Cmd::Update { scope, table, payer, key, value } => {
                let code = ctx.receiver();
                ctx.update_row(code, scope, table, key, payer, value)?;
            }
            Cmd::Remove { scope, table, key } => {
                let code = ctx.receiver();
                ctx.remove_row(code, scope, table, key)?;
            }
            Cmd::Call { contract, method, amount, cmds } => {
                let amount = (amount != 0).then(|| core(amount));
                ctx.send_inline(Action {
                    sender: ctx.receiver(),
                    contract_id: contract,
                    method_name: method,
                    data: encode(&cmds),
                    amount,
                })?;
            }
            Cmd::TryCall { contract, method, cmds } => {
                let _ = ctx.send_inline(Action {
                    sender: ctx.receiver(),
                    contract_id: contract,
                    method_name: method,
                    data: encode(&cmds),
                    amount: None,
                });
            }
            Cmd::Spin { us } => {
                clock.advance(us);
                ctx.checktime()?;
            }
            Cmd::Sleep { us } => {
                ctx.unbilled(|ctx| {
                    clock.advance(us);
                    ctx.checktime()
                })?;
            }
            Cmd::Fail => return Err(ExecError::validation("script failure")),
        }
    }
    Ok(())
}

pub fn core(v: i64) -> Asset {
    Asset::core(Amount::new(v).unwrap())
}

pub fn asset(v: i64, id: AssetAid) -> Asset {
    Asset::new(Amount::new(v).unwrap(), id)
}

pub struct TestChain {
    pub chain: Chain,
    pub clock: ManualClock,
    /// Number of times the scripted contract has run.
    pub invocations: Arc<AtomicU32>,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_params(ChainParameters::default())
    }

    /// Funded alice and bob, the RAM account, and both scripted contracts
    /// deployed by alice.
    pub fn with_params(params: ChainParameters) -> Self {
        init_tracing();
        let clock = ManualClock::new(1_000_000);
        let invocations = Arc::new(AtomicU32::new(0));

        let runtime = {
            let clock = clock.clone();
            let invocations = Arc::clone(&invocations);
            NativeRuntime::new().with_contract(SCRIPT_CODE, move |ctx| {
                invocations.fetch_add(1, Ordering::SeqCst);
                run_script(ctx, &clock)
            })
        };

        let mut chain = Chain::with_runtime(params, Arc::new(runtime), Arc::new(clock.clone()))
            .expect("chain");
        for (uid, name) in [(alice(), "alice"), (bob(), "bob"), (ram_account(), "ramaccount")] {
            chain.create_account(uid, name, alice()).expect("genesis account");
        }
        chain.deposit(alice(), core(INITIAL_FUNDS)).unwrap();
        chain.deposit(bob(), core(INITIAL_FUNDS)).unwrap();

        let mut t = Self { chain, clock, invocations };
        for (uid, name) in [(store_contract(), "store"), (mirror_contract(), "mirror")] {
            let op = t.with_required_fee(Operation::ContractDeploy(ContractDeployOperation {
                fee: core(0),
                owner: alice(),
                contract_id: uid,
                name: name.into(),
                vm_type: "native".into(),
                vm_version: "1".into(),
                code: Bytes::from_static(SCRIPT_CODE),
                abi: script_abi(),
            }));
            t.apply(alice(), vec![op]).expect("deploy");
        }
        t
    }

    /// Set the operation's fee to exactly what the schedule requires.
    pub fn with_required_fee(&self, mut op: Operation) -> Operation {
        let fee = core(op.calculate_fee(&self.chain.params().current_fees).unwrap().value());
        match &mut op {
            Operation::AccountCreate(o) => o.fee = fee,
            Operation::Transfer(o) => o.fee = fee,
            Operation::BalanceLockUpdate(o) => o.fee = fee,
            Operation::ContractDeploy(o) => o.fee = fee,
            Operation::ContractCall(o) => o.fee = fee,
            Operation::InterContractCall(o) => o.fee = fee,
        }
        op
    }

    pub fn apply(&mut self, signer: AccountUid, ops: Vec<Operation>) -> ExecResult<TransactionReceipt> {
        let trx = SignedTransaction::new(ops).signed_by(signer);
        self.chain.apply_transaction(&trx)
    }

    /// Contract call from alice running `cmds` on `contract`.
    pub fn call_op(&self, contract: AccountUid, method: &str, amount: Option<Asset>, cmds: &[Cmd]) -> Operation {
        self.with_required_fee(Operation::ContractCall(ContractCallOperation {
            fee: core(0),
            account: alice(),
            contract_id: contract,
            amount,
            method_name: method.into(),
            data: encode(cmds),
        }))
    }

    pub fn call(&mut self, contract: AccountUid, cmds: &[Cmd]) -> ExecResult<TransactionReceipt> {
        let op = self.call_op(contract, "run", None, cmds);
        self.apply(alice(), vec![op])
    }

    pub fn balance(&self, uid: AccountUid) -> i64 {
        self.chain.balance(uid, CORE_ASSET_AID).unwrap().amount.value()
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn reset_invocations(&self) {
        self.invocations.store(0, Ordering::SeqCst);
    }
}

pub fn script_abi() -> Abi {
    Abi {
        actions: vec![
            ActionDef { name: "run".into(), payable: false },
            ActionDef { name: "pay".into(), payable: true },
        ],
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
