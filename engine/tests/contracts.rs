//! Contract calls end to end: storage billing, settlement against the RAM
//! account, inline calls, CPU deadlines and rollback.

mod common;

use common::*;
use keel_engine::objects::AccountBalanceObject;
use keel_primitives::{
    AccountReceipt, ContractReceipt, ExecError, Operation, OperationResult, TransactionReceipt,
    TransferOperation,
};
use proptest::prelude::*;

/// Base fee of a contract call under the default schedule.
const CALL_FEE: i64 = P / 10;
/// A 10 byte row plus its table descriptor.
const ROW_BYTES: i64 = 10 + 112 + 112;
/// ceil(234 * 50_000 / 1024)
const ROW_FEE: i64 = 11_426;
/// floor(234 * 50_000 / 1024)
const ROW_REFUND: i64 = 11_425;

fn contract_receipt(receipt: &TransactionReceipt) -> &ContractReceipt {
    match receipt.operation_results.last() {
        Some(OperationResult::Contract(r)) => r,
        other => panic!("expected contract receipt, got {:?}", other),
    }
}

fn store(key: u64, len: usize) -> Cmd {
    Cmd::Store { scope: 1, table: 7, payer: alice(), key, value: vec![0xAB; len] }
}

fn remove(key: u64) -> Cmd {
    Cmd::Remove { scope: 1, table: 7, key }
}

#[test]
fn test_store_row_settles_ram_fee() {
    let mut t = TestChain::new();
    let receipt = t.call(store_contract(), &[store(5, 10)]).unwrap();

    let r = contract_receipt(&receipt);
    assert_eq!(r.fee, core(CALL_FEE));
    assert_eq!(
        r.ram_receipts,
        vec![AccountReceipt { account: alice(), ram_bytes: ROW_BYTES, ram_fee: core(ROW_FEE) }]
    );
    assert_eq!(t.balance(alice()), INITIAL_FUNDS - CALL_FEE - ROW_FEE);
    assert_eq!(t.balance(ram_account()), ROW_FEE);
}

#[test]
fn test_remove_row_refunds_ram_fee() {
    let mut t = TestChain::new();
    t.call(store_contract(), &[store(5, 10)]).unwrap();
    let receipt = t.call(store_contract(), &[remove(5)]).unwrap();

    let r = contract_receipt(&receipt);
    assert_eq!(
        r.ram_receipts,
        vec![AccountReceipt { account: alice(), ram_bytes: -ROW_BYTES, ram_fee: core(-ROW_REFUND) }]
    );
    assert_eq!(t.balance(alice()), INITIAL_FUNDS - 2 * CALL_FEE - ROW_FEE + ROW_REFUND);
    assert_eq!(t.balance(ram_account()), ROW_FEE - ROW_REFUND);
}

#[test]
fn test_settlement_keeps_one_balance_per_account() {
    let mut t = TestChain::new();
    let balances = |t: &TestChain| t.chain.db().count::<AccountBalanceObject>().unwrap();
    let before = balances(&t);

    // the RAM account's first credit creates its balance, later ones reuse it
    t.call(store_contract(), &[store(5, 10)]).unwrap();
    assert_eq!(balances(&t), before + 1);
    t.call(store_contract(), &[remove(5)]).unwrap();
    t.call(store_contract(), &[store(6, 10)]).unwrap();
    assert_eq!(balances(&t), before + 1);

    assert_eq!(t.balance(ram_account()), 2 * ROW_FEE - ROW_REFUND);
    assert_eq!(t.balance(alice()), INITIAL_FUNDS - 3 * CALL_FEE - 2 * ROW_FEE + ROW_REFUND);
}

#[test]
fn test_refund_capped_by_ram_account_balance() {
    let mut t = TestChain::new();
    t.call(store_contract(), &[store(5, 10)]).unwrap();

    // drain the RAM account down to 100
    let transfer_fee = 2 * P;
    t.chain.deposit(ram_account(), core(transfer_fee)).unwrap();
    let op = t.with_required_fee(Operation::Transfer(TransferOperation {
        fee: core(0),
        from: ram_account(),
        to: bob(),
        amount: core(ROW_FEE - 100),
        memo: None,
    }));
    t.apply(ram_account(), vec![op]).unwrap();
    assert_eq!(t.balance(ram_account()), 100);

    let receipt = t.call(store_contract(), &[remove(5)]).unwrap();
    let r = contract_receipt(&receipt);
    assert_eq!(r.ram_receipts[0].ram_fee, core(-100));
    assert_eq!(t.balance(ram_account()), 0);
}

#[test]
fn test_store_and_remove_in_one_call_nets_zero() {
    let mut t = TestChain::new();
    let receipt = t.call(store_contract(), &[store(1, 40), remove(1)]).unwrap();
    let r = contract_receipt(&receipt);
    assert_eq!(
        r.ram_receipts,
        vec![AccountReceipt { account: alice(), ram_bytes: 0, ram_fee: core(0) }]
    );
    assert_eq!(t.balance(ram_account()), 0);
}

#[test]
fn test_update_moves_ram_to_new_payer() {
    let mut t = TestChain::new();
    t.chain.deposit(store_contract(), core(P)).unwrap();
    t.call(store_contract(), &[store(5, 10)]).unwrap();

    // payer 0 stands for the contract itself
    let update = Cmd::Update { scope: 1, table: 7, payer: 0, key: 5, value: vec![1; 20] };
    let receipt = t.call(store_contract(), &[update]).unwrap();
    let r = contract_receipt(&receipt);
    let bytes: Vec<_> = r.ram_receipts.iter().map(|a| (a.account, a.ram_bytes)).collect();
    let mut expected = vec![(alice(), -(10 + 112)), (store_contract(), 20 + 112)];
    expected.sort();
    assert_eq!(bytes, expected);
}

#[test]
fn test_contract_payer_must_afford_storage() {
    let mut t = TestChain::new();
    let digest = t.chain.db().state_digest().unwrap();
    let cmd = Cmd::Store { scope: 1, table: 7, payer: 0, key: 1, value: vec![1; 8] };
    let err = t.call(store_contract(), &[cmd]).unwrap_err();
    assert!(matches!(err, ExecError::InsufficientBalance { .. }));
    assert_eq!(t.chain.db().state_digest().unwrap(), digest);
}

#[test]
fn test_foreign_payer_is_rejected() {
    let mut t = TestChain::new();
    let cmd = Cmd::Store { scope: 1, table: 7, payer: bob(), key: 1, value: vec![1] };
    let err = t.call(store_contract(), &[cmd]).unwrap_err();
    assert!(matches!(err, ExecError::DbAccessViolation(_)));
}

#[test]
fn test_duplicate_key_is_rejected() {
    let mut t = TestChain::new();
    let err = t.call(store_contract(), &[store(3, 1), store(3, 2)]).unwrap_err();
    assert!(matches!(err, ExecError::UniqueViolation { .. }));
    assert_eq!(t.balance(alice()), INITIAL_FUNDS);
}

#[test]
fn test_failed_inline_call_reverts_caller_writes() {
    let mut t = TestChain::new();
    let digest = t.chain.db().state_digest().unwrap();
    let cmds = [
        store(1, 16),
        Cmd::Call {
            contract: mirror_contract(),
            method: "run".into(),
            amount: 0,
            cmds: vec![store(2, 16), Cmd::Fail],
        },
    ];
    let err = t.call(store_contract(), &cmds).unwrap_err();
    assert_eq!(err, ExecError::validation("script failure"));
    assert_eq!(t.invocations(), 2);
    assert_eq!(t.chain.db().state_digest().unwrap(), digest);
    assert_eq!(t.balance(alice()), INITIAL_FUNDS);
}

#[test]
fn test_inline_call_writes_callee_table() {
    let mut t = TestChain::new();
    let cmds = [Cmd::Call {
        contract: mirror_contract(),
        method: "run".into(),
        amount: 0,
        cmds: vec![store(9, 10)],
    }];
    let receipt = t.call(store_contract(), &cmds).unwrap();
    // alice still originates the transaction and may pay inside the callee
    let r = contract_receipt(&receipt);
    assert_eq!(r.ram_receipts[0].account, alice());
    assert_eq!(r.ram_receipts[0].ram_bytes, ROW_BYTES);
}

#[test]
fn test_inline_depth_limit() {
    let mut t = TestChain::new();
    t.call(store_contract(), &nested_calls(store_contract(), 3)).unwrap();
    assert_eq!(t.invocations(), 4);

    t.reset_invocations();
    let err = t.call(store_contract(), &nested_calls(store_contract(), 4)).unwrap_err();
    assert_eq!(err, ExecError::InterContractDepthExceeded { max: 3 });
    assert!(err.is_resource_exceeded());
    assert_eq!(t.invocations(), 4);
}

#[test]
fn test_dropped_depth_failure_still_aborts() {
    let mut t = TestChain::new();
    let digest = t.chain.db().state_digest().unwrap();
    let attempt = Cmd::TryCall { contract: mirror_contract(), method: "run".into(), cmds: vec![] };
    let mut cmds = vec![attempt; 10];
    cmds.push(store(1, 10));

    let err = t.call(store_contract(), &cmds).unwrap_err();
    assert_eq!(err, ExecError::InterContractDepthExceeded { max: 3 });
    // the queued calls never ran
    assert_eq!(t.invocations(), 1);
    assert_eq!(t.chain.db().state_digest().unwrap(), digest);
    assert_eq!(t.balance(alice()), INITIAL_FUNDS);
}

#[test]
fn test_inline_call_to_unknown_method_fails() {
    let mut t = TestChain::new();
    let cmds = [Cmd::Call { contract: mirror_contract(), method: "nope".into(), amount: 0, cmds: vec![] }];
    assert!(matches!(t.call(store_contract(), &cmds).unwrap_err(), ExecError::Validation(_)));
}

#[test]
fn test_payable_call_moves_amount() {
    let mut t = TestChain::new();
    let op = t.call_op(store_contract(), "pay", Some(core(5 * P)), &[]);
    t.apply(alice(), vec![op]).unwrap();
    assert_eq!(t.balance(store_contract()), 5 * P);
    assert_eq!(t.balance(alice()), INITIAL_FUNDS - 5 * P - CALL_FEE);

    // and on to the mirror through an inline call
    let cmds = [Cmd::Call { contract: mirror_contract(), method: "pay".into(), amount: 2 * P, cmds: vec![] }];
    t.call(store_contract(), &cmds).unwrap();
    assert_eq!(t.balance(store_contract()), 3 * P);
    assert_eq!(t.balance(mirror_contract()), 2 * P);
}

#[test]
fn test_amount_needs_payable_method() {
    let mut t = TestChain::new();
    let op = t.call_op(store_contract(), "run", Some(core(P)), &[]);
    assert!(matches!(t.apply(alice(), vec![op]).unwrap_err(), ExecError::Validation(_)));

    let cmds = [Cmd::Call { contract: mirror_contract(), method: "run".into(), amount: 1, cmds: vec![] }];
    assert!(matches!(t.call(store_contract(), &cmds).unwrap_err(), ExecError::Validation(_)));
}

#[test]
fn test_call_needs_caller_signature() {
    let mut t = TestChain::new();
    let op = t.call_op(store_contract(), "run", None, &[]);
    assert!(matches!(t.apply(bob(), vec![op]).unwrap_err(), ExecError::Unauthorized(_)));
}

#[test]
fn test_call_to_plain_account_fails() {
    let mut t = TestChain::new();
    let op = t.call_op(bob(), "run", None, &[]);
    assert!(matches!(t.apply(alice(), vec![op]).unwrap_err(), ExecError::Validation(_)));
}

#[test]
fn test_cpu_deadline() {
    let mut t = TestChain::new();
    let err = t.call(store_contract(), &[Cmd::Spin { us: 10_001 }]).unwrap_err();
    assert!(matches!(err, ExecError::CpuUsageExceeded { limit_us: 10_000, .. }));

    let receipt = t.call(store_contract(), &[Cmd::Spin { us: 9_000 }]).unwrap();
    assert_eq!(contract_receipt(&receipt).billed_cpu_time_us, 9_000);
}

#[test]
fn test_paused_time_is_not_billed() {
    let mut t = TestChain::new();
    let cmds = [Cmd::Sleep { us: 50_000 }, Cmd::Spin { us: 9_000 }];
    let receipt = t.call(store_contract(), &cmds).unwrap();
    assert_eq!(contract_receipt(&receipt).billed_cpu_time_us, 9_000);
}

#[test]
fn test_billing_resumes_after_sleep() {
    let mut t = TestChain::new();
    let cmds = [Cmd::Sleep { us: 50_000 }, Cmd::Spin { us: 10_001 }];
    let err = t.call(store_contract(), &cmds).unwrap_err();
    assert!(matches!(err, ExecError::CpuUsageExceeded { limit_us: 10_000, .. }));
}

#[test]
fn test_replay_uses_billed_cpu_time() {
    let mut t = TestChain::new();
    t.chain.set_billed_cpu_time_us(2_000_000);
    let receipt = t.call(store_contract(), &[Cmd::Spin { us: 2_500_000 }]).unwrap();
    assert_eq!(contract_receipt(&receipt).billed_cpu_time_us, 2_000_000);

    let err = t.call(store_contract(), &[Cmd::Spin { us: 3_000_001 }]).unwrap_err();
    assert!(matches!(err, ExecError::CpuUsageExceeded { limit_us: 3_000_000, .. }));
}

#[test]
fn test_sub_millisecond_call_pays_cpu_fee() {
    let mut t = TestChain::new();
    t.call(store_contract(), &[Cmd::Spin { us: 500 }]).unwrap();
    // one started millisecond at the default price
    assert_eq!(t.balance(alice()), INITIAL_FUNDS - CALL_FEE - P);

    t.call(store_contract(), &[Cmd::Spin { us: 1_500 }]).unwrap();
    assert_eq!(t.balance(alice()), INITIAL_FUNDS - 2 * CALL_FEE - P);
}

#[test]
fn test_contract_deploy_rejects_taken_name() {
    let mut t = TestChain::new();
    let op = t.with_required_fee(Operation::ContractDeploy(keel_primitives::ContractDeployOperation {
        fee: core(0),
        owner: alice(),
        contract_id: keel_primitives::crypto::make_account_uid(12),
        name: "store".into(),
        vm_type: "native".into(),
        vm_version: "1".into(),
        code: bytes::Bytes::from_static(SCRIPT_CODE),
        abi: script_abi(),
    }));
    assert!(matches!(t.apply(alice(), vec![op]).unwrap_err(), ExecError::Validation(_)));
}

#[test]
fn test_contract_deploy_rejects_unknown_code() {
    let mut t = TestChain::new();
    let op = t.with_required_fee(Operation::ContractDeploy(keel_primitives::ContractDeployOperation {
        fee: core(0),
        owner: alice(),
        contract_id: keel_primitives::crypto::make_account_uid(12),
        name: "fresh".into(),
        vm_type: "native".into(),
        vm_version: "1".into(),
        code: bytes::Bytes::from_static(b"not registered"),
        abi: script_abi(),
    }));
    assert!(t.apply(alice(), vec![op]).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rows stored and then removed within one call never cost anything.
    #[test]
    fn prop_store_then_remove_nets_zero(
        lens in prop::collection::vec(0usize..64, 1..8),
    ) {
        let mut t = TestChain::new();
        let mut cmds: Vec<Cmd> = lens.iter().enumerate().map(|(k, &len)| store(k as u64, len)).collect();
        cmds.extend((0..lens.len()).map(|k| remove(k as u64)));

        let receipt = t.call(store_contract(), &cmds).unwrap();
        let r = contract_receipt(&receipt);
        prop_assert_eq!(r.ram_receipts.len(), 1);
        prop_assert_eq!(r.ram_receipts[0].ram_bytes, 0);
        prop_assert_eq!(t.balance(alice()), INITIAL_FUNDS - CALL_FEE);
    }

    /// What a call leaves stored is what it pays for.
    #[test]
    fn prop_ram_bytes_match_stored_rows(
        lens in prop::collection::vec(0usize..64, 1..8),
    ) {
        let mut t = TestChain::new();
        let cmds: Vec<Cmd> = lens.iter().enumerate().map(|(k, &len)| store(k as u64, len)).collect();
        let receipt = t.call(store_contract(), &cmds).unwrap();

        let expected: i64 = 112 + lens.iter().map(|&l| l as i64 + 112).sum::<i64>();
        let r = contract_receipt(&receipt);
        prop_assert_eq!(r.ram_receipts[0].ram_bytes, expected);
        prop_assert_eq!(t.balance(ram_account()), r.ram_receipts[0].ram_fee.amount.value());
    }
}
