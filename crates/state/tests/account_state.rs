//! Integration tests for the journaled account state.

use alloy_primitives::U256;
use provenet_state::AccountState;
use provenet_storage::{KvStore, MemoryDb, WriteBatch, EMPTY_ROOT};
use provenet_types::{Address, Log, H256};
use std::sync::Arc;

fn fresh_state() -> AccountState {
    AccountState::new(H256::NIL, Arc::new(MemoryDb::new()))
}

fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}

#[test]
fn test_accounts_created_lazily() {
    let mut state = fresh_state();
    let a = addr(0x01);

    assert!(!state.exist(&a));
    assert_eq!(state.get_balance(&a), U256::ZERO);
    assert_eq!(state.get_nonce(&a), 0);

    // A read does not create; a write does
    assert!(!state.exist(&a));
    state.add_balance(a, U256::from(10u64));
    assert!(state.exist(&a));
}

#[test]
fn test_balance_arithmetic() {
    let mut state = fresh_state();
    let a = addr(0x01);
    let b = addr(0x02);

    state.set_balance(a, U256::from(100u64));
    state.sub_balance(a, U256::from(40u64));
    state.add_balance(b, U256::from(40u64));

    assert_eq!(state.get_balance(&a), U256::from(60u64));
    assert_eq!(state.get_balance(&b), U256::from(40u64));
}

#[test]
fn test_records_set_tracking() {
    let mut state = fresh_state();
    let a = addr(0x01);
    let r1 = H256::keccak256(b"r1");
    let r2 = H256::keccak256(b"r2");

    state.add_record(a, r1);
    state.add_record(a, r2);
    assert_eq!(state.get_records(&a), vec![r1, r2]);

    state.remove_record(a, r1);
    assert_eq!(state.get_records(&a), vec![r2]);
}

#[test]
fn test_snapshot_revert_roundtrip() {
    let mut state = fresh_state();
    let a = addr(0x01);
    let b = addr(0x02);

    state.set_balance(a, U256::from(100u64));
    state.set_nonce(a, 1);
    let pre_root = state.intermediate_root(true);

    // Mutations after finalise belong to a fresh journal
    let id = state.snapshot();
    state.sub_balance(a, U256::from(30u64));
    state.add_balance(b, U256::from(30u64));
    state.set_nonce(a, 2);
    state.add_contribution(a, U256::from(5u64));
    state.add_record(a, H256::keccak256(b"r"));

    state.revert_to_snapshot(id).unwrap();

    assert_eq!(state.get_balance(&a), U256::from(100u64));
    assert_eq!(state.get_balance(&b), U256::ZERO);
    assert_eq!(state.get_nonce(&a), 1);
    assert_eq!(state.get_contribution(&a), U256::ZERO);
    assert!(state.get_records(&a).is_empty());
    assert_eq!(state.intermediate_root(true), pre_root);
}

#[test]
fn test_nested_snapshots_revert_in_order() {
    let mut state = fresh_state();
    let a = addr(0x01);

    state.set_balance(a, U256::from(1u64));
    let outer = state.snapshot();
    state.set_balance(a, U256::from(2u64));
    let inner = state.snapshot();
    state.set_balance(a, U256::from(3u64));

    state.revert_to_snapshot(inner).unwrap();
    assert_eq!(state.get_balance(&a), U256::from(2u64));

    state.revert_to_snapshot(outer).unwrap();
    assert_eq!(state.get_balance(&a), U256::from(1u64));

    // Inner id was truncated; reverting to it again is an error
    assert!(state.revert_to_snapshot(inner).is_err());
}

#[test]
fn test_mutations_outside_snapshot_unaffected() {
    let mut state = fresh_state();
    let a = addr(0x01);

    state.set_balance(a, U256::from(50u64));
    let id = state.snapshot();
    state.set_balance(a, U256::from(75u64));
    state.revert_to_snapshot(id).unwrap();

    // The pre-snapshot mutation survives
    assert_eq!(state.get_balance(&a), U256::from(50u64));
}

#[test]
fn test_snapshots_do_not_span_finalise() {
    let mut state = fresh_state();
    let a = addr(0x01);

    let id = state.snapshot();
    state.set_balance(a, U256::from(5u64));
    state.finalise(true);

    assert!(state.revert_to_snapshot(id).is_err());
    // State keeps the finalised value
    assert_eq!(state.get_balance(&a), U256::from(5u64));
}

#[test]
fn test_intermediate_root_deterministic() {
    let build = |order_flipped: bool| {
        let mut state = fresh_state();
        let (first, second) = if order_flipped {
            (addr(0x02), addr(0x01))
        } else {
            (addr(0x01), addr(0x02))
        };
        state.set_balance(first, U256::from(10u64));
        state.set_balance(second, U256::from(20u64));
        // Same final values regardless of iteration order
        state.set_balance(addr(0x01), U256::from(10u64));
        state.set_balance(addr(0x02), U256::from(20u64));
        state.intermediate_root(true)
    };
    assert_eq!(build(false), build(true));
}

#[test]
fn test_empty_accounts_deleted_on_finalise() {
    let mut state = fresh_state();
    let a = addr(0x01);

    // Created but left empty
    state.create_account(a);
    let root = state.intermediate_root(true);
    assert_eq!(root, EMPTY_ROOT);
}

#[test]
fn test_commit_and_reopen() {
    let db: Arc<MemoryDb> = Arc::new(MemoryDb::new());
    let a = addr(0x01);

    let root = {
        let mut state = AccountState::new(H256::NIL, Arc::clone(&db) as Arc<dyn KvStore>);
        state.set_balance(a, U256::from(77u64));
        state.set_nonce(a, 3);
        state.add_record(a, H256::keccak256(b"r"));

        let mut batch = WriteBatch::new();
        let root = state.commit_to(&mut batch, true).unwrap();
        db.write_batch(batch).unwrap();
        root
    };

    let mut reopened = AccountState::new(root, db as Arc<dyn KvStore>);
    assert_eq!(reopened.get_balance(&a), U256::from(77u64));
    assert_eq!(reopened.get_nonce(&a), 3);
    assert_eq!(reopened.get_records(&a), vec![H256::keccak256(b"r")]);
}

#[test]
fn test_storage_roundtrip_and_revert() {
    let mut state = fresh_state();
    let a = addr(0x01);
    let key = H256::keccak256(b"slot");
    let value = H256::keccak256(b"value");

    let id = state.snapshot();
    state.set_storage(a, key, value);
    assert_eq!(state.get_storage(&a, &key), value);

    state.revert_to_snapshot(id).unwrap();
    assert_eq!(state.get_storage(&a, &key), H256::NIL);
}

#[test]
fn test_logs_follow_prepare_metadata() {
    let mut state = fresh_state();
    let tx1 = H256::keccak256(b"tx1");
    let block = H256::keccak256(b"block");

    state.prepare(tx1, block, 0);
    state.add_log(Log::new(addr(0x01), vec![H256::keccak256(b"topic")], vec![]));
    state.add_log(Log::new(addr(0x02), vec![], vec![1]));

    let logs = state.get_logs(&tx1);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].tx_hash, tx1);
    assert_eq!(logs[0].block_hash, block);
    assert_eq!(logs[0].index, 0);
    assert_eq!(logs[1].index, 1);
    assert_eq!(state.logs().len(), 2);
}

#[test]
fn test_log_revert_drops_tail() {
    let mut state = fresh_state();
    let tx = H256::keccak256(b"tx");
    state.prepare(tx, H256::NIL, 0);

    state.add_log(Log::new(addr(0x01), vec![], vec![]));
    let id = state.snapshot();
    state.add_log(Log::new(addr(0x02), vec![], vec![]));

    state.revert_to_snapshot(id).unwrap();
    assert_eq!(state.get_logs(&tx).len(), 1);
}

#[test]
fn test_preimage_recording_and_revert() {
    let mut state = fresh_state();
    let hash = H256::keccak256(b"payload");

    let id = state.snapshot();
    state.add_preimage(hash, b"payload".to_vec());
    assert!(state.preimages().contains_key(&hash));

    // Recording the same preimage twice journals only once
    state.add_preimage(hash, b"payload".to_vec());
    assert_eq!(state.preimages().len(), 1);

    state.revert_to_snapshot(id).unwrap();
    assert!(state.preimages().is_empty());
}

#[test]
fn test_copy_is_independent() {
    let mut state = fresh_state();
    let a = addr(0x01);
    state.set_balance(a, U256::from(10u64));

    let mut copied = state.copy();
    copied.set_balance(a, U256::from(99u64));

    assert_eq!(state.get_balance(&a), U256::from(10u64));
    assert_eq!(copied.get_balance(&a), U256::from(99u64));
}
