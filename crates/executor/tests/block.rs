//! Integration tests for block-level processing.

use alloy_primitives::U256;
use provenet_config::ConsensusConfig;
use provenet_consensus::{EpochConfig, PocEngine};
use provenet_executor::{process_block, validate_state, ExecutionError};
use provenet_state::{AccountState, PocContext, RecordContext, RecordState};
use provenet_storage::{KvStore, MemoryDb};
use provenet_types::{Address, Block, BlockHeader, Transaction, H256};
use std::sync::Arc;

const EPOCH_INTERVAL: u64 = 3600;
const BLOCK_INTERVAL: u64 = 10;

struct Harness {
    config: ConsensusConfig,
    engine: PocEngine,
    accounts: AccountState,
    records: RecordState,
    poc: PocContext,
    record_ctx: RecordContext,
}

impl Harness {
    fn new() -> Self {
        let db: Arc<dyn KvStore> = Arc::new(MemoryDb::new());
        let config = ConsensusConfig {
            epoch_interval: EPOCH_INTERVAL,
            block_interval: BLOCK_INTERVAL,
            max_validator_size: 3,
            safe_size: 2,
            ..Default::default()
        };
        let epoch_config = EpochConfig::from(&config);
        Self {
            config,
            engine: PocEngine::new(epoch_config),
            accounts: AccountState::new(H256::NIL, Arc::clone(&db)),
            records: RecordState::new(H256::NIL, Arc::clone(&db)),
            poc: PocContext::new(Arc::clone(&db)),
            record_ctx: RecordContext::new(db),
        }
    }
}

fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}

fn genesis_header() -> BlockHeader {
    BlockHeader::default()
}

fn header(height: u64, timestamp: u64, parent: &BlockHeader, validator: Address) -> BlockHeader {
    BlockHeader {
        height,
        timestamp,
        parent_hash: parent.hash(),
        validator,
        ..Default::default()
    }
}

#[test]
fn test_process_block_applies_in_order() {
    let mut h = Harness::new();
    let (a, b, c) = (addr(0x01), addr(0x02), addr(0x03));
    h.accounts.set_balance(a, U256::from(100u64));
    h.accounts.intermediate_root(true);

    let genesis = genesis_header();
    let parent = header(1, BLOCK_INTERVAL, &genesis, addr(0xEE));
    let head = header(2, 2 * BLOCK_INTERVAL, &parent, addr(0xEE));

    // The second transfer spends money that only exists because of the
    // first one
    let txs = vec![
        Transaction::transfer(1, 0, a, b, U256::from(50u64)),
        Transaction::transfer(1, 0, b, c, U256::from(30u64)),
    ];
    let block = Block::new(head, txs);

    let outcome = process_block(
        &h.config,
        &h.engine,
        &genesis,
        &parent,
        &block,
        &mut h.accounts,
        &mut h.records,
        &mut h.poc,
        &mut h.record_ctx,
    )
    .unwrap();

    assert_eq!(outcome.receipts.len(), 2);
    assert!(outcome.receipts.iter().all(|r| !r.failed));
    assert_eq!(outcome.gas_used, 0);
    assert_eq!(h.accounts.get_balance(&a), U256::from(50u64));
    assert_eq!(h.accounts.get_balance(&b), U256::from(20u64));
    assert_eq!(h.accounts.get_balance(&c), U256::from(30u64));

    // Receipts carry strictly progressing intermediate roots
    assert_ne!(outcome.receipts[0].post_state, outcome.receipts[1].post_state);
    assert_eq!(outcome.state_root, outcome.receipts[1].post_state);
}

#[test]
fn test_failed_tx_keeps_block_going() {
    let mut h = Harness::new();
    let (a, b) = (addr(0x01), addr(0x02));
    h.accounts.set_balance(a, U256::from(10u64));

    let genesis = genesis_header();
    let parent = header(1, BLOCK_INTERVAL, &genesis, addr(0xEE));
    let head = header(2, 2 * BLOCK_INTERVAL, &parent, addr(0xEE));

    let txs = vec![
        // Overspends: fails, reverts, leaves a receipt
        Transaction::transfer(1, 0, a, b, U256::from(100u64)),
        // Still nonce 0: the failed transfer rolled the increment back
        Transaction::transfer(1, 0, a, b, U256::from(5u64)),
    ];
    let block = Block::new(head, txs);

    let outcome = process_block(
        &h.config,
        &h.engine,
        &genesis,
        &parent,
        &block,
        &mut h.accounts,
        &mut h.records,
        &mut h.poc,
        &mut h.record_ctx,
    )
    .unwrap();

    assert!(outcome.receipts[0].failed);
    assert!(!outcome.receipts[1].failed);
    assert_eq!(h.accounts.get_balance(&b), U256::from(5u64));
}

#[test]
fn test_mint_count_updates_for_sealer() {
    let mut h = Harness::new();
    let sealer = addr(0x07);

    let genesis = genesis_header();
    let parent = header(1, BLOCK_INTERVAL, &genesis, sealer);
    let head = header(2, 2 * BLOCK_INTERVAL, &parent, sealer);
    let block = Block::new(head, vec![]);

    process_block(
        &h.config,
        &h.engine,
        &genesis,
        &parent,
        &block,
        &mut h.accounts,
        &mut h.records,
        &mut h.poc,
        &mut h.record_ctx,
    )
    .unwrap();

    assert_eq!(h.poc.mint_cnt(0, &sealer).unwrap(), 1);
}

#[test]
fn test_epoch_boundary_block_elects() {
    let mut h = Harness::new();
    let sealer = addr(0x07);

    // Contribution earned inside the block decides the election run at its
    // end: two candidates log in, one confirms a record
    for i in 1..=2 {
        h.poc.become_candidate(addr(i)).unwrap();
    }
    h.accounts
        .set_contribution(addr(0x01), U256::from(5u64));

    let genesis = genesis_header();
    let parent = header(1, EPOCH_INTERVAL - BLOCK_INTERVAL, &genesis, sealer);
    let head = header(2, EPOCH_INTERVAL, &parent, sealer);
    let confirm = Transaction::confirm_record(1, 0, addr(0x02), &b"doc"[..]);
    let block = Block::new(head, vec![confirm]);

    let outcome = process_block(
        &h.config,
        &h.engine,
        &genesis,
        &parent,
        &block,
        &mut h.accounts,
        &mut h.records,
        &mut h.poc,
        &mut h.record_ctx,
    )
    .unwrap();

    // The election ran and wrote the validator list
    let validators = h.poc.get_validators().unwrap();
    assert_eq!(validators.len(), 2);
    assert!(validators.contains(&addr(0x01)));
    assert!(validators.contains(&addr(0x02)));

    // The contribution snapshot includes the in-block confirmation reward
    let snapshot = h.poc.get_contributions().unwrap();
    let confirmer = snapshot
        .iter()
        .find(|c| c.account == addr(0x02))
        .unwrap();
    assert_eq!(
        confirmer.contribution,
        U256::from(h.config.confirmation_reward)
    );

    assert_eq!(outcome.poc_roots, h.poc.roots());
}

#[test]
fn test_validate_state_flags_mismatch() {
    let mut h = Harness::new();
    let genesis = genesis_header();
    let parent = header(1, BLOCK_INTERVAL, &genesis, addr(0xEE));
    let head = header(2, 2 * BLOCK_INTERVAL, &parent, addr(0xEE));
    let block = Block::new(head.clone(), vec![]);

    let outcome = process_block(
        &h.config,
        &h.engine,
        &genesis,
        &parent,
        &block,
        &mut h.accounts,
        &mut h.records,
        &mut h.poc,
        &mut h.record_ctx,
    )
    .unwrap();

    // The bare header never carried the computed commitments
    let err = validate_state(&head, &outcome).unwrap_err();
    assert!(matches!(err, ExecutionError::RootMismatch { .. }));

    // A header stamped with the outcome passes
    let mut sealed = head;
    sealed.state_root = outcome.state_root;
    sealed.record_root = outcome.record_root;
    sealed.transactions_root = outcome.transactions_root;
    sealed.receipts_root = outcome.receipts_root;
    sealed.poc_roots = outcome.poc_roots;
    sealed.record_ctx_roots = outcome.record_ctx_roots;
    validate_state(&sealed, &outcome).unwrap();
}
