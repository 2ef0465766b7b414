//! Block-level processing: ordered transaction application, consensus
//! finalize, and the block's state commitments.

use provenet_config::ConsensusConfig;
use provenet_consensus::{EpochContext, PocEngine};
use provenet_state::{AccountState, PocContext, RecordContext, RecordState};
use provenet_storage::{MemoryDb, PrefixTrie};
use provenet_types::{
    create_bloom, Block, BlockHeader, Bloom, Log, PocContextRoots, Receipt, RecordContextRoots,
    H256,
};
use std::sync::Arc;
use tracing::debug;

use crate::processor::{apply_transaction, ExecutionError};

/// Everything a block's execution produced.
#[derive(Debug)]
pub struct BlockOutcome {
    /// Per-transaction receipts, in block order
    pub receipts: Vec<Receipt>,
    /// All logs emitted by the block
    pub logs: Vec<Log>,
    /// Union bloom over the receipts
    pub bloom: Bloom,
    /// Total gas used; gas accounting is stubbed at zero
    pub gas_used: u64,
    /// Account state root after the block
    pub state_root: H256,
    /// Record state root after the block
    pub record_root: H256,
    /// PoC context roots after the block
    pub poc_roots: PocContextRoots,
    /// Record context roots after the block
    pub record_ctx_roots: RecordContextRoots,
    /// Trie root over the block's transactions
    pub transactions_root: H256,
    /// Trie root over the block's receipts
    pub receipts_root: H256,
}

/// Processes a block against the given states and contexts.
///
/// Transactions commit in their listed order; later transactions observe
/// earlier transactions' effects. After the last transaction the engine's
/// finalize step runs mint accounting for the sealing validator and an
/// election if this block crosses an epoch boundary.
#[allow(clippy::too_many_arguments)]
pub fn process_block(
    config: &ConsensusConfig,
    engine: &PocEngine,
    genesis: &BlockHeader,
    parent: &BlockHeader,
    block: &Block,
    accounts: &mut AccountState,
    records: &mut RecordState,
    poc: &mut PocContext,
    record_ctx: &mut RecordContext,
) -> Result<BlockOutcome, ExecutionError> {
    let mut receipts = Vec::with_capacity(block.transactions.len());
    let mut logs = Vec::new();

    for (index, tx) in block.transactions.iter().enumerate() {
        let receipt = apply_transaction(
            config,
            &block.header,
            tx,
            index as u32,
            accounts,
            records,
            poc,
            record_ctx,
        )?;
        logs.extend(receipt.logs.iter().cloned());
        receipts.push(receipt);
    }

    // Consensus-side effects: mint accounting, then a possible election.
    // Block rewards live outside the core and are not applied.
    {
        let mut ec = EpochContext {
            timestamp: block.header.timestamp,
            config: engine.config(),
            poc,
            accounts,
        };
        engine.finalize(genesis, parent, &block.header, &mut ec)?;
    }

    let state_root = accounts.intermediate_root(true);
    let record_root = records.intermediate_root();
    let poc_roots = poc.roots();
    let record_ctx_roots = record_ctx.roots();

    let transactions_root =
        ordered_trie_root(block.transactions.iter().map(|tx| rlp::encode(tx).to_vec()))?;
    let receipts_root = ordered_trie_root(receipts.iter().map(|r| rlp::encode(r).to_vec()))?;
    let bloom = create_bloom(&receipts);

    debug!(
        height = block.header.height,
        txs = block.transactions.len(),
        state_root = %state_root,
        "Processed block"
    );

    Ok(BlockOutcome {
        receipts,
        logs,
        bloom,
        gas_used: 0,
        state_root,
        record_root,
        poc_roots,
        record_ctx_roots,
        transactions_root,
        receipts_root,
    })
}

/// Checks the block's header commitments against an execution outcome.
pub fn validate_state(header: &BlockHeader, outcome: &BlockOutcome) -> Result<(), ExecutionError> {
    let checks: [(&'static str, H256, H256); 5] = [
        ("state root", header.state_root, outcome.state_root),
        ("record root", header.record_root, outcome.record_root),
        (
            "transactions root",
            header.transactions_root,
            outcome.transactions_root,
        ),
        ("receipts root", header.receipts_root, outcome.receipts_root),
        (
            "poc context root",
            header.poc_roots.root(),
            outcome.poc_roots.root(),
        ),
    ];
    for (field, expected, got) in checks {
        if expected != got {
            return Err(ExecutionError::RootMismatch {
                field,
                expected,
                got,
            });
        }
    }
    if header.record_ctx_roots != outcome.record_ctx_roots {
        return Err(ExecutionError::RootMismatch {
            field: "record context root",
            expected: header.record_ctx_roots.root(),
            got: outcome.record_ctx_roots.root(),
        });
    }
    Ok(())
}

/// Root of a trie keyed by RLP-encoded position, the classic derivation
/// for transactions and receipts roots.
fn ordered_trie_root(
    items: impl Iterator<Item = Vec<u8>>,
) -> Result<H256, ExecutionError> {
    let mut trie = PrefixTrie::new(b"ordered-", Arc::new(MemoryDb::new()));
    for (index, item) in items.enumerate() {
        let key = rlp::encode(&(index as u64));
        trie.try_update(&key, &item)
            .map_err(provenet_state::StateError::from)?;
    }
    Ok(trie.root_hash())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_trie_root_sensitive_to_order() {
        let a = ordered_trie_root(vec![b"one".to_vec(), b"two".to_vec()].into_iter()).unwrap();
        let b = ordered_trie_root(vec![b"two".to_vec(), b"one".to_vec()].into_iter()).unwrap();
        assert_ne!(a, b);

        let c = ordered_trie_root(vec![b"one".to_vec(), b"two".to_vec()].into_iter()).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_empty_trie_root_is_stable() {
        let a = ordered_trie_root(Vec::<Vec<u8>>::new().into_iter()).unwrap();
        let b = ordered_trie_root(Vec::<Vec<u8>>::new().into_iter()).unwrap();
        assert_eq!(a, b);
    }
}
