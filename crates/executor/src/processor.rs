//! Single-transaction processing.

use alloy_primitives::U256;
use provenet_config::ConsensusConfig;
use provenet_consensus::ConsensusError;
use provenet_state::{
    AccountLatestTx, AccountState, PocContext, RecordContext, RecordState, StateError,
};
use provenet_types::{Address, BlockHeader, Receipt, Transaction, TxType, H256};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while applying a transaction.
///
/// The semantic variants describe transactions that are invalid against
/// the current state; they revert the transaction and mark its receipt
/// failed. The trailing variants are infrastructure failures and abort the
/// enclosing block.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The sender already used this nonce
    #[error("nonce too low: account at {expected}, transaction carries {got}")]
    NonceTooLow {
        /// The account's next nonce
        expected: u64,
        /// The nonce the transaction carried
        got: u64,
    },

    /// The transaction skips ahead of the sender's next nonce
    #[error("nonce too high: account at {expected}, transaction carries {got}")]
    NonceTooHigh {
        /// The account's next nonce
        expected: u64,
        /// The nonce the transaction carried
        got: u64,
    },

    /// Transfer value exceeds the sender's balance
    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    /// A record with this hash already exists
    #[error("duplicate record {0}")]
    DuplicateRecord(H256),

    /// The sender does not own the record it tries to transfer
    #[error("record {record} is not owned by {sender}")]
    NotOwner {
        /// The record being transferred
        record: H256,
        /// The transaction sender
        sender: Address,
    },

    /// The record is locked against transfers
    #[error("record {record} is locked (status {status})")]
    RecordLocked {
        /// The record being transferred
        record: H256,
        /// Its current status
        status: u8,
    },

    /// A transfer names no recipient
    #[error("transfer names no recipient")]
    MissingRecipient,

    /// The message type does not belong to the attempted dispatch path
    #[error("invalid transaction type")]
    InvalidTxType,

    /// State-layer failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Consensus-layer failure
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Computed roots disagree with the header
    #[error("{field} mismatch: header has {expected}, computed {got}")]
    RootMismatch {
        /// Which commitment disagreed
        field: &'static str,
        /// Root carried by the header
        expected: H256,
        /// Root computed from execution
        got: H256,
    },
}

impl ExecutionError {
    /// Whether this failure is a property of the transaction rather than
    /// the node; semantic failures revert to a receipt instead of aborting
    /// the block.
    pub fn is_semantic(&self) -> bool {
        !matches!(
            self,
            ExecutionError::State(_)
                | ExecutionError::Consensus(_)
                | ExecutionError::RootMismatch { .. }
        )
    }
}

/// Applies one transaction against the dual state and the consensus
/// contexts, returning its receipt.
///
/// All four stores are snapshotted before dispatch. A semantic failure
/// reverts every mutation and produces a receipt with `failed = true`; the
/// post-transaction roots in that receipt equal the pre-transaction roots.
#[allow(clippy::too_many_arguments)]
pub fn apply_transaction(
    config: &ConsensusConfig,
    header: &BlockHeader,
    tx: &Transaction,
    tx_index: u32,
    accounts: &mut AccountState,
    records: &mut RecordState,
    poc: &mut PocContext,
    record_ctx: &mut RecordContext,
) -> Result<Receipt, ExecutionError> {
    let tx_hash = tx.hash();
    accounts.prepare(tx_hash, header.hash(), tx_index);

    let account_snap = accounts.snapshot();
    let record_snap = records.snapshot();
    let poc_snap = poc.snapshot();
    let ctx_snap = record_ctx.snapshot();

    let failed = match execute(config, header, tx, tx_hash, accounts, records, poc, record_ctx)
    {
        Ok(()) => false,
        Err(e) if e.is_semantic() => {
            warn!(tx = %tx_hash, error = %e, "Transaction failed, reverting");
            accounts.revert_to_snapshot(account_snap)?;
            records.revert_to_snapshot(record_snap)?;
            poc.revert_to_snapshot(&poc_snap);
            record_ctx.revert_to_snapshot(&ctx_snap);
            true
        }
        Err(e) => return Err(e),
    };

    let state_root = accounts.intermediate_root(true);
    let record_root = records.intermediate_root();
    let logs = accounts.get_logs(&tx_hash);

    debug!(tx = %tx_hash, failed, "Applied transaction");
    Ok(Receipt::new(state_root, record_root, failed, tx_hash, logs))
}

/// Dispatches the transaction body after the common pre-check.
#[allow(clippy::too_many_arguments)]
fn execute(
    config: &ConsensusConfig,
    header: &BlockHeader,
    tx: &Transaction,
    tx_hash: H256,
    accounts: &mut AccountState,
    records: &mut RecordState,
    poc: &mut PocContext,
    record_ctx: &mut RecordContext,
) -> Result<(), ExecutionError> {
    let sender = tx.from;
    if !accounts.exist(&sender) {
        accounts.create_account(sender);
    }

    // Nonce pre-check, common to every transaction type
    let nonce = accounts.get_nonce(&sender);
    if nonce > tx.nonce {
        return Err(ExecutionError::NonceTooLow {
            expected: nonce,
            got: tx.nonce,
        });
    }
    if nonce < tx.nonce {
        return Err(ExecutionError::NonceTooHigh {
            expected: nonce,
            got: tx.nonce,
        });
    }
    accounts.set_nonce(sender, nonce + 1);

    match tx.tx_type {
        TxType::Binary => {
            if accounts.get_balance(&sender) < tx.value {
                return Err(ExecutionError::InsufficientBalance);
            }
            let recipient = tx.to.unwrap_or(Address::ZERO);
            if !accounts.exist(&recipient) {
                accounts.create_account(recipient);
            }
            accounts.sub_balance(sender, tx.value);
            accounts.add_balance(recipient, tx.value);
        }

        TxType::LoginCandidate | TxType::LogoutCandidate => {
            apply_candidate_tx(poc, tx.tx_type, sender)?;
        }

        TxType::ConfirmationData => {
            // Records are globally unique by their payload hash
            let record_hash = tx.record_hash();
            if records.exist(&record_hash) {
                return Err(ExecutionError::DuplicateRecord(record_hash));
            }

            records.create_record(record_hash);
            records.set_origin(record_hash, sender);
            records.set_owner(record_hash, sender);
            records.set_txs(record_hash, vec![tx_hash]);

            accounts.add_record(sender, record_hash);
            accounts.add_contribution(sender, U256::from(config.confirmation_reward));

            record_ctx.confirm_record(record_hash, tx_hash)?;
            note_latest_tx(poc, header, sender, tx_hash)?;
            info!(record = %record_hash, sender = %sender, "Confirmed record");
        }

        TxType::AuthorizationData => {
            // TODO: authorization grant semantics are not defined yet;
            // wire record_ctx.authorize_record once delegation rules land
        }

        TxType::TransferData => {
            let record_hash = tx.record_hash();
            if records.get_owner(&record_hash) != sender {
                return Err(ExecutionError::NotOwner {
                    record: record_hash,
                    sender,
                });
            }
            let Some(status) = records.get_status(&record_hash) else {
                return Err(ExecutionError::NotOwner {
                    record: record_hash,
                    sender,
                });
            };
            if status != 0 {
                return Err(ExecutionError::RecordLocked {
                    record: record_hash,
                    status,
                });
            }
            let recipient = tx.to.ok_or(ExecutionError::MissingRecipient)?;

            records.set_owner(record_hash, recipient);
            records.add_tx_hash(record_hash, tx_hash);

            accounts.remove_record(sender, record_hash);
            accounts.add_record(recipient, record_hash);
            accounts.add_contribution(sender, U256::from(config.transfer_reward));

            record_ctx.transfer_record(record_hash, tx_hash)?;
            note_latest_tx(poc, header, sender, tx_hash)?;
            info!(record = %record_hash, from = %sender, to = %recipient, "Transferred record");
        }
    }

    Ok(())
}

/// Applies a candidate pool message. Only the two candidate types are
/// valid on this path.
pub(crate) fn apply_candidate_tx(
    poc: &mut PocContext,
    tx_type: TxType,
    sender: Address,
) -> Result<(), ExecutionError> {
    match tx_type {
        TxType::LoginCandidate => poc.become_candidate(sender)?,
        TxType::LogoutCandidate => poc.kickout_candidate(sender)?,
        _ => return Err(ExecutionError::InvalidTxType),
    }
    Ok(())
}

/// Records the sender's latest record transaction, stamped with the block
/// timestamp.
fn note_latest_tx(
    poc: &mut PocContext,
    header: &BlockHeader,
    sender: Address,
    tx_hash: H256,
) -> Result<(), ExecutionError> {
    poc.set_latest_tx(&AccountLatestTx {
        account: sender,
        tx_hash,
        record_time: U256::from(header.timestamp),
    })?;
    Ok(())
}
