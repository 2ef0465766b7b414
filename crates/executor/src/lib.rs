//! Provenet Transaction and Block Processing
//!
//! The execution surface is a closed set of six transaction types: value
//! transfer, candidate login/logout, and the three record lifecycle
//! operations. There is no virtual machine.
//!
//! [`apply_transaction`] dispatches one transaction against the account
//! state, record state and consensus contexts, producing a receipt.
//! Semantic failures (bad nonce, insufficient balance, duplicate record,
//! transfer by a non-owner) roll the transaction back to its pre-execution
//! snapshot and yield a receipt with the `failed` flag set; storage-level
//! failures abort processing.
//!
//! [`process_block`] runs a block's transactions in order, drives the
//! consensus engine's finalize step (mint accounting and elections), and
//! assembles the block's state commitments.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod block;
pub mod processor;

pub use block::{process_block, validate_state, BlockOutcome};
pub use processor::{apply_transaction, ExecutionError};

/// Result type for execution operations
pub type Result<T> = std::result::Result<T, ExecutionError>;
