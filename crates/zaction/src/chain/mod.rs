//! Chain state read interface.
//!
//! The ledger exposes row tables: global parameters, the commitment tree's
//! node array, published notes and revealed nullifiers. [`ChainReader`]
//! models those queries as a fallible capability with no implied caching;
//! [`MemoryChain`] is an in-process ledger for tests and local use.

mod memory;

use async_trait::async_trait;
use pasta_curves::Fp;
use serde::{Deserialize, Serialize};

pub use memory::{ApplyError, MemoryChain};

use crate::{
    note::{Commitment, Nullifier},
    note_encryption::EncryptedNote,
};

/// Global parameters row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    /// Leaves appended to the commitment tree so far, across all trees.
    pub leaf_count: u64,
}

/// A published output: its tree position, commitment and ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNote {
    /// Leaf index.
    pub position: u64,
    /// Note commitment at that leaf.
    pub commitment: Commitment,
    /// Ciphertext for the owner.
    pub encrypted: EncryptedNote,
}

/// A chain query failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The chain endpoint could not be reached.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// A row could not be decoded.
    #[error("malformed chain row: {0}")]
    Malformed(String),
}

/// Row-table queries against ledger state.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// The global parameters row.
    async fn global(&self) -> Result<GlobalState, ChainError>;

    /// A commitment tree node by array index, `None` if never written.
    async fn merkle_node(&self, index: u64) -> Result<Option<Fp>, ChainError>;

    /// Published notes with `position >= from`, in position order.
    async fn notes(&self, from: u64) -> Result<Vec<ChainNote>, ChainError>;

    /// Every nullifier revealed so far.
    async fn nullifiers(&self) -> Result<Vec<Nullifier>, ChainError>;
}
