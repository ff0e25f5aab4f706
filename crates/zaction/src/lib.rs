//! # zaction
//!
//! Wallet-side construction of shielded zaction bundles.
//!
//! A caller hands the wallet a [`TransactionRequest`]: ordinary ledger
//! actions, some carrying zaction descriptors that mint, transfer or burn
//! fungible tokens and NFTs inside the shielded pool. The wallet
//!
//! - selects and reserves notes from its [`NoteStore`],
//! - fetches the anchor and Merkle paths through the [`TreeClient`],
//! - plans actions and encrypted outputs in the [`Builder`],
//! - proves every action on a [`ProverPool`],
//! - signs spends and the value balance, and
//! - wraps the bundle in the shielded contract's `begin`/`step` envelope,
//!   inlining the proof or uploading it over the [`ProofChannel`].
//!
//! ## Keys
//!
//! Every key derives from a [`SpendingKey`](keys::private::SpendingKey):
//! spend authorization (RedPallas), the nullifier key, the diversifier key
//! for addresses, and the incoming viewing key for note decryption.
//!
//! ## Ledger
//!
//! [`ChainReader`] is the read side the builder and the wallet need.
//! [`MemoryChain`] implements it in process and verifies transactions the
//! way the shielded contract does.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::pub_use, reason = "exporting items for consumers")]

extern crate alloc;

pub mod action;
pub mod address;
pub mod builder;
pub mod bundle;
pub mod chain;
pub mod circuit;
pub mod config;
pub mod constants;
pub mod custody;
pub mod descriptor;
pub mod keys;
pub mod name;
pub mod note;
pub mod note_encryption;
pub mod note_store;
pub mod proof_store;
pub mod prover;
pub mod transaction;
pub mod tree;
pub mod value;
pub mod wallet;

mod encoding;
#[cfg(test)]
mod testing;

pub use address::Address;
pub use builder::{BuildError, Builder};
pub use bundle::{Bundle, UnprovenBundle};
pub use chain::{ChainReader, MemoryChain};
pub use config::Settings;
pub use descriptor::{TransactionRequest, ZActionDesc, ZActionType};
pub use note::Note;
pub use note_store::NoteStore;
pub use proof_store::{Cid, ProofChannel};
pub use prover::{Proof, ProverPool};
pub use transaction::{Assembler, Transaction, TransactionError};
pub use tree::{Anchor, TreeClient};
pub use wallet::Wallet;
