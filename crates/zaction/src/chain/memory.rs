//! In-process ledger.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloc::collections::BTreeMap;

use async_trait::async_trait;
use pasta_curves::Fp;
use tracing::{debug, info};

use super::{ChainError, ChainNote, ChainReader, GlobalState};
use crate::{
    constants::MERKLE_DEPTH,
    note::{Commitment, Nullifier},
    note_encryption::EncryptedNote,
    proof_store::{ProofChannel, ProofStore, UploadError},
    prover::{Proof, Prover, ProverError},
    transaction::{ProofReference, Transaction},
    tree::{Anchor, empty_root, leaf_index, merkle_crh, tree_base},
};

/// A transaction the ledger refuses.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The bundle carries no proof reference.
    #[error("bundle has no proof")]
    MissingProof,

    /// The proof could not be fetched.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The proof does not verify.
    #[error(transparent)]
    Proof(#[from] ProverError),

    /// A binding or spend authorization signature is invalid.
    #[error("invalid signature: {0}")]
    Signature(reddsa::Error),

    /// The anchor was never a root of this ledger's tree.
    #[error("unknown anchor {0}")]
    UnknownAnchor(Anchor),

    /// A nullifier was already revealed, or repeats within the bundle.
    #[error("nullifier {0} already spent")]
    DoubleSpend(Nullifier),
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<u64, Fp>,
    leaf_count: u64,
    notes: Vec<ChainNote>,
    nullifiers: Vec<Nullifier>,
    roots: Vec<Anchor>,
}

impl State {
    fn append(&mut self, cm: Commitment) -> u64 {
        let position = self.leaf_count;
        let base = tree_base(position);
        let mut local = leaf_index(position) - base;
        let mut node = Fp::from(cm);
        self.nodes.insert(base + local, node);
        for level in 0..MERKLE_DEPTH {
            let is_left = local & 1 == 1;
            let sibling_local = if is_left { local + 1 } else { local - 1 };
            let sibling = self
                .nodes
                .get(&(base + sibling_local))
                .copied()
                .unwrap_or_else(|| empty_root(level));
            node = if is_left {
                merkle_crh(level, node, sibling)
            } else {
                merkle_crh(level, sibling, node)
            };
            local = (local - 1) >> 1;
            self.nodes.insert(base + local, node);
        }
        self.leaf_count += 1;
        self.roots.push(Anchor::from(node));
        position
    }
}

/// A ledger held in memory.
///
/// Appends commitments to an array-layout Merkle tree, keeps published
/// ciphertexts and revealed nullifiers, and remembers every root it ever
/// had. [`apply`](Self::apply) verifies a transaction the way the shielded
/// contract does before accepting it.
#[derive(Debug)]
pub struct MemoryChain {
    state: Mutex<State>,
    available: AtomicBool,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChain {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                nodes: BTreeMap::new(),
                leaf_count: 0,
                notes: Vec::new(),
                nullifiers: Vec::new(),
                roots: vec![Anchor::empty()],
            }),
            available: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), ChainError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChainError::Unavailable("ledger offline".to_owned()))
        }
    }

    /// Take the ledger offline (every read fails) or back online.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Append a bare commitment, returning its position.
    pub fn append(&self, cm: Commitment) -> u64 {
        self.lock().append(cm)
    }

    /// Append a commitment with its ciphertext, returning its position.
    pub fn add_note(&self, cm: Commitment, encrypted: EncryptedNote) -> u64 {
        let mut state = self.lock();
        let position = state.append(cm);
        state.notes.push(ChainNote {
            position,
            commitment: cm,
            encrypted,
        });
        position
    }

    /// Whether `anchor` was ever this ledger's root.
    #[must_use]
    pub fn is_known_anchor(&self, anchor: &Anchor) -> bool {
        self.lock().roots.contains(anchor)
    }

    /// Leaves appended so far.
    #[must_use]
    pub fn leaf_count(&self) -> u64 {
        self.lock().leaf_count
    }

    /// Verify `tx` and apply its effects.
    ///
    /// Checks the anchor, every signature, the proof (fetched from
    /// `proofs` when uploaded) and nullifier uniqueness. Nothing changes
    /// unless every check passes.
    pub async fn apply<P: Prover, S: ProofStore>(
        &self,
        tx: &Transaction,
        prover: &P,
        proofs: &ProofChannel<S>,
    ) -> Result<(), ApplyError> {
        let Some(bundle) = tx.bundle.as_ref() else {
            return Ok(());
        };
        if !self.is_known_anchor(&bundle.anchor) {
            return Err(ApplyError::UnknownAnchor(bundle.anchor));
        }
        bundle.verify_signatures().map_err(ApplyError::Signature)?;

        let proof = match tx.proof.as_ref() {
            None => return Err(ApplyError::MissingProof),
            Some(ProofReference::Inline(proof)) => proof.clone(),
            Some(ProofReference::Digest(cid)) => Proof::from(proofs.fetch(cid).await?),
        };
        prover.verify(&bundle.anchor, &bundle.instances(), &proof)?;

        let nullifiers = bundle.nullifiers();
        let mut state = self.lock();
        for (index, nf) in nullifiers.iter().enumerate() {
            let repeated = nullifiers.iter().take(index).any(|earlier| earlier == nf);
            if repeated || state.nullifiers.contains(nf) {
                return Err(ApplyError::DoubleSpend(*nf));
            }
        }
        state.nullifiers.extend(nullifiers.iter().copied());
        let outputs = bundle.outputs();
        let appended = outputs.len();
        for (cm, encrypted) in outputs {
            let position = state.append(cm);
            state.notes.push(ChainNote {
                position,
                commitment: cm,
                encrypted,
            });
        }
        let leaf_count = state.leaf_count;
        drop(state);
        debug!(nullifiers = nullifiers.len(), "revealed nullifiers");
        info!(actions = bundle.actions.len(), appended, leaf_count, "applied transaction");
        Ok(())
    }
}

#[async_trait]
impl ChainReader for MemoryChain {
    async fn global(&self) -> Result<GlobalState, ChainError> {
        self.check_available()?;
        Ok(GlobalState {
            leaf_count: self.lock().leaf_count,
        })
    }

    async fn merkle_node(&self, index: u64) -> Result<Option<Fp>, ChainError> {
        self.check_available()?;
        Ok(self.lock().nodes.get(&index).copied())
    }

    async fn notes(&self, from: u64) -> Result<Vec<ChainNote>, ChainError> {
        self.check_available()?;
        Ok(self
            .lock()
            .notes
            .iter()
            .filter(|note| note.position >= from)
            .cloned()
            .collect())
    }

    async fn nullifiers(&self) -> Result<Vec<Nullifier>, ChainError> {
        self.check_available()?;
        Ok(self.lock().nullifiers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing,
        tree::TreeClient,
    };

    #[tokio::test]
    async fn roots_are_remembered() {
        let chain = MemoryChain::new();
        assert!(chain.is_known_anchor(&Anchor::empty()));
        chain.append(Commitment::from(Fp::from(7u64)));
        let root = TreeClient::new(&chain).root().await.unwrap();
        assert!(chain.is_known_anchor(&root));
        assert!(!chain.is_known_anchor(&Anchor::from(Fp::from(7u64))));
        assert_eq!(chain.leaf_count(), 1);
    }

    #[tokio::test]
    async fn applied_transfer_appends_outputs_and_nullifiers() {
        let mut fx = testing::funded(&[100]).await;
        let (prover, proofs) = testing::services();
        let mut rng = testing::rng(0);

        let tx = fx.send(30, &prover, &proofs, &mut rng).await.unwrap();
        fx.chain.apply(&tx, prover.prover(), &proofs).await.unwrap();

        assert_eq!(fx.chain.leaf_count(), 3, "funding note, output and change");
        assert_eq!(fx.chain.nullifiers().await.unwrap(), tx.bundle.unwrap().nullifiers());
    }

    #[tokio::test]
    async fn double_spend_is_rejected() {
        let mut fx = testing::funded(&[100]).await;
        let (prover, proofs) = testing::services();
        let mut rng = testing::rng(1);

        let tx = fx.send(30, &prover, &proofs, &mut rng).await.unwrap();
        fx.chain.apply(&tx, prover.prover(), &proofs).await.unwrap();
        assert!(matches!(
            fx.chain.apply(&tx, prover.prover(), &proofs).await,
            Err(ApplyError::DoubleSpend(_))
        ));
        assert_eq!(fx.chain.leaf_count(), 3, "rejected transaction left no trace");
    }

    #[tokio::test]
    async fn tampered_transactions_are_rejected() {
        let mut fx = testing::funded(&[100]).await;
        let (prover, proofs) = testing::services();
        let mut rng = testing::rng(2);
        let tx = fx.send(30, &prover, &proofs, &mut rng).await.unwrap();

        let mut unproved = tx.clone();
        unproved.proof = None;
        assert!(matches!(
            fx.chain.apply(&unproved, prover.prover(), &proofs).await,
            Err(ApplyError::MissingProof)
        ));

        let mut foreign_proof = tx.clone();
        foreign_proof.proof = Some(ProofReference::Inline(Proof::from(vec![0u8; 64])));
        assert!(matches!(
            fx.chain.apply(&foreign_proof, prover.prover(), &proofs).await,
            Err(ApplyError::Proof(_))
        ));

        let mut unanchored = tx.clone();
        if let Some(bundle) = unanchored.bundle.as_mut() {
            bundle.anchor = Anchor::from(Fp::from(3u64));
        }
        assert!(matches!(
            fx.chain.apply(&unanchored, prover.prover(), &proofs).await,
            Err(ApplyError::UnknownAnchor(_))
        ));

        let mut inflated = tx;
        if let Some(bundle) = inflated.bundle.as_mut() {
            bundle.value_balance = testing::balance_of(5);
        }
        assert!(matches!(
            fx.chain.apply(&inflated, prover.prover(), &proofs).await,
            Err(ApplyError::Signature(_))
        ));
        assert_eq!(fx.chain.leaf_count(), 1);
    }
}
