//! A seed-derived wallet.
//!
//! Owns the spending key, a [`NoteStore`] and a scan cursor into the
//! ledger's published notes. [`Wallet::create_transaction`] runs a request
//! through the builder and the assembler, then commits the spent notes.

use core::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use x25519_dalek::StaticSecret;

use crate::{
    address::Address,
    builder::Builder,
    chain::{ChainError, ChainReader},
    config::Settings,
    constants::MIN_SEED_LEN,
    custody::Local,
    descriptor::{PermissionLevel, TransactionRequest, ZActionDesc},
    keys::{ProofAuthorizingKey, private::SpendingKey},
    note::{Commitment, Note},
    note_encryption::try_decrypt,
    note_store::NoteStore,
    proof_store::{ProofChannel, ProofStore},
    prover::{Prover, ProverPool},
    transaction::{Assembler, Transaction, TransactionError},
    value::AssetId,
};

/// The seed is too short to derive keys from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("seed has {0} characters, at least {MIN_SEED_LEN} required")]
pub struct WeakSeedError(pub usize);

/// A saved wallet could not be restored.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// Not a saved wallet.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The saved seed is too short.
    #[error(transparent)]
    WeakSeed(#[from] WeakSeedError),
}

#[derive(Serialize, Deserialize)]
struct Saved {
    seed: String,
    next_index: u32,
    scanned: u64,
    notes: Vec<Note>,
}

/// Keys, notes and scan progress of one seed.
pub struct Wallet {
    seed: String,
    sk: SpendingKey,
    next_index: u32,
    scanned: u64,
    store: NoteStore,
    settings: Settings,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Wallet")
            .field("next_index", &self.next_index)
            .field("scanned", &self.scanned)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// A wallet derived from `seed`, with default settings.
    pub fn new(seed: &str) -> Result<Self, WeakSeedError> {
        let len = seed.chars().count();
        if len < MIN_SEED_LEN {
            return Err(WeakSeedError(len));
        }
        let sk = SpendingKey::from_seed(seed);
        Ok(Self {
            seed: seed.to_owned(),
            store: NoteStore::new(sk.nullifier_key()),
            sk,
            next_index: 0,
            scanned: 0,
            settings: Settings::default(),
        })
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// The wallet's notes.
    #[must_use]
    pub const fn store(&self) -> &NoteStore {
        &self.store
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The key the prover needs for this wallet's spends.
    #[must_use]
    pub fn proof_authorizing_key(&self) -> ProofAuthorizingKey {
        self.sk.proof_authorizing_key()
    }

    /// Custody holding this wallet's spend authorizing key.
    #[must_use]
    pub fn custody(&self) -> Local {
        Local::new(self.sk.spend_authorizing_key())
    }

    /// The diversified address at `index`.
    #[must_use]
    pub fn address(&self, index: u32) -> Address {
        self.sk
            .proof_authorizing_key()
            .incoming_viewing_key()
            .address(self.sk.diversifier_key().diversifier(index))
    }

    /// A fresh address; the wallet scans for notes to every address it
    /// has handed out.
    pub fn derive_next_address(&mut self) -> Address {
        self.next_index = self.next_index.saturating_add(1);
        self.address(self.next_index)
    }

    /// Spendable fungible balance per asset.
    #[must_use]
    pub fn balances(&self) -> Vec<(AssetId, u64)> {
        self.store.balances()
    }

    /// Spendable NFTs as `(collection, token id)`.
    #[must_use]
    pub fn nfts(&self) -> Vec<(AssetId, u64)> {
        self.store.nfts()
    }

    /// Spendable auth tokens as `(issuer, commitment)`.
    #[must_use]
    pub fn auth_tokens(&self) -> Vec<(AssetId, Commitment)> {
        self.store.auth_tokens()
    }

    /// Track a note learned out of band.
    pub fn add_note(&self, note: Note) {
        self.store.add(note);
    }

    /// A builder over this wallet's notes, returning change to `change`.
    #[must_use]
    pub fn builder<'wallet, C: ChainReader + ?Sized>(
        &'wallet self,
        chain: &'wallet C,
        change: Address,
    ) -> Builder<'wallet, C> {
        Builder::new(&self.store, chain, &self.settings, self.proof_authorizing_key(), change)
    }

    /// Trial-decrypt notes published since the last sync, then mark spent
    /// every note whose nullifier the ledger revealed. Returns how many
    /// notes were received.
    pub async fn sync<C: ChainReader + ?Sized>(&mut self, chain: &C) -> Result<usize, ChainError> {
        let published = chain.notes(self.scanned).await?;
        let ivk = self.sk.proof_authorizing_key().incoming_viewing_key();
        let dk = self.sk.diversifier_key();
        let keys: Vec<(Address, StaticSecret)> = (0..=self.next_index)
            .map(|index| {
                let diversifier = dk.diversifier(index);
                (ivk.address(diversifier), ivk.secret(&diversifier))
            })
            .collect();

        let mut received = 0usize;
        for published_note in &published {
            let decrypted = keys
                .iter()
                .find_map(|key| try_decrypt(&published_note.encrypted, &key.1, &key.0));
            match decrypted {
                Some(mut note) if note.commitment() == published_note.commitment => {
                    note.position = Some(published_note.position);
                    self.store.add(note);
                    received += 1;
                }
                Some(_) => warn!(position = published_note.position, "ciphertext does not match its commitment"),
                None => {}
            }
            self.scanned = self.scanned.max(published_note.position.saturating_add(1));
        }

        let nullifiers = chain.nullifiers().await?;
        debug!(nullifiers = nullifiers.len(), "marking revealed nullifiers");
        for nf in nullifiers {
            self.store.mark_spent(nf);
        }
        info!(received, scanned = self.scanned, "synced wallet");
        Ok(received)
    }

    /// Build, prove and sign `request`.
    ///
    /// Change goes to a freshly derived address. A request without
    /// zactions passes through unshielded. On success the spent notes are
    /// committed and own outputs tracked pending until the next sync; on
    /// failure every reserved note is released and the address index stays
    /// where it was.
    pub async fn create_transaction<C, P, S, R>(
        &mut self,
        request: &TransactionRequest,
        auth: &[PermissionLevel],
        chain: &C,
        prover: &ProverPool<P>,
        proofs: &ProofChannel<S>,
        rng: &mut R,
    ) -> Result<Transaction, TransactionError>
    where
        C: ChainReader + ?Sized,
        P: Prover,
        S: ProofStore,
        R: RngCore + CryptoRng + Send,
    {
        let descs: Vec<ZActionDesc> = request.descriptors().cloned().collect();
        if descs.is_empty() {
            return Ok(Transaction::transparent(request));
        }

        let change_index = self.next_index.saturating_add(1);
        let bundle = self
            .builder(chain, self.address(change_index))
            .build(&descs, rng)
            .await?;
        let assembler = Assembler::new(&self.settings, prover, proofs);
        let tx = assembler
            .assemble(request, auth, &bundle, &self.custody(), rng)
            .await?;

        self.next_index = change_index;
        let own_outputs = bundle.own_outputs.len();
        bundle.reservation.commit();
        for note in bundle.own_outputs {
            self.store.add(note);
        }
        debug!(own_outputs, "tracking own outputs");
        Ok(tx)
    }

    /// Seed, address index, scan cursor and notes as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Saved {
            seed: self.seed.clone(),
            next_index: self.next_index,
            scanned: self.scanned,
            notes: self.store.all(),
        })
    }

    /// Restore a wallet saved with [`to_json`](Self::to_json). Spent notes
    /// are marked again by the next [`sync`](Self::sync).
    pub fn from_json(json: &str) -> Result<Self, RestoreError> {
        let saved: Saved = serde_json::from_str(json)?;
        let mut wallet = Self::new(&saved.seed)?;
        wallet.next_index = saved.next_index;
        wallet.scanned = saved.scanned;
        for note in saved.notes {
            wallet.store.add(note);
        }
        Ok(wallet)
    }
}
