//! The wallet's note set.
//!
//! Notes arrive pending (no position), are confirmed once their commitment
//! is seen on chain, and are spent once their nullifier is revealed.
//! Selection reserves notes under the store's lock so two concurrent builds
//! never pick the same note; a [`Reservation`] releases its notes when
//! dropped unless it was committed.

use alloc::{collections::BTreeSet, sync::Arc};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    address::Address,
    keys::NullifierKey,
    note::{Commitment, Note, Nullifier},
    value::{AssetId, NoteKind},
};

/// Order in which spendable notes are consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Largest amount first; ties broken by lower position.
    #[default]
    LargestFirst,
    /// Lowest tree position first.
    OldestFirst,
}

/// The store cannot cover a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("insufficient funds of {asset}: need {need}, have {have}")]
pub struct InsufficientFunds {
    /// Requested asset.
    pub asset: AssetId,
    /// Requested amount (one for an NFT).
    pub need: u64,
    /// Spendable amount.
    pub have: u64,
}

#[derive(Clone, Debug)]
struct NoteRecord {
    note: Note,
    cm: Commitment,
    nf: Option<Nullifier>,
}

impl NoteRecord {
    fn key(&self) -> [u8; 32] {
        self.cm.to_bytes()
    }
}

#[derive(Debug, Default)]
struct Inner {
    notes: Vec<NoteRecord>,
    reserved: BTreeSet<[u8; 32]>,
    spent: BTreeSet<[u8; 32]>,
}

impl Inner {
    fn is_spent(&self, record: &NoteRecord) -> bool {
        record
            .nf
            .is_some_and(|nf| self.spent.contains(&nf.to_bytes()))
    }

    fn spendable(&self) -> impl Iterator<Item = &NoteRecord> {
        self.notes.iter().filter(|record| {
            record.note.position.is_some()
                && !self.is_spent(record)
                && !self.reserved.contains(&record.key())
        })
    }
}

/// A wallet's notes, shared between concurrent builds.
#[derive(Clone, Debug)]
pub struct NoteStore {
    nk: NullifierKey,
    inner: Arc<Mutex<Inner>>,
}

impl NoteStore {
    /// An empty store whose nullifiers are derived with `nk`.
    #[must_use]
    pub fn new(nk: NullifierKey) -> Self {
        Self {
            nk,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a note. Known commitments are ignored, except that a position
    /// confirms a pending copy.
    pub fn add(&self, note: Note) {
        let cm = note.commitment();
        let mut inner = self.lock();
        if let Some(record) = inner.notes.iter_mut().find(|record| record.cm == cm) {
            if record.note.position.is_none() {
                if let Some(position) = note.position {
                    record.note.position = Some(position);
                    record.nf = Some(note.nullifier(&self.nk, position));
                }
            }
            return;
        }
        let nf = note.position.map(|position| note.nullifier(&self.nk, position));
        inner.notes.push(NoteRecord { note, cm, nf });
    }

    /// Record the tree position of a pending note. Returns whether the
    /// commitment was known.
    pub fn confirm(&self, cm: Commitment, position: u64) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.notes.iter_mut().find(|record| record.cm == cm) else {
            return false;
        };
        record.note.position = Some(position);
        record.nf = Some(record.note.nullifier(&self.nk, position));
        true
    }

    /// Mark the note revealing `nf` as spent. Unknown nullifiers are kept
    /// so a note received later is already spent.
    pub fn mark_spent(&self, nf: Nullifier) {
        self.lock().spent.insert(nf.to_bytes());
    }

    /// Confirmed, unspent, unreserved notes of `asset` at `address`.
    #[must_use]
    pub fn notes_for(&self, address: &Address, asset: &AssetId) -> Vec<Note> {
        self.lock()
            .spendable()
            .filter(|record| record.note.address == *address && record.note.asset == *asset)
            .map(|record| record.note)
            .collect()
    }

    /// Every note, spent or not, for persistence.
    #[must_use]
    pub fn all(&self) -> Vec<Note> {
        self.lock().notes.iter().map(|record| record.note).collect()
    }

    /// Spendable fungible balance per asset.
    #[must_use]
    pub fn balances(&self) -> Vec<(AssetId, u64)> {
        let inner = self.lock();
        let mut out: Vec<(AssetId, u64)> = Vec::new();
        for record in inner.spendable() {
            if record.note.kind != NoteKind::Fungible {
                continue;
            }
            match out.binary_search_by(|entry| entry.0.cmp(&record.note.asset)) {
                Ok(found) => {
                    if let Some(entry) = out.get_mut(found) {
                        entry.1 = entry.1.saturating_add(record.note.amount);
                    }
                }
                Err(slot) => out.insert(slot, (record.note.asset, record.note.amount)),
            }
        }
        out
    }

    /// Spendable NFTs as `(asset, token id)`.
    #[must_use]
    pub fn nfts(&self) -> Vec<(AssetId, u64)> {
        self.lock()
            .spendable()
            .filter(|record| record.note.kind == NoteKind::NonFungible)
            .map(|record| (record.note.asset, record.note.amount))
            .collect()
    }

    /// Spendable auth tokens as `(asset, commitment)`.
    #[must_use]
    pub fn auth_tokens(&self) -> Vec<(AssetId, Commitment)> {
        self.lock()
            .spendable()
            .filter(|record| record.note.kind == NoteKind::Auth)
            .map(|record| (record.note.asset, record.cm))
            .collect()
    }

    /// Reserve fungible notes of `asset` covering `amount`.
    ///
    /// Either every chosen note is reserved or none is.
    pub fn select(
        &self,
        asset: &AssetId,
        amount: u64,
        policy: SelectionPolicy,
    ) -> Result<Reservation, InsufficientFunds> {
        let mut inner = self.lock();
        let mut candidates: Vec<&NoteRecord> = inner
            .spendable()
            .filter(|record| record.note.kind == NoteKind::Fungible && record.note.asset == *asset)
            .collect();
        match policy {
            SelectionPolicy::LargestFirst => candidates.sort_by(|lhs, rhs| {
                rhs.note
                    .amount
                    .cmp(&lhs.note.amount)
                    .then(lhs.note.position.cmp(&rhs.note.position))
            }),
            SelectionPolicy::OldestFirst => candidates.sort_by_key(|record| record.note.position),
        }

        let mut chosen = Vec::new();
        let mut total = 0u64;
        for record in candidates {
            if total >= amount {
                break;
            }
            total = total.saturating_add(record.note.amount);
            chosen.push(record.note);
        }
        if total < amount {
            return Err(InsufficientFunds {
                asset: *asset,
                need: amount,
                have: total,
            });
        }

        let keys: Vec<[u8; 32]> = chosen.iter().map(|note| note.commitment().to_bytes()).collect();
        inner.reserved.extend(keys.iter().copied());
        drop(inner);
        debug!(%asset, amount, notes = chosen.len(), total, "reserved notes");
        Ok(Reservation {
            store: self.clone(),
            keys,
            notes: chosen,
            committed: false,
        })
    }

    /// Reserve the note holding NFT `id` of `asset`.
    pub fn select_nft(&self, asset: &AssetId, id: u64) -> Result<Reservation, InsufficientFunds> {
        let reservation = self.select_one(asset, |record| {
            record.note.kind == NoteKind::NonFungible && record.note.asset == *asset && record.note.amount == id
        })?;
        debug!(%asset, id, "reserved nft");
        Ok(reservation)
    }

    /// Reserve the auth token committed to by `cm`, issued by the contract
    /// of `asset`.
    pub fn select_auth(&self, asset: &AssetId, cm: &Commitment) -> Result<Reservation, InsufficientFunds> {
        let reservation = self.select_one(asset, |record| {
            record.note.kind == NoteKind::Auth && record.note.asset.contract == asset.contract && record.cm == *cm
        })?;
        debug!(%asset, %cm, "reserved auth token");
        Ok(reservation)
    }

    fn select_one(
        &self,
        asset: &AssetId,
        wanted: impl Fn(&NoteRecord) -> bool,
    ) -> Result<Reservation, InsufficientFunds> {
        let mut inner = self.lock();
        let found = inner
            .spendable()
            .find(|record| wanted(record))
            .map(|record| record.note);
        let Some(note) = found else {
            return Err(InsufficientFunds {
                asset: *asset,
                need: 1,
                have: 0,
            });
        };
        let key = note.commitment().to_bytes();
        inner.reserved.insert(key);
        drop(inner);
        Ok(Reservation {
            store: self.clone(),
            keys: vec![key],
            notes: vec![note],
            committed: false,
        })
    }
}

/// Notes held for one build.
///
/// Dropping releases them back to the store; [`commit`](Self::commit)
/// marks them spent instead.
#[derive(Debug)]
#[must_use = "dropping a reservation releases its notes"]
pub struct Reservation {
    store: NoteStore,
    keys: Vec<[u8; 32]>,
    notes: Vec<Note>,
    committed: bool,
}

impl Reservation {
    /// An empty reservation on `store`, to absorb others into.
    pub fn empty(store: &NoteStore) -> Self {
        Self {
            store: store.clone(),
            keys: Vec::new(),
            notes: Vec::new(),
            committed: false,
        }
    }

    /// The reserved notes, in selection order.
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Total reserved amount (token ids are not amounts; NFTs and auth
    /// tokens count one).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.notes
            .iter()
            .map(|note| match note.kind {
                NoteKind::Fungible => note.amount,
                NoteKind::NonFungible | NoteKind::Auth => 1,
            })
            .fold(0, u64::saturating_add)
    }

    /// Take over the notes of `other`.
    pub fn absorb(&mut self, mut other: Self) {
        self.keys.append(&mut other.keys);
        self.notes.append(&mut other.notes);
    }

    /// Mark every reserved note spent.
    pub fn commit(mut self) {
        let mut inner = self.store.lock();
        for note in &self.notes {
            if let Some(position) = note.position {
                inner.spent.insert(note.nullifier(&self.store.nk, position).to_bytes());
            }
        }
        for key in &self.keys {
            inner.reserved.remove(key);
        }
        drop(inner);
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed || self.keys.is_empty() {
            return;
        }
        let mut inner = self.store.lock();
        for key in &self.keys {
            inner.reserved.remove(key);
        }
        debug!(notes = self.keys.len(), "released reservation");
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::{keys::private::SpendingKey, name::Symbol, note::Memo};

    fn eos() -> AssetId {
        AssetId::fungible(Symbol::new("EOS", 4).unwrap(), "eosio.token".parse().unwrap())
    }

    fn store_with(amounts: &[u64]) -> (NoteStore, Address) {
        let mut rng = StdRng::seed_from_u64(0);
        let sk = SpendingKey::from([9u8; 32]);
        let address = sk
            .proof_authorizing_key()
            .incoming_viewing_key()
            .address(sk.diversifier_key().diversifier(0));
        let store = NoteStore::new(sk.nullifier_key());
        for (position, amount) in (0u64..).zip(amounts) {
            let mut note = Note::new(address, NoteKind::Fungible, eos(), *amount, Memo::EMPTY, &mut rng);
            note.position = Some(position);
            store.add(note);
        }
        (store, address)
    }

    #[test]
    fn largest_first_and_oldest_first() {
        let (store, _) = store_with(&[10, 50, 20, 50]);

        let largest = store.select(&eos(), 60, SelectionPolicy::LargestFirst).unwrap();
        let picked: Vec<_> = largest.notes().iter().map(|note| note.position).collect();
        assert_eq!(picked, vec![Some(1), Some(3)]);
        drop(largest);

        let oldest = store.select(&eos(), 60, SelectionPolicy::OldestFirst).unwrap();
        let picked: Vec<_> = oldest.notes().iter().map(|note| note.position).collect();
        assert_eq!(picked, vec![Some(0), Some(1)]);
    }

    #[test]
    fn insufficient_funds_reserves_nothing() {
        let (store, address) = store_with(&[40]);
        let err = store.select(&eos(), 50, SelectionPolicy::default()).unwrap_err();
        assert_eq!((err.need, err.have), (50, 40));
        assert_eq!(store.notes_for(&address, &eos()).len(), 1);
    }

    #[test]
    fn reservations_release_on_drop_and_spend_on_commit() {
        let (store, address) = store_with(&[100]);

        let reservation = store.select(&eos(), 30, SelectionPolicy::default()).unwrap();
        assert!(store.notes_for(&address, &eos()).is_empty());
        drop(reservation);
        assert_eq!(store.balances(), vec![(eos(), 100)]);

        store.select(&eos(), 30, SelectionPolicy::default()).unwrap().commit();
        assert!(store.notes_for(&address, &eos()).is_empty());
        assert!(store.balances().is_empty());
        assert!(store.select(&eos(), 1, SelectionPolicy::default()).is_err());
    }

    #[test]
    fn pending_and_spent_notes_are_not_spendable() {
        let mut rng = StdRng::seed_from_u64(3);
        let (store, address) = store_with(&[]);
        let pending = Note::new(address, NoteKind::Fungible, eos(), 5, Memo::EMPTY, &mut rng);
        store.add(pending);
        assert!(store.notes_for(&address, &eos()).is_empty());

        assert!(store.confirm(pending.commitment(), 7));
        let spendable = store.notes_for(&address, &eos());
        assert_eq!(spendable.len(), 1);

        let nk = SpendingKey::from([9u8; 32]).nullifier_key();
        store.mark_spent(pending.nullifier(&nk, 7));
        assert!(store.notes_for(&address, &eos()).is_empty());
    }

    #[test]
    fn nft_selection_is_exact() {
        let mut rng = StdRng::seed_from_u64(4);
        let (store, address) = store_with(&[]);
        for (position, id) in [(0u64, 7u64), (1, 8)] {
            let mut nft = Note::new(address, NoteKind::NonFungible, eos(), id, Memo::EMPTY, &mut rng);
            nft.position = Some(position);
            store.add(nft);
        }

        let reservation = store.select_nft(&eos(), 8).unwrap();
        assert_eq!(reservation.notes().first().map(|note| note.amount), Some(8));
        assert!(store.select_nft(&eos(), 8).is_err());
        assert_eq!(store.nfts(), vec![(eos(), 7)]);
        // NFTs never count toward fungible balances
        assert!(store.balances().is_empty());
    }

    #[test]
    fn auth_tokens_are_selected_by_commitment() {
        let mut rng = StdRng::seed_from_u64(5);
        let (store, address) = store_with(&[]);
        let contract = AssetId {
            symbol: 0,
            contract: "thezeosalias".parse().unwrap(),
        };
        let mut cms = Vec::new();
        for position in 0u64..2 {
            let mut token = Note::new(address, NoteKind::Auth, contract, 0, Memo::EMPTY, &mut rng);
            token.position = Some(position);
            cms.push(token.commitment());
            store.add(token);
        }
        let (first, second) = (cms.first().copied().unwrap(), cms.get(1).copied().unwrap());
        assert_eq!(store.auth_tokens(), vec![(contract, first), (contract, second)]);

        // another contract cannot claim the token
        assert!(store.select_auth(&eos(), &second).is_err());
        let reservation = store.select_auth(&contract, &second).unwrap();
        assert_eq!(reservation.notes().first().map(Note::commitment), Some(second));
        assert_eq!(reservation.total(), 1);
        assert!(store.select_auth(&contract, &second).is_err());
        assert_eq!(store.auth_tokens(), vec![(contract, first)]);
        assert!(store.balances().is_empty() && store.nfts().is_empty());
    }

    proptest! {
        /// Two selections that succeed concurrently never share a note.
        #[test]
        fn concurrent_selections_never_overlap(
            amounts in proptest::collection::vec(1u64..100, 1..12),
            first in 1u64..300,
            second in 1u64..300,
        ) {
            let (store, _) = store_with(&amounts);
            let left = store.clone();
            let right = store.clone();
            let handle_a = std::thread::spawn(move || left.select(&eos(), first, SelectionPolicy::LargestFirst));
            let handle_b = std::thread::spawn(move || right.select(&eos(), second, SelectionPolicy::OldestFirst));
            let res_a = handle_a.join().unwrap();
            let res_b = handle_b.join().unwrap();

            if let (Ok(lhs), Ok(rhs)) = (&res_a, &res_b) {
                for note in lhs.notes() {
                    prop_assert!(!rhs.notes().contains(note));
                }
            }
            if let Ok(lhs) = &res_a {
                prop_assert!(lhs.total() >= first);
            }
            if let Ok(rhs) = &res_b {
                prop_assert!(rhs.total() >= second);
            }
        }
    }
}
