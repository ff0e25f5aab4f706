//! Notes, note commitments and nullifiers.
//!
//! ## Note Structure
//!
//! | Field | Type | Description |
//! | ----- | ---- | ----------- |
//! | `address` | [`Address`] | Recipient `(d, pk_d)` |
//! | `kind` | [`NoteKind`] | Fungible amount or single NFT |
//! | `asset` | [`AssetId`] | Symbol (or NFT category) and issuing contract |
//! | `amount` | `u64` | Amount, or the NFT's token id |
//! | `rho` | [`Rho`] | Uniqueness input |
//! | `rseed` | [`RandomSeed`] | Seed of `rcm` and $\psi$ |
//! | `memo` | [`Memo`] | 512 bytes, encrypted only |
//! | `position` | `Option<u64>` | Leaf index once confirmed |
//!
//! ## Derivations
//!
//! $$\mathsf{rcm} = \text{ToScalar}(\text{PRF}^{\text{expand}}_{\mathsf{rseed}}([0\text{x}13] \| \rho))$$
//! $$\psi = \text{ToBase}(\text{PRF}^{\text{expand}}_{\mathsf{rseed}}([0\text{x}14] \| \rho))$$
//! $$\mathsf{cm} = \text{ToBase}(\text{BLAKE2b-512}(\text{"ZAction\_NoteCmmt"},
//!   d \| \mathsf{pk_d} \| \text{kind} \| \text{asset} \| v \| \rho \| \psi \| \mathsf{rcm}))$$
//! $$\mathsf{nf} = \text{ToBase}(\text{BLAKE2b-512}(\text{"ZAction\_Nullifie"},
//!   \mathsf{nk} \| \rho \| \psi \| \mathsf{cm} \| \text{position}))$$
//!
//! The nullifier depends on the secret `nk` and on the tree position, so the
//! same note content committed twice yields two distinct nullifiers.

use core::fmt;

use ff::{Field as _, FromUniformBytes as _, PrimeField as _};
use pasta_curves::{Fp, Fq};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::{
    address::Address,
    constants::{MEMO_LEN, NOTE_COMMITMENT_PERSONALIZATION, NULLIFIER_PERSONALIZATION, PrfExpand},
    keys::NullifierKey,
    value::{AssetId, NoteKind, ValueBase, ValueOverflow},
};

/// Uniqueness input $\rho$.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rho(#[serde(with = "crate::encoding::field")] Fp);

impl Rho {
    /// Sample a fresh $\rho$.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self(Fp::random(rng))
    }
}

impl From<Fp> for Rho {
    fn from(el: Fp) -> Self {
        Self(el)
    }
}

/// Seed of a note's commitment trapdoor and nullifier trapdoor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomSeed(#[serde(with = "crate::encoding")] [u8; 32]);

impl RandomSeed {
    /// Sample a fresh seed.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl From<[u8; 32]> for RandomSeed {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A memo longer than [`MEMO_LEN`] bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("memo is {0} bytes, at most {MEMO_LEN} allowed")]
pub struct MemoTooLong(pub usize);

/// A 512-byte note memo, zero padded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Memo([u8; MEMO_LEN]);

impl Memo {
    /// The empty memo.
    pub const EMPTY: Self = Self([0u8; MEMO_LEN]);

    /// Zero-pad `bytes` into a memo.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MemoTooLong> {
        if bytes.len() > MEMO_LEN {
            return Err(MemoTooLong(bytes.len()));
        }
        let mut memo = [0u8; MEMO_LEN];
        for (dst, src) in memo.iter_mut().zip(bytes) {
            *dst = *src;
        }
        Ok(Self(memo))
    }

    /// The memo bytes without trailing zero padding.
    #[must_use]
    pub fn trimmed(&self) -> &[u8] {
        let len = self.0.iter().rposition(|byte| *byte != 0).map_or(0, |last| last + 1);
        self.0.get(..len).unwrap_or_default()
    }

    /// The memo as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.trimmed()).into_owned()
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("Memo").field(&self.text()).finish()
    }
}

impl Serialize for Memo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::encoding::bytes::serialize(self.trimmed(), serializer)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for Memo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = crate::encoding::bytes::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

/// A zaction note.
///
/// Created by output construction or observed via chain scan; spent once
/// its nullifier appears on-chain. Notes without a `position` are pending
/// and never spendable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// The recipient.
    pub address: Address,
    /// Fungible amount or single NFT.
    pub kind: NoteKind,
    /// The token class.
    pub asset: AssetId,
    /// Amount, or the token id of an NFT.
    pub amount: u64,
    /// Uniqueness input.
    pub rho: Rho,
    /// Trapdoor seed.
    pub rseed: RandomSeed,
    /// Memo for the recipient.
    pub memo: Memo,
    /// Leaf index in the commitment tree once confirmed.
    #[serde(default)]
    pub position: Option<u64>,
}

impl Note {
    /// A fresh pending note with random $\rho$ and seed.
    pub fn new(
        address: Address,
        kind: NoteKind,
        asset: AssetId,
        amount: u64,
        memo: Memo,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        Self {
            address,
            kind,
            asset,
            amount,
            rho: Rho::random(&mut *rng),
            rseed: RandomSeed::random(rng),
            memo,
            position: None,
        }
    }

    /// The generator this note's value is committed under.
    #[must_use]
    pub const fn value_base(&self) -> ValueBase {
        match self.kind {
            NoteKind::Fungible => ValueBase::Fungible(self.asset),
            NoteKind::NonFungible => ValueBase::NonFungible(self.asset, self.amount),
            NoteKind::Auth => ValueBase::DUMMY,
        }
    }

    /// Value under [`value_base`](Self::value_base): the amount, one for
    /// an NFT, nothing for an auth token.
    pub fn value(&self) -> Result<i64, ValueOverflow> {
        match self.kind {
            NoteKind::Fungible => i64::try_from(self.amount).map_err(|_err| ValueOverflow(self.value_base())),
            NoteKind::NonFungible => Ok(1),
            NoteKind::Auth => Ok(0),
        }
    }

    fn rcm(&self) -> Fq {
        Fq::from_uniform_bytes(&PrfExpand::RCM.with(&self.rseed.0, &[&self.rho.0.to_repr()]))
    }

    fn psi(&self) -> Fp {
        Fp::from_uniform_bytes(&PrfExpand::PSI.with(&self.rseed.0, &[&self.rho.0.to_repr()]))
    }

    /// The note commitment `cm`.
    #[must_use]
    pub fn commitment(&self) -> Commitment {
        let kind: u8 = match self.kind {
            NoteKind::Fungible => 0,
            NoteKind::NonFungible => 1,
            NoteKind::Auth => 2,
        };
        let hash = blake2b_simd::Params::new()
            .hash_length(64)
            .personal(NOTE_COMMITMENT_PERSONALIZATION)
            .to_state()
            .update(&self.address.to_bytes())
            .update(&[kind])
            .update(&self.asset.symbol.to_le_bytes())
            .update(&self.asset.contract.value().to_le_bytes())
            .update(&self.amount.to_le_bytes())
            .update(&self.rho.0.to_repr())
            .update(&self.psi().to_repr())
            .update(&self.rcm().to_repr())
            .finalize();
        Commitment(Fp::from_uniform_bytes(hash.as_array()))
    }

    /// The nullifier revealed when this note, at `position`, is spent.
    #[must_use]
    pub fn nullifier(&self, nk: &NullifierKey, position: u64) -> Nullifier {
        let nk_bytes: [u8; 32] = (*nk).into();
        let hash = blake2b_simd::Params::new()
            .hash_length(64)
            .personal(NULLIFIER_PERSONALIZATION)
            .to_state()
            .update(&nk_bytes)
            .update(&self.rho.0.to_repr())
            .update(&self.psi().to_repr())
            .update(&self.commitment().0.to_repr())
            .update(&position.to_le_bytes())
            .finalize();
        Nullifier(Fp::from_uniform_bytes(hash.as_array()))
    }
}

/// A note commitment `cm`: the leaf appended to the commitment tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "crate::encoding::field")] Fp);

impl Commitment {
    /// Canonical 32-byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr()
    }

    /// Parse a canonical encoding.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(Fp::from_repr(*bytes)).map(Self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.to_bytes()))
    }
}

impl From<Fp> for Commitment {
    fn from(el: Fp) -> Self {
        Self(el)
    }
}

impl From<Commitment> for Fp {
    fn from(cm: Commitment) -> Self {
        cm.0
    }
}

/// A nullifier: the public marker revealed when a note is spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "crate::encoding::field")] Fp);

impl Nullifier {
    /// Canonical 32-byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr()
    }
}

impl From<Fp> for Nullifier {
    fn from(el: Fp) -> Self {
        Self(el)
    }
}

impl From<Nullifier> for Fp {
    fn from(nf: Nullifier) -> Self {
        nf.0
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::{keys::private::SpendingKey, name::Symbol};

    fn sample(rng: &mut StdRng, amount: u64) -> Note {
        let sk = SpendingKey::from([0x42u8; 32]);
        let ivk = sk.proof_authorizing_key().incoming_viewing_key();
        let address = ivk.address(sk.diversifier_key().diversifier(0));
        let asset = AssetId::fungible(Symbol::new("EOS", 4).unwrap(), "eosio.token".parse().unwrap());
        Note::new(address, NoteKind::Fungible, asset, amount, Memo::EMPTY, rng)
    }

    #[test]
    fn commitment_binds_every_field() {
        let mut rng = StdRng::seed_from_u64(0);
        let note = sample(&mut rng, 100);
        let cm = note.commitment();

        let mut other = note;
        other.amount = 101;
        assert_ne!(other.commitment(), cm);

        let mut other = note;
        other.rseed = RandomSeed::from([1u8; 32]);
        assert_ne!(other.commitment(), cm);

        let mut other = note;
        other.kind = NoteKind::NonFungible;
        assert_ne!(other.commitment(), cm);

        // position and memo are not committed
        let mut other = note;
        other.position = Some(9);
        other.memo = Memo::from_bytes(b"hi").unwrap();
        assert_eq!(other.commitment(), cm);
    }

    #[test]
    fn nullifier_depends_on_key_and_position() {
        let mut rng = StdRng::seed_from_u64(1);
        let note = sample(&mut rng, 5);
        let nk = SpendingKey::from([0x42u8; 32]).nullifier_key();
        let other_nk = SpendingKey::from([0x43u8; 32]).nullifier_key();

        assert_eq!(note.nullifier(&nk, 3), note.nullifier(&nk, 3));
        assert_ne!(note.nullifier(&nk, 3), note.nullifier(&nk, 4));
        assert_ne!(note.nullifier(&nk, 3), note.nullifier(&other_nk, 3));
    }

    #[test]
    fn memo_limits_and_text() {
        let memo = Memo::from_bytes(b"This is a test!").unwrap();
        assert_eq!(memo.text(), "This is a test!");
        assert_eq!(Memo::from_bytes(&[1u8; 513]), Err(MemoTooLong(513)));
        assert!(Memo::from_bytes(&[1u8; 512]).is_ok());
    }

    #[test]
    fn note_json_round_trip_keeps_commitment() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut note = sample(&mut rng, 77);
        note.memo = Memo::from_bytes(b"memo").unwrap();
        note.position = Some(12);

        let json = serde_json::to_string(&note).unwrap();
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
        assert_eq!(back.commitment(), note.commitment());
    }
}
