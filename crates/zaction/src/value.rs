//! Assets, value commitments and per-asset value balances.
//!
//! A value commitment hides the net value an action moves:
//! `cv = [v]V_asset + [rcv]R`, where every asset (and every individual NFT)
//! has its own generator `V_asset` and `rcv` is the
//! [`ValueCommitTrapdoor`]. Because the generators are independent, a bundle
//! balances per asset or not at all.

use core::{fmt, iter, ops};

use ff::Field as _;
use group::{Group as _, GroupEncoding as _};
use lazy_static::lazy_static;
use pasta_curves::{Fq, arithmetic::CurveExt as _, pallas};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::{
    constants::{VALUE_COMMITMENT_R_DOMAIN, VALUE_COMMITMENT_V_DOMAIN},
    name::{Name, Symbol},
};

lazy_static! {
    /// The randomness generator `R`, shared with `reddsa::orchard::Binding`.
    static ref R: pallas::Point = pallas::Point::hash_to_curve(VALUE_COMMITMENT_R_DOMAIN)(b"r");
}

/// A token class: symbol (or NFT category) and issuing contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId {
    /// Fungible: packed symbol with precision. Non-fungible: category.
    pub symbol: u64,
    /// Ledger account that issues the token.
    pub contract: Name,
}

impl AssetId {
    /// Asset id for a fungible token.
    #[must_use]
    pub const fn fungible(symbol: Symbol, contract: Name) -> Self {
        Self {
            symbol: symbol.value(),
            contract,
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}@{}", Symbol::from(self.symbol), self.contract)
    }
}

/// Whether a note holds an amount of a fungible token, one NFT or an
/// authorization token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NoteKind {
    /// Amount of a fungible token.
    Fungible,
    /// A single NFT; the note's amount is the token id.
    NonFungible,
    /// A contract-issued authorization token. It carries no value; the
    /// issuing contract recognizes it by its commitment when it is burned.
    Auth,
}

/// The generator a value is committed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueBase {
    /// All units of a fungible token share one generator.
    Fungible(AssetId),
    /// Every NFT `(asset, id)` has its own generator and a value of one.
    NonFungible(AssetId, u64),
}

impl ValueBase {
    /// Base used by dummy padding actions; they commit to zero, so any
    /// generator works.
    pub(crate) const DUMMY: Self = Self::Fungible(AssetId {
        symbol: 0,
        contract: Name::ZERO,
    });

    /// The asset class.
    #[must_use]
    pub const fn asset(&self) -> &AssetId {
        match self {
            Self::Fungible(asset) | Self::NonFungible(asset, _) => asset,
        }
    }

    /// Canonical encoding, hashed to the generator and into sighashes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 25] {
        let (tag, asset, id) = match *self {
            Self::Fungible(asset) => (0u8, asset, 0u64),
            Self::NonFungible(asset, id) => (1u8, asset, id),
        };
        let mut out = [0u8; 25];
        let parts = iter::once(tag)
            .chain(asset.symbol.to_le_bytes())
            .chain(asset.contract.value().to_le_bytes())
            .chain(id.to_le_bytes());
        for (dst, src) in out.iter_mut().zip(parts) {
            *dst = src;
        }
        out
    }

    /// The value generator `V_base`.
    #[must_use]
    pub fn generator(&self) -> pallas::Point {
        pallas::Point::hash_to_curve(VALUE_COMMITMENT_V_DOMAIN)(&self.to_bytes())
    }
}

/// A signed value as a scalar: `[v]` for `v` in `i64`.
fn signed_scalar(value: i64) -> Fq {
    let magnitude = Fq::from(value.unsigned_abs());
    if value < 0 { -magnitude } else { magnitude }
}

/// Value commitment trapdoor `rcv`: the randomness in a Pedersen commitment.
///
/// Each action gets a fresh trapdoor. The binding signing key is the sum of
/// all trapdoors in a bundle.
#[derive(Clone, Copy, Debug)]
pub struct ValueCommitTrapdoor(Fq);

impl ValueCommitTrapdoor {
    /// Generate a fresh random trapdoor.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self(Fq::random(rng))
    }
}

impl From<ValueCommitTrapdoor> for Fq {
    fn from(rcv: ValueCommitTrapdoor) -> Self {
        rcv.0
    }
}

impl iter::Sum<ValueCommitTrapdoor> for Fq {
    fn sum<I: Iterator<Item = ValueCommitTrapdoor>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, rcv| acc + rcv.0)
    }
}

/// A value commitment `cv = [v]V_base + [rcv]R`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueCommitment(pallas::Point);

impl ValueCommitment {
    /// Commit to a signed net value under `base`.
    #[must_use]
    pub fn derive(value: i64, base: &ValueBase, rcv: ValueCommitTrapdoor) -> Self {
        Self(base.generator() * signed_scalar(value) + *R * rcv.0)
    }

    /// The commitment point.
    #[must_use]
    pub const fn point(&self) -> &pallas::Point {
        &self.0
    }

    /// Compressed 32-byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Parse a compressed encoding.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(pallas::Point::from_bytes(bytes)).map(Self)
    }
}

impl ops::Add for ValueCommitment {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl ops::Sub for ValueCommitment {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl iter::Sum for ValueCommitment {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self(pallas::Point::identity()), |acc, cv| acc + cv)
    }
}

impl Serialize for ValueCommitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::encoding::serialize(&self.to_bytes(), serializer)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for ValueCommitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: [u8; 32] = crate::encoding::deserialize(deserializer)?;
        Self::from_bytes(&bytes).ok_or_else(|| D::Error::custom("invalid value commitment"))
    }
}

/// A sum left `i64` range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("value of {0:?} overflows")]
pub struct ValueOverflow(pub ValueBase);

/// Net value a bundle moves across the shielded boundary, per value base.
///
/// Positive entries leave the pool (burns), negative entries enter it
/// (mints). Entries are sorted by base and never zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBalance(Vec<(ValueBase, i64)>);

impl ValueBalance {
    /// Add `delta` to the entry for `base`.
    pub fn add(&mut self, base: ValueBase, delta: i64) -> Result<(), ValueOverflow> {
        match self.0.binary_search_by(|entry| entry.0.cmp(&base)) {
            Ok(found) => {
                let entry = self.0.get_mut(found).ok_or(ValueOverflow(base))?;
                entry.1 = entry.1.checked_add(delta).ok_or(ValueOverflow(base))?;
                if entry.1 == 0 {
                    self.0.remove(found);
                }
            }
            Err(slot) => {
                if delta != 0 {
                    self.0.insert(slot, (base, delta));
                }
            }
        }
        Ok(())
    }

    /// The net value for `base` (zero when absent).
    #[must_use]
    pub fn get(&self, base: &ValueBase) -> i64 {
        self.0
            .iter()
            .find(|entry| entry.0 == *base)
            .map_or(0, |entry| entry.1)
    }

    /// Iterate the nonzero entries in base order.
    pub fn iter(&self) -> impl Iterator<Item = &(ValueBase, i64)> {
        self.0.iter()
    }

    /// Whether nothing crosses the pool boundary.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero-randomness commitment `Σ [v_a]V_a`.
    #[must_use]
    pub fn commitment(&self) -> ValueCommitment {
        ValueCommitment(
            self.0
                .iter()
                .map(|(base, value)| base.generator() * signed_scalar(*value))
                .fold(pallas::Point::identity(), |acc, term| acc + term),
        )
    }

    /// Canonical encoding for the sighash.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 33);
        for (base, value) in &self.0 {
            out.extend_from_slice(&base.to_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;

    fn eos() -> AssetId {
        AssetId::fungible(Symbol::new("EOS", 4).unwrap(), "eosio.token".parse().unwrap())
    }

    #[test]
    fn commitments_are_homomorphic() {
        let mut rng = StdRng::seed_from_u64(0);
        let base = ValueBase::Fungible(eos());
        let rcv_a = ValueCommitTrapdoor::random(&mut rng);
        let rcv_b = ValueCommitTrapdoor::random(&mut rng);
        let sum = ValueCommitTrapdoor(rcv_a.0 + rcv_b.0);

        let lhs = ValueCommitment::derive(100, &base, rcv_a) + ValueCommitment::derive(-30, &base, rcv_b);
        assert_eq!(lhs, ValueCommitment::derive(70, &base, sum));
    }

    /// Value under one asset cannot stand in for value under another.
    #[test]
    fn generators_are_per_asset() {
        let fungible = ValueBase::Fungible(eos());
        let first_nft = ValueBase::NonFungible(eos(), 1);
        let second_nft = ValueBase::NonFungible(eos(), 2);
        assert_ne!(fungible.generator(), first_nft.generator());
        assert_ne!(first_nft.generator(), second_nft.generator());
    }

    #[test]
    fn balance_drops_zero_entries() {
        let base = ValueBase::Fungible(eos());
        let mut balance = ValueBalance::default();
        balance.add(base, -10).unwrap();
        assert_eq!(balance.get(&base), -10);
        balance.add(base, 10).unwrap();
        assert!(balance.is_empty());
        balance.add(base, i64::MAX).unwrap();
        assert_eq!(balance.add(base, 1), Err(ValueOverflow(base)));
    }

    #[test]
    fn balance_commitment_cancels_matching_values() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = ValueBase::Fungible(eos());
        let rcv = ValueCommitTrapdoor::random(&mut rng);
        let mut balance = ValueBalance::default();
        balance.add(base, 42).unwrap();

        let cv = ValueCommitment::derive(42, &base, rcv);
        let zero = ValueCommitment::derive(0, &base, rcv);
        assert_eq!(cv - balance.commitment(), zero);
    }
}
