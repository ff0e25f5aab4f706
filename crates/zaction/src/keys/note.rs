//! Note-related keys: NullifierKey, DiversifierKey, IncomingViewingKey.

use ff::{FromUniformBytes as _, PrimeField as _};
use pasta_curves::Fp;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    address::{Address, Diversifier},
    constants::{ADDRESS_SECRET_PERSONALIZATION, DIVERSIFIER_PERSONALIZATION, PrfExpand},
};

/// The nullifier deriving key `nk`.
///
/// Observes when notes are spent. `nk` alone does NOT confer spend
/// authority.
#[derive(Clone, Copy, Debug)]
pub struct NullifierKey(Fp);

impl NullifierKey {
    /// Derive `nk` from raw spending key bytes.
    pub(super) fn from_sk(sk: &[u8; 32]) -> Self {
        Self(Fp::from_uniform_bytes(&PrfExpand::NK.with(sk, &[])))
    }
}

impl From<NullifierKey> for Fp {
    fn from(nk: NullifierKey) -> Self {
        nk.0
    }
}

impl From<NullifierKey> for [u8; 32] {
    fn from(nk: NullifierKey) -> Self {
        nk.0.to_repr()
    }
}

/// The diversifier key `dk`: one [`Diversifier`] per address index.
#[derive(Clone, Copy, Debug)]
pub struct DiversifierKey([u8; 32]);

impl DiversifierKey {
    pub(super) fn from_sk(sk: &[u8; 32]) -> Self {
        let expanded = PrfExpand::DK.with(sk, &[]);
        let mut dk = [0u8; 32];
        for (dst, src) in dk.iter_mut().zip(expanded) {
            *dst = src;
        }
        Self(dk)
    }

    /// `d_index = BLAKE2b-88("ZAction_Diversfy", dk || index)`
    #[must_use]
    pub fn diversifier(&self, index: u32) -> Diversifier {
        let hash = blake2b_simd::Params::new()
            .hash_length(11)
            .personal(DIVERSIFIER_PERSONALIZATION)
            .to_state()
            .update(&self.0)
            .update(&index.to_le_bytes())
            .finalize();
        let mut raw = [0u8; 11];
        raw.copy_from_slice(hash.as_bytes());
        Diversifier::from(raw)
    }
}

/// The incoming viewing key `ivk`.
///
/// Derives the X25519 key pair behind every address and so decrypts every
/// note sent to the wallet.
#[derive(Clone, Copy, Debug)]
pub struct IncomingViewingKey([u8; 32]);

impl IncomingViewingKey {
    pub(super) const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The X25519 secret for the address at `diversifier`.
    #[must_use]
    pub fn secret(&self, diversifier: &Diversifier) -> StaticSecret {
        let hash = blake2b_simd::Params::new()
            .hash_length(32)
            .personal(ADDRESS_SECRET_PERSONALIZATION)
            .to_state()
            .update(&self.0)
            .update(diversifier.as_bytes())
            .finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash.as_bytes());
        StaticSecret::from(bytes)
    }

    /// The address at `diversifier`: `pk_d = X25519(secret_d, basepoint)`.
    #[must_use]
    pub fn address(&self, diversifier: Diversifier) -> Address {
        let pk_d = PublicKey::from(&self.secret(&diversifier));
        Address::from_parts(diversifier, pk_d.to_bytes())
    }
}
