//! Proof authorizing key.

use super::{note::IncomingViewingKey, note::NullifierKey, public::SpendValidatingKey};
use crate::constants::IVK_PERSONALIZATION;

/// Proof authorizing key `(ak, nk)`.
///
/// Everything the action circuit needs to prove a spend: `ak` to check
/// `rk`, `nk` to check the nullifier, and both to check that the spent
/// note's address belongs to this wallet. Confers no spend authority.
#[derive(Clone, Copy, Debug)]
pub struct ProofAuthorizingKey {
    ak: SpendValidatingKey,
    nk: NullifierKey,
}

impl ProofAuthorizingKey {
    pub(super) const fn new(ak: SpendValidatingKey, nk: NullifierKey) -> Self {
        Self { ak, nk }
    }

    /// The spend validating key.
    #[must_use]
    pub const fn ak(&self) -> &SpendValidatingKey {
        &self.ak
    }

    /// The nullifier key.
    #[must_use]
    pub const fn nk(&self) -> &NullifierKey {
        &self.nk
    }

    /// `ivk = BLAKE2b-256("ZAction_IvkDeriv", ak || nk)`
    #[must_use]
    pub fn incoming_viewing_key(&self) -> IncomingViewingKey {
        let ak: [u8; 32] = self.ak.into();
        let nk: [u8; 32] = self.nk.into();
        let hash = blake2b_simd::Params::new()
            .hash_length(32)
            .personal(IVK_PERSONALIZATION)
            .to_state()
            .update(&ak)
            .update(&nk)
            .finalize();
        let mut ivk = [0u8; 32];
        ivk.copy_from_slice(hash.as_bytes());
        IncomingViewingKey::from_bytes(ivk)
    }
}
