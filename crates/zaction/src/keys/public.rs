#![expect(
    clippy::field_scoped_visibility_modifiers,
    reason = "implement key relationships within submodule"
)]

//! Public (verification) keys.

use pasta_curves::group::GroupEncoding as _;
use reddsa::orchard::{Binding, SpendAuth};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use super::{
    randomizer::SpendAuthRandomizer,
    signature::{BindingSignature, SpendAuthSignature},
};
use crate::value::{ValueBalance, ValueCommitment};

/// The spend validating key `ak = [ask]G`: the public counterpart of
/// [`SpendAuthorizingKey`](super::private::SpendAuthorizingKey).
///
/// The prover uses [`randomize`](Self::randomize) to check the per-action
/// `rk` a spend publishes.
#[derive(Clone, Copy, Debug)]
pub struct SpendValidatingKey(pub(super) reddsa::VerificationKey<SpendAuth>);

impl SpendValidatingKey {
    /// Derive the per-action verification key: $\mathsf{rk} = \mathsf{ak} +
    /// [\alpha]\,\mathcal{G}$.
    #[must_use]
    pub fn randomize(&self, alpha: &SpendAuthRandomizer) -> RandomizedVerificationKey {
        RandomizedVerificationKey(self.0.randomize(alpha.inner()))
    }
}

impl From<SpendValidatingKey> for [u8; 32] {
    fn from(ak: SpendValidatingKey) -> Self {
        ak.0.into()
    }
}

/// Randomized verification key `rk = ak + [alpha]G`: per-action, public.
///
/// The only key type that **can verify** spend authorization signatures.
#[derive(Clone, Copy, Debug)]
pub struct RandomizedVerificationKey(pub(super) reddsa::VerificationKey<SpendAuth>);

impl RandomizedVerificationKey {
    /// Verify a spend authorization signature.
    pub fn verify(&self, msg: &[u8], sig: &SpendAuthSignature) -> Result<(), reddsa::Error> {
        self.0.verify(msg, &sig.0)
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default ne/assert impls are correct"
)]
impl PartialEq for RandomizedVerificationKey {
    fn eq(&self, other: &Self) -> bool {
        <[u8; 32]>::from(*self) == <[u8; 32]>::from(*other)
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default assert_receiver_is_total_eq is correct"
)]
impl Eq for RandomizedVerificationKey {}

impl From<RandomizedVerificationKey> for [u8; 32] {
    fn from(rk: RandomizedVerificationKey) -> Self {
        rk.0.into()
    }
}

impl TryFrom<[u8; 32]> for RandomizedVerificationKey {
    type Error = reddsa::Error;

    fn try_from(bytes: [u8; 32]) -> Result<Self, Self::Error> {
        reddsa::VerificationKey::<SpendAuth>::try_from(bytes).map(Self)
    }
}

impl Serialize for RandomizedVerificationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::encoding::serialize(&<[u8; 32]>::from(*self), serializer)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for RandomizedVerificationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: [u8; 32] = crate::encoding::deserialize(deserializer)?;
        Self::try_from(bytes).map_err(D::Error::custom)
    }
}

/// Binding verification key $\mathsf{bvk}$: derived from value
/// commitments.
///
/// $$\mathsf{bvk} := \left(\bigoplus_i \mathsf{cv}_i\right) \ominus
///   \bigoplus_a [\mathsf{vb}_a]\,\mathcal{V}_a$$
///
/// Sum all action value commitments, then subtract the zero-randomness
/// commitment to every asset's declared balance. This key is **not encoded
/// in the transaction**; validators recompute it from public data.
///
/// When every asset balances, only the $\mathcal{R}$ component survives and
/// $\mathsf{bvk} = [\mathsf{bsk}]\,\mathcal{R}$.
#[derive(Clone, Copy, Debug)]
pub struct BindingVerificationKey(pub(super) reddsa::VerificationKey<Binding>);

impl BindingVerificationKey {
    /// Validator-side derivation from public bundle data.
    ///
    /// Fails only when the sum is the identity, which no honestly built
    /// bundle produces.
    pub fn derive<'cv>(
        commitments: impl IntoIterator<Item = &'cv ValueCommitment>,
        balance: &ValueBalance,
    ) -> Result<Self, reddsa::Error> {
        let cv_sum: ValueCommitment = commitments.into_iter().copied().sum();
        let bvk = cv_sum - balance.commitment();
        let bytes: [u8; 32] = bvk.point().to_bytes();
        reddsa::VerificationKey::<Binding>::try_from(bytes).map(Self)
    }

    /// Verify a binding signature.
    pub fn verify(&self, msg: &[u8], sig: &BindingSignature) -> Result<(), reddsa::Error> {
        self.0.verify(msg, &sig.0)
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default ne/assert impls are correct"
)]
impl PartialEq for BindingVerificationKey {
    fn eq(&self, other: &Self) -> bool {
        <[u8; 32]>::from(self.0) == <[u8; 32]>::from(other.0)
    }
}

#[expect(
    clippy::missing_trait_methods,
    reason = "default assert_receiver_is_total_eq is correct"
)]
impl Eq for BindingVerificationKey {}
