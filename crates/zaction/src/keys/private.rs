//! Private (signing) keys.

use ff::{Field as _, FromUniformBytes as _, PrimeField as _};
use pasta_curves::Fq;
use rand::{CryptoRng, RngCore};
use reddsa::orchard::{Binding, SpendAuth};

use super::{
    note::{DiversifierKey, NullifierKey},
    proof::ProofAuthorizingKey,
    public::{BindingVerificationKey, RandomizedVerificationKey, SpendValidatingKey},
    randomizer::SpendAuthRandomizer,
    signature::{BindingSignature, SpendAuthSignature},
};
use crate::constants::{PrfExpand, SEED_PERSONALIZATION};

/// A zaction spending key: raw 32-byte entropy.
///
/// The root key from which all other keys are derived. This key must
/// be kept secret as it provides full spending authority.
#[derive(Clone, Copy, Debug)]
pub struct SpendingKey([u8; 32]);

impl From<[u8; 32]> for SpendingKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl SpendingKey {
    /// Hash a wallet seed phrase into a spending key.
    ///
    /// $\mathsf{sk} = \text{BLAKE2b-256}(\text{"ZAction\_SeedHash"},
    /// \mathsf{seed})$
    ///
    /// Seed strength is the wallet's concern; any string is accepted here.
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        let hash = blake2b_simd::Params::new()
            .hash_length(32)
            .personal(SEED_PERSONALIZATION)
            .hash(seed.as_bytes());
        let mut sk = [0u8; 32];
        sk.copy_from_slice(hash.as_bytes());
        Self(sk)
    }

    /// Derive $\mathsf{ask}$ from $\mathsf{sk}$, matching Orchard §4.2.3.
    ///
    /// 1. $\mathsf{ask} =
    ///    \text{ToScalar}(\text{PRF}^{\text{expand}}_{\mathsf{sk}}([0\
    ///    text{x}10]))$ BLAKE2b-512 reduced to $\mathbb{F}_q$ via
    ///    `from_uniform_bytes`.
    /// 2. Assert $\mathsf{ask} \neq 0$ (vanishingly unlikely from uniform PRF
    ///    output).
    /// 3. **Sign normalization**: if $\mathsf{ak} =
    ///    [\mathsf{ask}]\,\mathcal{G}$ has $\tilde{y} = 1$, negate
    ///    $\mathsf{ask}$ so that $\mathsf{ak}$ has $\tilde{y} = 0$. Required by
    ///    RedPallas.
    #[must_use]
    pub fn spend_authorizing_key(&self) -> SpendAuthorizingKey {
        let ask = Fq::from_uniform_bytes(&PrfExpand::ASK.with(&self.0, &[]));

        assert!(!bool::from(ask.is_zero()), "ask key should not be zero");
        #[expect(clippy::expect_used, reason = "nonzero scalar")]
        let ret = SpendAuthorizingKey(
            reddsa::SigningKey::<SpendAuth>::try_from(ask.to_repr())
                .expect("ask can derive a valid signing key"),
        );

        let ak_bytes: [u8; 32] = ret.validating_key().into();
        if ak_bytes.last().is_some_and(|byte| byte >> 7u8 == 1) {
            #[expect(clippy::expect_used, reason = "-ask is nonzero when ask is")]
            SpendAuthorizingKey(
                reddsa::SigningKey::<SpendAuth>::try_from((-ask).to_repr())
                    .expect("-ask can derive a valid signing key"),
            )
        } else {
            ret
        }
    }

    /// Derive `nk = ToBase(PRF^expand_sk([0x11]))`.
    #[must_use]
    pub fn nullifier_key(&self) -> NullifierKey {
        NullifierKey::from_sk(&self.0)
    }

    /// Derive `dk = PRF^expand_sk([0x12])[..32]`.
    #[must_use]
    pub fn diversifier_key(&self) -> DiversifierKey {
        DiversifierKey::from_sk(&self.0)
    }

    /// Derive the proof authorizing key `(ak, nk)`.
    #[must_use]
    pub fn proof_authorizing_key(&self) -> ProofAuthorizingKey {
        ProofAuthorizingKey::new(
            self.spend_authorizing_key().validating_key(),
            self.nullifier_key(),
        )
    }
}

/// The spend authorizing key `ask`: a long-lived signing key derived
/// from [`SpendingKey`].
///
/// `ask` **cannot sign directly**. It must first produce a per-action
/// [`RandomizedSigningKey`] (`rsk`) via [`randomize`](Self::randomize).
#[derive(Clone, Copy, Debug)]
pub struct SpendAuthorizingKey(reddsa::SigningKey<SpendAuth>);

impl SpendAuthorizingKey {
    /// Derive the spend validating key: `ak = [ask]G`.
    #[must_use]
    pub fn validating_key(&self) -> SpendValidatingKey {
        SpendValidatingKey(reddsa::VerificationKey::from(&self.0))
    }

    /// Derive the per-action signing key: $\mathsf{rsk} = \mathsf{ask} +
    /// \alpha$.
    #[must_use]
    pub fn randomize(&self, alpha: &SpendAuthRandomizer) -> RandomizedSigningKey {
        RandomizedSigningKey(self.0.randomize(alpha.inner()))
    }
}

/// Randomized signing key `rsk`: per-action, ephemeral.
///
/// Produced by [`SpendAuthorizingKey::randomize`] (spends) or
/// [`for_output`](Self::for_output) (mints, dummies).
#[derive(Clone, Copy, Debug)]
pub struct RandomizedSigningKey(reddsa::SigningKey<SpendAuth>);

impl RandomizedSigningKey {
    /// Sign `msg` with this randomized key.
    pub fn sign(&self, rng: &mut (impl RngCore + CryptoRng), msg: &[u8]) -> SpendAuthSignature {
        SpendAuthSignature(self.0.sign(rng, msg))
    }

    /// Construct `rsk` for an action without a spend.
    ///
    /// There is no `ask`; `rsk = alpha` directly, giving `rk = [alpha]G`.
    #[must_use]
    pub fn for_output(alpha: &SpendAuthRandomizer) -> Self {
        #[expect(clippy::expect_used, reason = "randomizers are sampled nonzero")]
        let sk = reddsa::SigningKey::<SpendAuth>::try_from(alpha.inner().to_repr())
            .expect("random scalar yields valid signing key");
        Self(sk)
    }

    /// Derive the public key: `rk = [rsk]G`.
    #[must_use]
    pub fn public(&self) -> RandomizedVerificationKey {
        RandomizedVerificationKey(reddsa::VerificationKey::from(&self.0))
    }
}

/// Binding signing key $\mathsf{bsk}$: the scalar sum of all value
/// commitment trapdoors in a bundle.
///
/// $$\mathsf{bsk} := \boxplus_i \mathsf{rcv}_i$$
///
/// $\mathsf{bsk}$ is the discrete log of $\mathsf{bvk}$ with respect to
/// $\mathcal{R}$, because every per-asset $\mathcal{V}$ component cancels
/// against the declared value balance:
///
/// $$\mathsf{bvk} = \sum_i \mathsf{cv}_i - \sum_a [\mathsf{vb}_a]\,\mathcal{V}_a
///   = [\mathsf{bsk}]\,\mathcal{R}$$
///
/// Wraps `reddsa::SigningKey<Binding>`, whose generator is
/// $\mathcal{R}^{\mathsf{Orchard}}$.
#[derive(Clone, Copy, Debug)]
pub struct BindingSigningKey(reddsa::SigningKey<Binding>);

impl BindingSigningKey {
    /// Sign the bundle sighash.
    pub fn sign(&self, rng: &mut (impl RngCore + CryptoRng), msg: &[u8]) -> BindingSignature {
        BindingSignature(self.0.sign(rng, msg))
    }

    /// Derive $\mathsf{bvk} = [\mathsf{bsk}]\,\mathcal{R}$.
    ///
    /// Used for the implementation fault check: the key derived from
    /// trapdoor sums must match the key derived from value commitments.
    #[must_use]
    pub fn verification_key(&self) -> BindingVerificationKey {
        BindingVerificationKey(reddsa::VerificationKey::from(&self.0))
    }
}

impl TryFrom<Fq> for BindingSigningKey {
    type Error = reddsa::Error;

    fn try_from(el: Fq) -> Result<Self, Self::Error> {
        let inner = reddsa::SigningKey::<Binding>::try_from(el.to_repr())?;
        Ok(Self(inner))
    }
}
