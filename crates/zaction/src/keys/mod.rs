//! ## Key Hierarchy
//!
//! ```mermaid
//! flowchart TB
//!     seed[wallet seed]
//!     sk[SpendingKey]
//!     ask[SpendAuthorizingKey ask]
//!     ak[SpendValidatingKey ak]
//!     nk[NullifierKey nk]
//!     dk[DiversifierKey dk]
//!     pak[ProofAuthorizingKey]
//!     ivk[IncomingViewingKey ivk]
//!     addr["Address (d, pk_d)"]
//!     seed --> sk
//!     sk --> ask & nk & dk
//!     ask --> ak
//!     ak & nk --> pak
//!     pak --> ivk
//!     dk -- index --> d[Diversifier d]
//!     ivk & d --> addr
//!     alpha["SpendAuthRandomizer alpha"] -- "ask + alpha" --> rsk[RandomizedSigningKey]
//!     rsk --> rk[RandomizedVerificationKey]
//! ```
//!
//! ### Private keys ([`private`])
//!
//! - `sk`: Root spending key (full authority), hashed from the wallet seed
//! - `ask`: Authorizes spends (long-lived, cannot sign directly)
//! - `rsk = ask + alpha`: Per-action signing key
//! - `bsk = Σrcvᵢ`: Binding signing key (per-bundle)
//!
//! ### Public keys ([`public`])
//!
//! - `ak`: Public counterpart of `ask`
//! - `rk = ak + [alpha]G`: Per-action verification key
//! - `bvk`: Binding verification key (derived from value commitments)
//!
//! ### Viewing keys
//!
//! - `nk`: Nullifier derivation (observes spends)
//! - `dk`: Diversifier derivation (one address per index)
//! - `ivk`: Derives every address's transmission key and decrypts notes
//!
//! ### Proof keys
//!
//! - `pak`: `ak` + `nk`. Everything the action circuit needs to prove a
//!   spend, without spend authority.

pub mod private;
pub mod public;

mod note;
mod proof;
mod randomizer;
mod signature;

// Re-exports: public API surface.
pub use note::{DiversifierKey, IncomingViewingKey, NullifierKey};
pub use proof::ProofAuthorizingKey;
pub use randomizer::SpendAuthRandomizer;
pub use signature::{BindingSignature, SpendAuthSignature};

#[cfg(test)]
mod tests {
    use ff::{FromUniformBytes as _, PrimeField as _};
    use pasta_curves::Fq;
    use rand::{RngCore as _, SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::constants::PrfExpand;

    /// RedPallas requires ak to have tilde_y = 0 (sign bit cleared).
    /// Verifies both code paths: keys that needed negation and keys that
    /// didn't.
    #[test]
    fn ask_sign_normalization() {
        use reddsa::orchard::SpendAuth;

        let mut rng = StdRng::seed_from_u64(0);
        let mut flipped = 0u32;
        for _ in 0u8..20 {
            let mut sk_bytes = [0u8; 32];
            rng.fill_bytes(&mut sk_bytes);

            let ask_scalar = Fq::from_uniform_bytes(&PrfExpand::ASK.with(&sk_bytes, &[]));
            let unnormalized_ak: [u8; 32] = reddsa::VerificationKey::from(
                &reddsa::SigningKey::<SpendAuth>::try_from(ask_scalar.to_repr()).unwrap(),
            )
            .into();
            if unnormalized_ak[31] >> 7u8 == 1u8 {
                flipped += 1;
            }

            let sk = private::SpendingKey::from(sk_bytes);
            let ak_bytes: [u8; 32] = sk.spend_authorizing_key().validating_key().into();
            assert_eq!(ak_bytes[31] >> 7u8, 0u8, "ak sign bit must be 0");
        }
        assert!(flipped > 0 && flipped < 20, "both paths exercised: {flipped}");
    }

    /// The signer's `rk` (from `rsk = ask + alpha`) equals the prover's
    /// `rk` (from `ak + [alpha]G`).
    #[test]
    fn rsk_public_equals_ak_randomized() {
        let mut rng = StdRng::seed_from_u64(1);
        let sk = private::SpendingKey::from([0x42u8; 32]);
        let ask = sk.spend_authorizing_key();
        let ak = ask.validating_key();
        let alpha = SpendAuthRandomizer::random(&mut rng);

        let from_signer: [u8; 32] = ask.randomize(&alpha).public().into();
        let from_prover: [u8; 32] = ak.randomize(&alpha).into();

        assert_eq!(from_signer, from_prover);
    }

    /// Seeds are hashed, so nearby seeds give unrelated keys.
    #[test]
    fn seed_derivation_is_deterministic() {
        let first = private::SpendingKey::from_seed("this is a sufficiently long seed!");
        let again = private::SpendingKey::from_seed("this is a sufficiently long seed!");
        let other = private::SpendingKey::from_seed("this is a sufficiently long seed?");

        let ak = |sk: &private::SpendingKey| -> [u8; 32] { sk.spend_authorizing_key().validating_key().into() };
        assert_eq!(ak(&first), ak(&again));
        assert_ne!(ak(&first), ak(&other));
    }
}
