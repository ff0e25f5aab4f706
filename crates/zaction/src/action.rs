//! Actions: one spend, one output and an optional change output.
//!
//! The builder produces [`UnprovenAction`]s (statement, witness and
//! ciphertexts); after proving, each is signed into an [`Action`] whose
//! fields are all public.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    circuit::{ActionWitness, Instance},
    keys::{SpendAuthSignature, private::RandomizedSigningKey},
    note_encryption::EncryptedNote,
};

/// A signed action as published on chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    /// The public statement.
    pub instance: Instance,
    /// Ciphertexts of `cm_b` then `cm_c`, for those present.
    pub ciphertexts: Vec<EncryptedNote>,
    /// Spend authorization signature under `instance.rk`.
    pub sig: SpendAuthSignature,
}

impl Action {
    /// Verify the spend authorization signature over `sighash`.
    pub fn verify_signature(&self, sighash: &[u8]) -> Result<(), reddsa::Error> {
        self.instance.rk.verify(sighash, &self.sig)
    }
}

/// An action awaiting its proof and signature.
#[derive(Clone, Debug)]
pub struct UnprovenAction {
    /// The public statement.
    pub instance: Instance,
    /// Private inputs.
    pub witness: ActionWitness,
    /// Ciphertexts of the committed outputs.
    pub ciphertexts: Vec<EncryptedNote>,
}

impl UnprovenAction {
    /// Attach a spend authorization signature produced by custody.
    #[must_use]
    pub fn authorize(&self, sig: SpendAuthSignature) -> Action {
        Action {
            instance: self.instance,
            ciphertexts: self.ciphertexts.clone(),
            sig,
        }
    }

    /// Sign an action without a spend: `rsk = alpha`.
    ///
    /// Returns `None` for spends, which only custody can sign.
    pub fn sign_output(&self, sighash: &[u8], rng: &mut (impl RngCore + CryptoRng)) -> Option<Action> {
        if self.witness.spend.is_some() {
            return None;
        }
        let rsk = RandomizedSigningKey::for_output(&self.witness.alpha);
        Some(self.authorize(rsk.sign(rng, sighash)))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::{
        descriptor::ZActionType,
        keys::SpendAuthRandomizer,
        value::ValueCommitTrapdoor,
    };

    #[test]
    fn outputless_action_signs_with_alpha() {
        let mut rng = StdRng::seed_from_u64(0);
        let witness = ActionWitness {
            spend: None,
            output: None,
            change: None,
            alpha: SpendAuthRandomizer::random(&mut rng),
            rcv: ValueCommitTrapdoor::random(&mut rng),
        };
        let instance = witness.instance(ZActionType::Null, None).unwrap();
        let unproven = UnprovenAction {
            instance,
            witness,
            ciphertexts: Vec::new(),
        };

        let action = unproven.sign_output(b"sighash", &mut rng).unwrap();
        action.verify_signature(b"sighash").unwrap();
        assert!(action.verify_signature(b"other").is_err());
    }
}
