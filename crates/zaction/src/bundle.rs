//! Bundles: the shielded part of a transaction.
//!
//! An [`UnprovenBundle`] leaves the builder holding witnesses and the
//! reservation on the notes it spends. The assembler proves and signs it
//! into a [`Bundle`], which holds only public data and is immutable.

use core::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{
    action::{Action, UnprovenAction},
    circuit::Instance,
    constants::SIGHASH_PERSONALIZATION,
    keys::{BindingSignature, public::BindingVerificationKey},
    note::{Commitment, Note, Nullifier},
    note_encryption::EncryptedNote,
    note_store::Reservation,
    tree::Anchor,
    value::ValueBalance,
};

/// A BLAKE2b-512 hash of the bundle's effecting data.
///
/// All signatures (action and binding) sign this same digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigHash([u8; 64]);

impl AsRef<[u8]> for SigHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compute the bundle sighash.
///
/// $$\text{sighash} = \text{BLAKE2b-512}(\text{"ZAction\_BndlHash"},\;
///   \text{anchor} \| \text{instance}_1 \| \text{ct}_1 \| \cdots \|
///   \text{instance}_n \| \text{ct}_n \| \text{balance})$$
///
/// Signatures and the proof are excluded.
#[must_use]
pub fn sighash<'item>(
    anchor: &Anchor,
    effecting_data: impl IntoIterator<Item = (&'item Instance, &'item [EncryptedNote])>,
    value_balance: &ValueBalance,
) -> SigHash {
    let mut state = blake2b_simd::Params::new()
        .hash_length(64)
        .personal(SIGHASH_PERSONALIZATION)
        .to_state();
    state.update(&anchor.to_bytes());
    for (instance, ciphertexts) in effecting_data {
        state.update(&instance.to_bytes());
        for ciphertext in ciphertexts {
            state.update(&ciphertext.to_bytes());
        }
    }
    state.update(&value_balance.to_bytes());
    SigHash(*state.finalize().as_array())
}

/// Everything the assembler needs to prove, sign and publish a bundle.
#[derive(Debug)]
pub struct UnprovenBundle {
    /// Root every spend is proved against.
    pub anchor: Anchor,
    /// Actions in bundle order, padding last.
    pub actions: Vec<UnprovenAction>,
    /// Net value per base crossing the pool boundary.
    pub value_balance: ValueBalance,
    /// Action indices produced by each descriptor, in descriptor order.
    pub spans: Vec<Range<usize>>,
    /// Outputs addressed back to the sender (change).
    pub own_outputs: Vec<Note>,
    /// Notes spent by this bundle.
    pub reservation: Reservation,
}

impl UnprovenBundle {
    /// The sighash the actions and the binding signature sign.
    #[must_use]
    pub fn sighash(&self) -> SigHash {
        sighash(
            &self.anchor,
            self.actions
                .iter()
                .map(|action| (&action.instance, action.ciphertexts.as_slice())),
            &self.value_balance,
        )
    }

    /// Every action's statement.
    #[must_use]
    pub fn instances(&self) -> Vec<Instance> {
        self.actions.iter().map(|action| action.instance).collect()
    }
}

/// A proved and signed bundle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bundle {
    /// Root every spend is proved against.
    pub anchor: Anchor,
    /// Signed actions.
    pub actions: Vec<Action>,
    /// Net value per base crossing the pool boundary.
    pub value_balance: ValueBalance,
    /// Signature under `bvk`.
    pub binding_sig: BindingSignature,
}

impl Bundle {
    /// The sighash the actions and the binding signature sign.
    #[must_use]
    pub fn sighash(&self) -> SigHash {
        sighash(
            &self.anchor,
            self.actions
                .iter()
                .map(|action| (&action.instance, action.ciphertexts.as_slice())),
            &self.value_balance,
        )
    }

    /// Every action's statement.
    #[must_use]
    pub fn instances(&self) -> Vec<Instance> {
        self.actions.iter().map(|action| action.instance).collect()
    }

    /// Verify the binding signature and every spend authorization
    /// signature against the one sighash.
    pub fn verify_signatures(&self) -> Result<(), reddsa::Error> {
        // bvk is recomputed from public data, never carried
        let bvk = BindingVerificationKey::derive(
            self.actions.iter().map(|action| &action.instance.cv),
            &self.value_balance,
        )?;
        let sighash = self.sighash();
        bvk.verify(sighash.as_ref(), &self.binding_sig)?;
        for action in &self.actions {
            action.verify_signature(sighash.as_ref())?;
        }
        Ok(())
    }

    /// Nullifiers revealed, in action order.
    #[must_use]
    pub fn nullifiers(&self) -> Vec<Nullifier> {
        self.actions.iter().filter_map(|action| action.instance.nf).collect()
    }

    /// New commitments with their ciphertexts, in append order.
    #[must_use]
    pub fn outputs(&self) -> Vec<(Commitment, EncryptedNote)> {
        self.actions
            .iter()
            .flat_map(|action| {
                action
                    .instance
                    .cm_b
                    .into_iter()
                    .chain(action.instance.cm_c)
                    .zip(action.ciphertexts.iter().cloned())
            })
            .collect()
    }
}
