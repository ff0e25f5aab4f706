//! The action statement and its constraints.
//!
//! Every action publishes an [`Instance`] and is proved from an
//! [`ActionWitness`]. [`check`] evaluates the action circuit's constraints
//! natively; the proving backend only ever sees witnesses that pass it.
//!
//! | Constraint | Statement |
//! | ---------- | --------- |
//! | Shape | the type fixes which of `nf`, `cm_b`, `cm_c` and the public value exist |
//! | Membership | `MerkleCRH` path from `cm_a` hashes to the anchor |
//! | Nullifier | `nf = DeriveNullifier_nk(note_a, position)` |
//! | Ownership | `note_a.address = ivk(ak, nk).address(d)` |
//! | Spend authority | `rk = ak + [alpha]G`, or `[alpha]G` without a spend |
//! | Outputs | `cm_b`, `cm_c` open to the output and change notes |
//! | Auth token | an auth burn reveals `cm_a`; every note is of the type's kind |
//! | Asset | every note and the public value share one value base |
//! | Balance | `v_a - v_b - v_c` is zero, `-public` for mints, `+public` for burns |
//! | Value commitment | `cv = [net]V_base + [rcv]R` |

use serde::{Deserialize, Serialize};

use crate::{
    descriptor::ZActionType,
    keys::{ProofAuthorizingKey, SpendAuthRandomizer, private::RandomizedSigningKey, public::RandomizedVerificationKey},
    name::Name,
    note::{Commitment, Memo, Note, Nullifier},
    tree::{Anchor, MerklePath},
    value::{ValueBase, ValueCommitTrapdoor, ValueCommitment, ValueOverflow},
};

/// Value crossing the pool boundary in a mint or burn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicValue {
    /// The value base moved.
    pub base: ValueBase,
    /// Units moved (one for an NFT).
    pub amount: u64,
    /// Ledger account receiving a burn.
    pub account: Option<Name>,
    /// Memo of the ledger transfer.
    pub memo: Memo,
}

/// The public statement of one action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Operation.
    pub za_type: ZActionType,
    /// Nullifier of the spent note.
    pub nf: Option<Nullifier>,
    /// Randomized verification key the action is signed under.
    pub rk: RandomizedVerificationKey,
    /// Commitment to the action's net value.
    pub cv: ValueCommitment,
    /// Recipient output commitment.
    pub cm_b: Option<Commitment>,
    /// Change output commitment.
    pub cm_c: Option<Commitment>,
    /// Minted or burned value.
    pub public_value: Option<PublicValue>,
    /// Commitment of the auth token an auth burn consumes.
    pub auth: Option<Commitment>,
}

fn push_optional(out: &mut Vec<u8>, field: Option<[u8; 32]>) {
    match field {
        Some(bytes) => {
            out.push(1);
            out.extend_from_slice(&bytes);
        }
        None => out.push(0),
    }
}

impl Instance {
    /// Canonical encoding: the proof statement and the sighash input.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&self.za_type.code().to_le_bytes());
        push_optional(&mut out, self.nf.map(|nf| nf.to_bytes()));
        out.extend_from_slice(&<[u8; 32]>::from(self.rk));
        out.extend_from_slice(&self.cv.to_bytes());
        push_optional(&mut out, self.cm_b.map(|cm| cm.to_bytes()));
        push_optional(&mut out, self.cm_c.map(|cm| cm.to_bytes()));
        match self.public_value {
            Some(public) => {
                out.push(1);
                out.extend_from_slice(&public.base.to_bytes());
                out.extend_from_slice(&public.amount.to_le_bytes());
                out.extend_from_slice(&public.account.map_or(0, Name::value).to_le_bytes());
                let memo = public.memo.trimmed();
                out.extend_from_slice(&u16::try_from(memo.len()).unwrap_or(u16::MAX).to_le_bytes());
                out.extend_from_slice(memo);
            }
            None => out.push(0),
        }
        push_optional(&mut out, self.auth.map(|cm| cm.to_bytes()));
        out
    }

    /// The statement proved for this action under `anchor`.
    #[must_use]
    pub fn statement(&self, anchor: &Anchor) -> Vec<u8> {
        let mut out = anchor.to_bytes().to_vec();
        out.append(&mut self.to_bytes());
        out
    }
}

/// The spent note and what proves it is spendable.
#[derive(Clone, Debug)]
pub struct SpendWitness {
    /// The note being spent.
    pub note: Note,
    /// Its authentication path.
    pub path: MerklePath,
    /// Spender's proof authorizing key.
    pub pak: ProofAuthorizingKey,
}

/// Private inputs of one action.
#[derive(Clone, Debug)]
pub struct ActionWitness {
    /// `note_a`.
    pub spend: Option<SpendWitness>,
    /// `note_b`: the recipient output.
    pub output: Option<Note>,
    /// `note_c`: change back to the sender.
    pub change: Option<Note>,
    /// Spend authorization randomizer.
    pub alpha: SpendAuthRandomizer,
    /// Value commitment trapdoor.
    pub rcv: ValueCommitTrapdoor,
}

impl ActionWitness {
    /// The value base shared by the action's notes, or the padding base.
    #[must_use]
    pub fn value_base(&self, public: Option<&PublicValue>) -> ValueBase {
        self.spend
            .as_ref()
            .map(|spend| spend.note.value_base())
            .or_else(|| self.output.map(|note| note.value_base()))
            .or_else(|| self.change.map(|note| note.value_base()))
            .or_else(|| public.map(|value| value.base))
            .unwrap_or(ValueBase::DUMMY)
    }

    /// `v_a - v_b - v_c`.
    pub fn net_value(&self) -> Result<i64, ValueOverflow> {
        let base = self.value_base(None);
        let overflow = || ValueOverflow(base);
        let spent = self.spend.as_ref().map_or(Ok(0), |spend| spend.note.value())?;
        let output = self.output.map_or(Ok(0), |note| note.value())?;
        let change = self.change.map_or(Ok(0), |note| note.value())?;
        spent
            .checked_sub(output)
            .and_then(|rest| rest.checked_sub(change))
            .ok_or_else(overflow)
    }

    /// The randomized verification key this action is signed under.
    #[must_use]
    pub fn rk(&self) -> RandomizedVerificationKey {
        match self.spend.as_ref() {
            Some(spend) => spend.pak.ak().randomize(&self.alpha),
            None => RandomizedSigningKey::for_output(&self.alpha).public(),
        }
    }

    /// Derive the public statement this witness satisfies.
    pub fn instance(&self, za_type: ZActionType, public_value: Option<PublicValue>) -> Result<Instance, ValueOverflow> {
        let nf = self.spend.as_ref().and_then(|spend| {
            spend
                .note
                .position
                .map(|position| spend.note.nullifier(spend.pak.nk(), position))
        });
        let base = self.value_base(public_value.as_ref());
        let auth = self
            .spend
            .as_ref()
            .filter(|_| za_type == ZActionType::BurnAuth)
            .map(|spend| spend.note.commitment());
        Ok(Instance {
            za_type,
            nf,
            rk: self.rk(),
            cv: ValueCommitment::derive(self.net_value()?, &base, self.rcv),
            cm_b: self.output.map(|note| note.commitment()),
            cm_c: self.change.map(|note| note.commitment()),
            public_value,
            auth,
        })
    }
}

/// An unsatisfied action constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    /// Inputs present or absent contrary to the action type.
    #[error("action shape does not match its type")]
    Shape,

    /// The spent note is not in the anchored tree.
    #[error("merkle path does not hash to the anchor")]
    Anchor,

    /// Published nullifier does not match the spent note.
    #[error("nullifier mismatch")]
    Nullifier,

    /// The spent note is not addressed to the proving key.
    #[error("spent note not owned by the proving key")]
    Ownership,

    /// `rk` is not derived from `ak` and `alpha`.
    #[error("randomized verification key mismatch")]
    SpendAuthority,

    /// `cm_b` does not open to the output note.
    #[error("output commitment mismatch")]
    OutputCommitment,

    /// `cm_c` does not open to the change note.
    #[error("change commitment mismatch")]
    ChangeCommitment,

    /// An auth burn does not reveal the commitment of its token.
    #[error("auth token commitment mismatch")]
    AuthToken,

    /// Notes or public value under different value bases, or a note of
    /// another kind than the action type moves.
    #[error("asset mismatch")]
    Asset,

    /// Net value does not match the action type.
    #[error("action does not balance")]
    Balance,

    /// `cv` does not open to the net value.
    #[error("value commitment mismatch")]
    ValueCommitment,
}

fn expect_shape(condition: bool) -> Result<(), ConstraintError> {
    if condition {
        Ok(())
    } else {
        Err(ConstraintError::Shape)
    }
}

/// Evaluate every action constraint.
pub fn check(anchor: &Anchor, witness: &ActionWitness, instance: &Instance) -> Result<(), ConstraintError> {
    let za_type = instance.za_type;
    expect_shape(witness.spend.is_some() == za_type.spends())?;
    expect_shape(instance.nf.is_some() == za_type.spends())?;
    expect_shape(witness.output.is_some() == za_type.has_output())?;
    expect_shape(instance.cm_b.is_some() == za_type.has_output())?;
    expect_shape(witness.change.is_some() == instance.cm_c.is_some())?;
    expect_shape(za_type.has_change() || witness.change.is_none())?;
    expect_shape(instance.public_value.is_some() == za_type.is_public())?;
    expect_shape(instance.auth.is_some() == (za_type == ZActionType::BurnAuth))?;

    if let Some(spend) = witness.spend.as_ref() {
        let note = &spend.note;
        if note.position != Some(spend.path.position()) || spend.path.root(note.commitment()) != *anchor {
            return Err(ConstraintError::Anchor);
        }
        if instance.nf != Some(note.nullifier(spend.pak.nk(), spend.path.position())) {
            return Err(ConstraintError::Nullifier);
        }
        let ivk = spend.pak.incoming_viewing_key();
        if ivk.address(*note.address.diversifier()) != note.address {
            return Err(ConstraintError::Ownership);
        }
    }
    if instance.rk != witness.rk() {
        return Err(ConstraintError::SpendAuthority);
    }
    if instance.cm_b != witness.output.map(|note| note.commitment()) {
        return Err(ConstraintError::OutputCommitment);
    }
    if instance.cm_c != witness.change.map(|note| note.commitment()) {
        return Err(ConstraintError::ChangeCommitment);
    }
    if instance.auth.is_some() && instance.auth != witness.spend.as_ref().map(|spend| spend.note.commitment()) {
        return Err(ConstraintError::AuthToken);
    }

    let base = witness.value_base(instance.public_value.as_ref());
    let bases = witness
        .spend
        .as_ref()
        .map(|spend| spend.note.value_base())
        .into_iter()
        .chain(witness.output.map(|note| note.value_base()))
        .chain(witness.change.map(|note| note.value_base()))
        .chain(instance.public_value.map(|value| value.base));
    for other in bases {
        if other != base {
            return Err(ConstraintError::Asset);
        }
    }
    let mut kinds = witness
        .spend
        .as_ref()
        .map(|spend| spend.note.kind)
        .into_iter()
        .chain(witness.output.map(|note| note.kind))
        .chain(witness.change.map(|note| note.kind));
    if kinds.any(|kind| kind != za_type.kind()) {
        return Err(ConstraintError::Asset);
    }

    let net = witness.net_value().map_err(|_overflow| ConstraintError::Balance)?;
    let public = match instance.public_value {
        Some(value) => i64::try_from(value.amount).map_err(|_err| ConstraintError::Balance)?,
        None => 0,
    };
    let expected = match za_type {
        ZActionType::Null
        | ZActionType::MintAuth
        | ZActionType::TransferFt
        | ZActionType::TransferNft
        | ZActionType::BurnAuth => 0,
        ZActionType::MintFt | ZActionType::MintNft => -public,
        ZActionType::BurnFt | ZActionType::BurnNft => public,
    };
    if net != expected {
        return Err(ConstraintError::Balance);
    }

    if instance.cv != ValueCommitment::derive(net, &base, witness.rcv) {
        return Err(ConstraintError::ValueCommitment);
    }
    Ok(())
}
