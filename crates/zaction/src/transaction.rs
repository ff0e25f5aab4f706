//! Transaction assembly.
//!
//! The assembler proves an [`UnprovenBundle`], collects every signature
//! over the bundle sighash and wraps the result in the ledger envelope:
//!
//! ```text
//! [ entries before the first zaction entry ]
//! begin  { proof, notes, tx: [ step data per zaction entry ] }
//! step   (one per zaction entry, in order)
//! [ entries after the last zaction entry ]
//! ```
//!
//! Every entry from the first to the last one carrying zactions becomes a
//! step, even when it carries none itself. A step keeps its action's
//! account, name and authorization; its data lists the bundle actions it
//! owns next to the caller's original payload.

use alloc::collections::BTreeMap;
use core::{fmt, ops::Range};

use pasta_curves::Fq;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    builder::BuildError,
    bundle::{Bundle, UnprovenBundle},
    config::Settings,
    custody::{Custody, SpendRequest},
    descriptor::{PermissionLevel, RequestEntry, TransactionRequest, TransparentAction},
    keys::{SpendAuthSignature, private::BindingSigningKey, public::BindingVerificationKey},
    name::Name,
    note_encryption::EncryptedNote,
    proof_store::{Cid, ProofChannel, ProofStore, UploadError},
    prover::{Proof, Prover, ProverError, ProverPool},
};

/// `begin`: opens the shielded sequence and carries the proof.
pub const BEGIN: Name = Name::from_value(4_222_381_386_624_925_696);

/// `step`: executes one entry of the shielded sequence.
pub const STEP: Name = Name::from_value(14_291_416_953_460_359_168);

/// Where the bundle proof lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofReference {
    /// Embedded in the transaction.
    Inline(Proof),
    /// Uploaded to the proof store.
    Digest(Cid),
}

/// Payload of one step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepData {
    /// Bundle action indices executed by this step.
    pub actions: Vec<usize>,
    /// The caller's original action data.
    pub data: serde_json::Value,
}

/// Payload of the `begin` action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginData {
    /// The bundle proof.
    pub proof: ProofReference,
    /// Ciphertexts of every new note, in action order.
    pub notes: Vec<EncryptedNote>,
    /// The wrapped entries, one per step.
    pub tx: Vec<TransparentAction>,
}

/// A transaction ready for broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Ledger actions in execution order.
    pub actions: Vec<TransparentAction>,
    /// The shielded bundle, if any entry carried zactions.
    pub bundle: Option<Bundle>,
    /// Its proof.
    pub proof: Option<ProofReference>,
}

impl Transaction {
    /// A request without zactions: its actions, untouched.
    #[must_use]
    pub fn transparent(request: &TransactionRequest) -> Self {
        Self {
            actions: request.0.iter().map(|entry| entry.action.clone()).collect(),
            bundle: None,
            proof: None,
        }
    }

    /// Decode the `begin` payload, if the transaction has one.
    pub fn begin_data(&self) -> Result<Option<BeginData>, serde_json::Error> {
        self.actions
            .iter()
            .find(|action| action.name == BEGIN)
            .map(|action| serde_json::from_value(action.data.clone()))
            .transpose()
    }
}

/// Proving, signing or publishing failed. The bundle's reservation is
/// released when the caller drops it.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// The prover failed.
    #[error(transparent)]
    Prover(#[from] ProverError),

    /// The proof could not be uploaded.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Custody refused or returned unusable signatures.
    #[error("spend authorization failed: {0}")]
    Authorization(String),

    /// The trapdoor sum is not a valid binding key.
    #[error("invalid binding key: {0}")]
    BindingKey(reddsa::Error),

    /// The binding key from trapdoors disagrees with the one from value
    /// commitments.
    #[error("binding key does not match the value commitments")]
    BindingKeyMismatch,

    /// The envelope could not be encoded.
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Caller-facing failure of transaction creation.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// The bundle could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The bundle could not be proved, signed or published.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Lay out the ledger actions around the shielded sequence.
///
/// `spans` holds the action indices of each descriptor, in request order.
pub fn envelope(
    request: &TransactionRequest,
    spans: &[Range<usize>],
    contract: Name,
    auth: &[PermissionLevel],
    proof: ProofReference,
    notes: Vec<EncryptedNote>,
) -> Result<Vec<TransparentAction>, serde_json::Error> {
    let entries = &request.0;
    let is_shielded = |entry: &RequestEntry| !entry.zaction_descs.is_empty();
    let (Some(first), Some(last)) = (entries.iter().position(is_shielded), entries.iter().rposition(is_shielded)) else {
        return Ok(Transaction::transparent(request).actions);
    };

    let mut remaining = spans.iter();
    let mut steps = Vec::with_capacity(last - first + 1);
    for entry in entries.iter().skip(first).take(last - first + 1) {
        let actions: Vec<usize> = remaining
            .by_ref()
            .take(entry.zaction_descs.len())
            .flat_map(Clone::clone)
            .collect();
        let data = serde_json::to_value(StepData {
            actions,
            data: entry.action.data.clone(),
        })?;
        steps.push(TransparentAction {
            data,
            ..entry.action.clone()
        });
    }

    let step_count = steps.len();
    let begin = TransparentAction {
        account: contract,
        name: BEGIN,
        authorization: auth.to_vec(),
        data: serde_json::to_value(BeginData {
            proof,
            notes,
            tx: steps,
        })?,
    };
    let step = TransparentAction {
        account: contract,
        name: STEP,
        authorization: auth.to_vec(),
        data: serde_json::Value::Null,
    };

    let mut out: Vec<TransparentAction> = entries.iter().take(first).map(|entry| entry.action.clone()).collect();
    out.push(begin);
    out.extend(core::iter::repeat_n(step, step_count));
    out.extend(entries.iter().skip(last + 1).map(|entry| entry.action.clone()));
    Ok(out)
}

/// Proves, signs and publishes bundles.
#[derive(Debug)]
pub struct Assembler<'env, P, S> {
    settings: &'env Settings,
    prover: &'env ProverPool<P>,
    proofs: &'env ProofChannel<S>,
}

impl<'env, P: Prover, S: ProofStore> Assembler<'env, P, S> {
    /// Assembler over a prover pool and a proof channel.
    pub const fn new(settings: &'env Settings, prover: &'env ProverPool<P>, proofs: &'env ProofChannel<S>) -> Self {
        Self {
            settings,
            prover,
            proofs,
        }
    }

    /// Turn `bundle` into the transaction for `request`.
    ///
    /// Spends are signed by `custody`; actions without a spend are signed
    /// here. On any failure nothing is returned and the caller still owns
    /// the bundle's reservation.
    pub async fn assemble<C, R>(
        &self,
        request: &TransactionRequest,
        auth: &[PermissionLevel],
        bundle: &UnprovenBundle,
        custody: &C,
        rng: &mut R,
    ) -> Result<Transaction, AssemblyError>
    where
        C: Custody + Sync,
        C::Error: fmt::Display,
        R: RngCore + CryptoRng + Send,
    {
        let circuits = bundle
            .actions
            .iter()
            .map(|action| (action.witness.clone(), action.instance))
            .collect();
        let proof = self.prover.prove(bundle.anchor, circuits).await?;

        let sighash = bundle.sighash();
        let requests = SpendRequest::for_bundle(bundle);
        let signatures = custody
            .authorize(bundle, &requests, &mut *rng)
            .map_err(|err| AssemblyError::Authorization(err.to_string()))?;
        if signatures.len() != requests.len() {
            return Err(AssemblyError::Authorization(format!(
                "expected {} signatures, got {}",
                requests.len(),
                signatures.len()
            )));
        }
        let mut by_index: BTreeMap<usize, SpendAuthSignature> = requests
            .iter()
            .map(|request| request.action_index)
            .zip(signatures)
            .collect();

        let mut actions = Vec::with_capacity(bundle.actions.len());
        for (index, unproven) in bundle.actions.iter().enumerate() {
            if let Some(signed) = unproven.sign_output(sighash.as_ref(), &mut *rng) {
                actions.push(signed);
                continue;
            }
            let sig = by_index
                .remove(&index)
                .ok_or_else(|| AssemblyError::Authorization(format!("no signature for action {index}")))?;
            let authorized = unproven.authorize(sig);
            authorized
                .verify_signature(sighash.as_ref())
                .map_err(|err| AssemblyError::Authorization(format!("action {index}: {err}")))?;
            actions.push(authorized);
        }

        let bsk_scalar: Fq = bundle.actions.iter().map(|action| action.witness.rcv).sum();
        let bsk = BindingSigningKey::try_from(bsk_scalar).map_err(AssemblyError::BindingKey)?;
        let bvk = BindingVerificationKey::derive(
            bundle.actions.iter().map(|action| &action.instance.cv),
            &bundle.value_balance,
        )
        .map_err(AssemblyError::BindingKey)?;
        if bsk.verification_key() != bvk {
            return Err(AssemblyError::BindingKeyMismatch);
        }
        let binding_sig = bsk.sign(&mut *rng, sighash.as_ref());

        let proof_len = proof.len();
        let reference = if proof_len > self.settings.inline_proof_limit {
            ProofReference::Digest(self.proofs.upload(proof.as_bytes()).await?)
        } else {
            ProofReference::Inline(proof)
        };
        debug!(proof_len, uploaded = matches!(reference, ProofReference::Digest(_)), "proof placed");

        let signed = Bundle {
            anchor: bundle.anchor,
            actions,
            value_balance: bundle.value_balance.clone(),
            binding_sig,
        };
        let notes = signed
            .actions
            .iter()
            .flat_map(|action| action.ciphertexts.iter().cloned())
            .collect();
        let envelope = envelope(
            request,
            &bundle.spans,
            self.settings.shielded_contract,
            auth,
            reference.clone(),
            notes,
        )?;
        info!(
            actions = signed.actions.len(),
            ledger_actions = envelope.len(),
            anchor = %signed.anchor,
            "assembled transaction"
        );
        Ok(Transaction {
            actions: envelope,
            bundle: Some(signed),
            proof: Some(reference),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        custody::Local,
        descriptor::{Word, ZActionDesc},
        keys::private::SpendingKey,
        testing,
    };

    fn entry(name: &str, zactions: usize) -> RequestEntry {
        let desc = ZActionDesc {
            za_type: 1,
            to: String::new(),
            d1: Word::from(1),
            d2: Word::from(0),
            sc: Word::from(0),
            memo: String::new(),
            change_to: None,
        };
        RequestEntry {
            action: TransparentAction {
                account: "eosio.token".parse().unwrap(),
                name: name.parse().unwrap(),
                authorization: testing::auth(),
                data: json!({ "tag": name }),
            },
            zaction_descs: vec![desc; zactions],
        }
    }

    #[test]
    fn action_names() {
        assert_eq!(BEGIN.to_string(), "begin");
        assert_eq!(STEP.to_string(), "step");
    }

    #[test]
    fn envelope_wraps_the_shielded_sequence() {
        let request = TransactionRequest(vec![
            entry("before", 0),
            entry("first", 2),
            entry("middle", 0),
            entry("last", 1),
            entry("after", 0),
        ]);
        let spans = [0..1, 1..3, 3..4];
        let contract = Settings::default().shielded_contract;
        let proof = ProofReference::Digest(Cid::of(b"proof"));
        let actions = envelope(&request, &spans, contract, &testing::auth(), proof.clone(), Vec::new()).unwrap();

        let names: Vec<String> = actions.iter().map(|action| action.name.to_string()).collect();
        assert_eq!(names, ["before", "begin", "step", "step", "step", "after"]);
        let begin = actions.get(1).unwrap();
        assert_eq!(begin.account.to_string(), "thezeostoken");

        let data: BeginData = serde_json::from_value(begin.data.clone()).unwrap();
        assert_eq!(data.proof, proof);
        let steps: Vec<(String, StepData)> = data
            .tx
            .iter()
            .map(|action| (action.name.to_string(), serde_json::from_value(action.data.clone()).unwrap()))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("first".to_owned(), StepData { actions: vec![0, 1, 2], data: json!({ "tag": "first" }) }),
                ("middle".to_owned(), StepData { actions: vec![], data: json!({ "tag": "middle" }) }),
                ("last".to_owned(), StepData { actions: vec![3], data: json!({ "tag": "last" }) }),
            ]
        );
    }

    #[test]
    fn request_without_zactions_passes_through() {
        let request = TransactionRequest(vec![entry("one", 0), entry("two", 0)]);
        let actions = envelope(
            &request,
            &[],
            Name::ZERO,
            &[],
            ProofReference::Inline(Proof::from(vec![1])),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(actions, Transaction::transparent(&request).actions);
        assert_eq!(Transaction::transparent(&request).begin_data().unwrap(), None);
    }

    #[tokio::test]
    async fn small_proofs_inline_large_proofs_upload() {
        let fx = testing::funded(&[10, 10, 10, 100]).await;
        let (prover, proofs) = testing::services();
        let settings = Settings::default();
        let assembler = Assembler::new(&settings, &prover, &proofs);
        let mut rng = testing::rng(0);

        let request = fx.transfer(50);
        let single = fx.build(&request, &mut rng).await.unwrap();
        assert_eq!(single.actions.len(), 1);
        let tx = assembler
            .assemble(&request, &testing::auth(), &single, &fx.custody(), &mut rng)
            .await
            .unwrap();
        assert!(matches!(tx.proof, Some(ProofReference::Inline(_))));
        assert!(proofs.store().is_empty());
        tx.bundle.as_ref().unwrap().verify_signatures().unwrap();
        let begin = tx.begin_data().unwrap().unwrap();
        assert_eq!(begin.notes.len(), 2, "output and change");
        drop(single);

        // holding the 100 note leaves three notes of 10
        let held = fx.build(&fx.transfer(100), &mut rng).await.unwrap();
        let request = fx.transfer(25);
        let triple = fx.build(&request, &mut rng).await.unwrap();
        assert_eq!(triple.actions.len(), 3);
        let tx = assembler
            .assemble(&request, &testing::auth(), &triple, &fx.custody(), &mut rng)
            .await
            .unwrap();
        let Some(ProofReference::Digest(cid)) = tx.proof else {
            panic!("expected an uploaded proof, got {:?}", tx.proof);
        };
        let stored = proofs.fetch(&cid).await.unwrap();
        assert_eq!(stored.len(), mock_prover::proof_len(3));
        drop(held);
    }

    #[tokio::test]
    async fn foreign_custody_is_rejected() {
        let fx = testing::funded(&[100]).await;
        let (prover, proofs) = testing::services();
        let settings = Settings::default();
        let assembler = Assembler::new(&settings, &prover, &proofs);
        let mut rng = testing::rng(1);

        let request = fx.transfer(30);
        let bundle = fx.build(&request, &mut rng).await.unwrap();
        let stranger = SpendingKey::from([0xeeu8; 32]);
        let custody = Local::new(stranger.spend_authorizing_key());
        assert!(matches!(
            assembler
                .assemble(&request, &testing::auth(), &bundle, &custody, &mut rng)
                .await,
            Err(AssemblyError::Authorization(_))
        ));
    }
}
