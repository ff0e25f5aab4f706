//! Prover adapter.
//!
//! The proving system is opaque: [`Prover`] takes every action's witness
//! and statement and returns one proof over the bundle. Before handing
//! anything to the backend the adapter evaluates each action's constraints,
//! so an unsatisfiable witness fails fast with
//! [`ProverError::ProofGenerationFailed`] instead of producing a proof that
//! can never verify.
//!
//! Proving is CPU bound and takes seconds. [`ProverPool`] runs it on the
//! blocking pool, at most `threads` proofs at a time. There is no retry and
//! no cancellation: once started, a proof completes or the build is
//! abandoned.

use alloc::sync::Arc;
use core::{fmt, num::NonZeroUsize};

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::info;

use crate::{
    circuit::{self, ActionWitness, ConstraintError, Instance},
    config::Settings,
    tree::Anchor,
};

/// Setup seed of the action circuit parameters.
const CIRCUIT_SEED: &[u8] = b"zaction action circuit v1";

/// An opaque proof over every action of a bundle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(#[serde(with = "crate::encoding::bytes")] Vec<u8>);

impl Proof {
    /// Proof bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the proof is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Proof {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Proof> for Vec<u8> {
    fn from(proof: Proof) -> Self {
        proof.0
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Proof({} bytes)", self.0.len())
    }
}

/// Proving or verification failed.
#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    /// An action's witness does not satisfy its statement.
    #[error("proof generation failed: action {action}: {source}")]
    ProofGenerationFailed {
        /// Index of the failing action.
        action: usize,
        /// The violated constraint.
        source: ConstraintError,
    },

    /// The backend refused to prove.
    #[error("proving backend failed: {0}")]
    Backend(#[from] mock_prover::ProvingError),

    /// The proof does not verify against the statements.
    #[error("proof rejected: {0}")]
    Rejected(#[from] mock_prover::VerificationError),

    /// The blocking worker panicked or the pool was closed.
    #[error("prover worker failed: {0}")]
    Worker(String),
}

/// A proving system for bundles of actions.
pub trait Prover: Send + Sync + 'static {
    /// Prove every `(witness, statement)` pair under `anchor`.
    fn prove(&self, anchor: &Anchor, circuits: &[(ActionWitness, Instance)]) -> Result<Proof, ProverError>;

    /// Verify `proof` against the statements under `anchor`.
    fn verify(&self, anchor: &Anchor, instances: &[Instance], proof: &Proof) -> Result<(), ProverError>;
}

/// Constraint-checked prover over the [`mock_prover`] transcript backend.
#[derive(Clone, Debug)]
pub struct MockProver {
    pk: mock_prover::ProvingKey,
    vk: mock_prover::VerifyingKey,
}

impl MockProver {
    /// Run setup for the action circuit.
    #[must_use]
    pub fn new() -> Self {
        let params = mock_prover::Params::setup(CIRCUIT_SEED);
        Self {
            pk: params.proving_key(),
            vk: params.verifying_key(),
        }
    }
}

impl Default for MockProver {
    fn default() -> Self {
        Self::new()
    }
}

impl Prover for MockProver {
    fn prove(&self, anchor: &Anchor, circuits: &[(ActionWitness, Instance)]) -> Result<Proof, ProverError> {
        for (action, (witness, instance)) in circuits.iter().enumerate() {
            circuit::check(anchor, witness, instance)
                .map_err(|source| ProverError::ProofGenerationFailed { action, source })?;
        }
        let statements: Vec<Vec<u8>> = circuits
            .iter()
            .map(|(_witness, instance)| instance.statement(anchor))
            .collect();
        let refs: Vec<&[u8]> = statements.iter().map(Vec::as_slice).collect();
        Ok(Proof(mock_prover::prove(&self.pk, &refs, &mut OsRng)?))
    }

    fn verify(&self, anchor: &Anchor, instances: &[Instance], proof: &Proof) -> Result<(), ProverError> {
        let statements: Vec<Vec<u8>> = instances
            .iter()
            .map(|instance| instance.statement(anchor))
            .collect();
        let refs: Vec<&[u8]> = statements.iter().map(Vec::as_slice).collect();
        mock_prover::verify(&self.vk, &refs, &proof.0)?;
        Ok(())
    }
}

/// Worker threads to use when none are configured.
#[must_use]
pub fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Runs a [`Prover`] off the async executor.
#[derive(Debug)]
pub struct ProverPool<P> {
    prover: Arc<P>,
    permits: Arc<Semaphore>,
}

impl<P> Clone for ProverPool<P> {
    fn clone(&self) -> Self {
        Self {
            prover: Arc::clone(&self.prover),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<P: Prover> ProverPool<P> {
    /// A pool running at most `threads` proofs at once (at least one).
    pub fn new(prover: P, threads: usize) -> Self {
        Self {
            prover: Arc::new(prover),
            permits: Arc::new(Semaphore::new(threads.max(1))),
        }
    }

    /// A pool sized by [`Settings::prover_threads`].
    pub fn from_settings(prover: P, settings: &Settings) -> Self {
        Self::new(prover, settings.prover_threads())
    }

    /// The wrapped prover.
    #[must_use]
    pub fn prover(&self) -> &P {
        &self.prover
    }

    /// Prove on the blocking pool.
    pub async fn prove(&self, anchor: Anchor, circuits: Vec<(ActionWitness, Instance)>) -> Result<Proof, ProverError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|err| ProverError::Worker(err.to_string()))?;
        let prover = Arc::clone(&self.prover);
        let actions = circuits.len();
        let started = tokio::time::Instant::now();

        let proof = tokio::task::spawn_blocking(move || {
            let outcome = prover.prove(&anchor, &circuits);
            drop(permit);
            outcome
        })
        .await
        .map_err(|err| ProverError::Worker(err.to_string()))??;

        info!(
            actions,
            proof_len = proof.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "proved bundle"
        );
        Ok(proof)
    }

    /// Verify with the wrapped prover.
    pub fn verify(&self, anchor: &Anchor, instances: &[Instance], proof: &Proof) -> Result<(), ProverError> {
        self.prover.verify(anchor, instances, proof)
    }
}
