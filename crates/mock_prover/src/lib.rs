//! # mock_prover
//!
//! A BLAKE2b transcript mock of a zero-knowledge proof backend.
//!
//! The mock keeps the *shape* of a real proving system without any of its
//! arithmetic:
//!
//! - a one-time [`Params::setup`] producing a [`ProvingKey`] and a
//!   [`VerifyingKey`],
//! - [`prove`] over a list of public instances (opaque byte strings),
//! - [`verify`] against the same instances.
//!
//! Proofs are probabilistic (each instance section carries fresh blinding)
//! but deterministic in validity: any proof produced for a list of instances
//! verifies against exactly that list and nothing else.
//!
//! ## Proof layout
//!
//! | Section | Size |
//! | ------- | ---- |
//! | magic `MKPF` | 4 |
//! | version | 1 |
//! | instance count (u32 LE) | 4 |
//! | transcript digest | 64 |
//! | header filler | [`HEADER_LEN`] - 73 |
//! | per instance: blinding ‖ tag ‖ filler | [`INSTANCE_LEN`] each |
//!
//! The filler is derived from the transcript so that proof size grows with
//! the instance count the way a real recursive proof does.
//!
//! The verifying key equals the proving key: this is a designated-verifier
//! mock and offers no soundness against anyone holding the parameters.

use rand_core::{CryptoRng, RngCore};

/// Length of the fixed proof header, in bytes.
pub const HEADER_LEN: usize = 2720;

/// Length of each per-instance proof section, in bytes.
pub const INSTANCE_LEN: usize = 2272;

const MAGIC: &[u8; 4] = b"MKPF";
const VERSION: u8 = 1;

const SETUP_PERSONALIZATION: &[u8; 16] = b"MockProverSetup_";
const TAG_PERSONALIZATION: &[u8; 16] = b"MockProverTag___";
const TRANSCRIPT_PERSONALIZATION: &[u8; 16] = b"MockProverTrnscr";
const FILL_PERSONALIZATION: &[u8; 16] = b"MockProverFiller";

const BLINDING_LEN: usize = 32;
const TAG_LEN: usize = 64;
const PREAMBLE_LEN: usize = 4 + 1 + 4 + 64;

/// Errors returned by [`prove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProvingError {
    /// A proof must cover at least one instance.
    #[error("no instances to prove")]
    NoInstances,

    /// More instances than the proof header can count.
    #[error("too many instances: {0}")]
    TooManyInstances(usize),
}

/// Errors returned by [`verify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The proof is not a well-formed mock proof.
    #[error("malformed proof")]
    Malformed,

    /// The proof covers a different number of instances.
    #[error("proof covers {proof} instances, {expected} supplied")]
    InstanceCount {
        /// Count recorded in the proof header.
        proof: usize,
        /// Count supplied by the verifier.
        expected: usize,
    },

    /// The transcript does not match the supplied instances.
    #[error("proof does not verify against the supplied instances")]
    Invalid,
}

/// Public parameters produced by [`Params::setup`].
#[derive(Clone, Debug)]
pub struct Params {
    key: [u8; 32],
}

/// Key used by [`prove`].
#[derive(Clone, Debug)]
pub struct ProvingKey {
    key: [u8; 32],
}

/// Key used by [`verify`].
#[derive(Clone, Debug)]
pub struct VerifyingKey {
    key: [u8; 32],
}

impl Params {
    /// Derive parameters from a setup seed (stands in for a circuit-specific
    /// setup).
    #[must_use]
    pub fn setup(seed: &[u8]) -> Self {
        let hash = blake2b_simd::Params::new()
            .hash_length(32)
            .personal(SETUP_PERSONALIZATION)
            .hash(seed);
        let mut key = [0u8; 32];
        key.copy_from_slice(hash.as_bytes());
        Self { key }
    }

    /// The proving key.
    #[must_use]
    pub const fn proving_key(&self) -> ProvingKey {
        ProvingKey { key: self.key }
    }

    /// The verifying key.
    #[must_use]
    pub const fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey { key: self.key }
    }
}

/// Size in bytes of a proof over `instances` public instances.
#[must_use]
pub const fn proof_len(instances: usize) -> usize {
    HEADER_LEN + instances * INSTANCE_LEN
}

/// Prove a list of public instances.
pub fn prove<R: RngCore + CryptoRng>(
    pk: &ProvingKey,
    instances: &[&[u8]],
    rng: &mut R,
) -> Result<Vec<u8>, ProvingError> {
    if instances.is_empty() {
        return Err(ProvingError::NoInstances);
    }
    let count =
        u32::try_from(instances.len()).map_err(|_err| ProvingError::TooManyInstances(instances.len()))?;

    let mut sections = Vec::with_capacity(instances.len() * INSTANCE_LEN);
    let mut tags = Vec::with_capacity(instances.len());
    for (index, instance) in (0u32..).zip(instances) {
        let mut blinding = [0u8; BLINDING_LEN];
        rng.fill_bytes(&mut blinding);
        let tag = instance_tag(&pk.key, &blinding, index, count, instance);
        sections.extend_from_slice(&blinding);
        sections.extend_from_slice(&tag);
        sections.extend(filler(&tag, INSTANCE_LEN - BLINDING_LEN - TAG_LEN));
        tags.push(tag);
    }

    let digest = transcript(&pk.key, count, &tags);
    let mut proof = Vec::with_capacity(proof_len(instances.len()));
    proof.extend_from_slice(MAGIC);
    proof.push(VERSION);
    proof.extend_from_slice(&count.to_le_bytes());
    proof.extend_from_slice(&digest);
    proof.extend(filler(&digest, HEADER_LEN - PREAMBLE_LEN));
    proof.extend(sections);
    Ok(proof)
}

/// Verify a proof against a list of public instances.
pub fn verify(vk: &VerifyingKey, instances: &[&[u8]], proof: &[u8]) -> Result<(), VerificationError> {
    let (preamble, rest) = proof
        .split_at_checked(PREAMBLE_LEN)
        .ok_or(VerificationError::Malformed)?;
    let (magic, after_magic) = preamble.split_at(4);
    let (version, after_version) = after_magic.split_at(1);
    let (count_bytes, digest) = after_version.split_at(4);
    if magic != MAGIC || version != [VERSION] {
        return Err(VerificationError::Malformed);
    }

    let mut count_le = [0u8; 4];
    count_le.copy_from_slice(count_bytes);
    let count = u32::from_le_bytes(count_le);
    let proof_count = usize::try_from(count).map_err(|_err| VerificationError::Malformed)?;
    if proof_count != instances.len() {
        return Err(VerificationError::InstanceCount {
            proof: proof_count,
            expected: instances.len(),
        });
    }
    if proof.len() != proof_len(proof_count) {
        return Err(VerificationError::Malformed);
    }

    let (header_fill, sections) = rest.split_at(HEADER_LEN - PREAMBLE_LEN);

    let mut tags = Vec::with_capacity(proof_count);
    for ((index, instance), section) in (0u32..).zip(instances).zip(sections.chunks_exact(INSTANCE_LEN)) {
        let (blinding, after_blinding) = section.split_at(BLINDING_LEN);
        let (tag, fill) = after_blinding.split_at(TAG_LEN);
        let expected = instance_tag(&vk.key, blinding, index, count, instance);
        if tag != expected.as_slice() || fill != filler(&expected, fill.len()).as_slice() {
            return Err(VerificationError::Invalid);
        }
        tags.push(expected);
    }

    let expected_digest = transcript(&vk.key, count, &tags);
    if digest != expected_digest.as_slice()
        || header_fill != filler(&expected_digest, header_fill.len()).as_slice()
    {
        return Err(VerificationError::Invalid);
    }
    Ok(())
}

fn instance_tag(key: &[u8; 32], blinding: &[u8], index: u32, count: u32, instance: &[u8]) -> [u8; 64] {
    let len = u64::try_from(instance.len()).unwrap_or(u64::MAX);
    *blake2b_simd::Params::new()
        .hash_length(64)
        .key(key)
        .personal(TAG_PERSONALIZATION)
        .to_state()
        .update(blinding)
        .update(&index.to_le_bytes())
        .update(&count.to_le_bytes())
        .update(&len.to_le_bytes())
        .update(instance)
        .finalize()
        .as_array()
}

fn transcript(key: &[u8; 32], count: u32, tags: &[[u8; 64]]) -> [u8; 64] {
    let mut state = blake2b_simd::Params::new()
        .hash_length(64)
        .key(key)
        .personal(TRANSCRIPT_PERSONALIZATION)
        .to_state();
    state.update(&count.to_le_bytes());
    for tag in tags {
        state.update(tag);
    }
    *state.finalize().as_array()
}

/// BLAKE2b-512 in counter mode, truncated to `len` bytes.
fn filler(seed: &[u8; 64], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0u64;
    while out.len() < len {
        let block = blake2b_simd::Params::new()
            .hash_length(64)
            .personal(FILL_PERSONALIZATION)
            .to_state()
            .update(seed)
            .update(&counter.to_le_bytes())
            .finalize();
        let take = core::cmp::min(64, len - out.len());
        out.extend(block.as_bytes().iter().take(take));
        counter += 1;
    }
    out
}
