//! Proof upload channel.
//!
//! Proofs too large to embed in a transaction are stored off chain and
//! referenced by content identifier: a CIDv1 with the raw codec and a
//! sha2-256 multihash, base58btc encoded with the multibase prefix `z`.
//!
//! ```text
//! cid = "z" || base58btc(0x01 || 0x55 || 0x12 || 0x20 || sha256(proof))
//! ```
//!
//! Anyone holding the transaction can fetch the proof and check it against
//! the digest, so the reference stays independently verifiable.

use alloc::collections::BTreeMap;
use core::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use sha2::{Digest as _, Sha256};
use tracing::{info, warn};

/// CIDv1 version, raw codec, sha2-256 code, digest length.
const CID_PREFIX: [u8; 4] = [0x01, 0x55, 0x12, 0x20];

/// URI scheme of stored proofs.
const URI_SCHEME: &str = "ipfs://";

/// A content identifier for a stored proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid([u8; 32]);

/// Errors parsing a [`Cid`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CidError {
    /// Not base58btc (`z` multibase prefix).
    #[error("cid must start with the base58btc prefix 'z'")]
    Multibase,

    /// Not valid base58.
    #[error("cid is not base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    /// Not a CIDv1 raw sha2-256 identifier.
    #[error("cid is not a raw sha2-256 CIDv1")]
    Codec,
}

impl Cid {
    /// The identifier of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// The sha2-256 digest.
    #[must_use]
    pub const fn digest(&self) -> &[u8; 32] {
        &self.0
    }

    /// `ipfs://<cid>`
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{URI_SCHEME}{self}")
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(CID_PREFIX.len() + self.0.len());
        raw.extend_from_slice(&CID_PREFIX);
        raw.extend_from_slice(&self.0);
        write!(formatter, "z{}", bs58::encode(raw).into_string())
    }
}

impl FromStr for Cid {
    type Err = CidError;

    /// Accepts the bare identifier or its `ipfs://` URI.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bare = text.strip_prefix(URI_SCHEME).unwrap_or(text);
        let encoded = bare.strip_prefix('z').ok_or(CidError::Multibase)?;
        let raw = bs58::decode(encoded).into_vec()?;
        let digest = raw.strip_prefix(CID_PREFIX.as_slice()).ok_or(CidError::Codec)?;
        let bytes: [u8; 32] = digest.try_into().map_err(|_err| CidError::Codec)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A storage backend failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("proof store unavailable: {0}")]
pub struct StoreError(pub String);

/// Content-addressed blob storage.
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Store `bytes` under `cid`.
    async fn put(&self, cid: &Cid, bytes: &[u8]) -> Result<(), StoreError>;

    /// The bytes stored under `cid`, if any.
    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError>;
}

/// In-process proof store with failure injection.
#[derive(Debug, Default)]
pub struct MemoryProofStore {
    blobs: Mutex<BTreeMap<Cid, Vec<u8>>>,
    failing_puts: AtomicUsize,
}

impl MemoryProofStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` puts.
    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Store `bytes` under `cid` without checking the digest.
    pub fn insert_unchecked(&self, cid: Cid, bytes: Vec<u8>) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cid, bytes);
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProofStore for MemoryProofStore {
    async fn put(&self, cid: &Cid, bytes: &[u8]) -> Result<(), StoreError> {
        let failing = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError("injected failure".to_owned()));
        }
        self.insert_unchecked(*cid, bytes.to_vec());
        Ok(())
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cid)
            .cloned())
    }
}

/// Proof upload and retrieval failures.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Both upload attempts failed.
    #[error("proof upload failed after {attempts} attempts: {source}")]
    ProofUploadFailed {
        /// Attempts made.
        attempts: u8,
        /// The last failure.
        source: StoreError,
    },

    /// Nothing is stored under the identifier.
    #[error("no proof stored under {0}")]
    NotFound(Cid),

    /// The stored bytes do not hash to the identifier.
    #[error("proof content {actual} does not match {expected}")]
    DigestMismatch {
        /// Requested identifier.
        expected: Cid,
        /// Identifier of the bytes returned.
        actual: Cid,
    },

    /// The store failed while fetching.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Uploads proofs with one retry and fetches them with a digest check.
#[derive(Debug)]
pub struct ProofChannel<S> {
    store: S,
}

impl<S: ProofStore> ProofChannel<S> {
    /// Channel over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Store `bytes`, retrying once.
    pub async fn upload(&self, bytes: &[u8]) -> Result<Cid, UploadError> {
        let cid = Cid::of(bytes);
        if let Err(first) = self.store.put(&cid, bytes).await {
            warn!(digest = %cid, error = %first, "proof upload failed, retrying");
            self.store
                .put(&cid, bytes)
                .await
                .map_err(|source| UploadError::ProofUploadFailed { attempts: 2, source })?;
        }
        info!(digest = %cid, proof_len = bytes.len(), "uploaded proof");
        Ok(cid)
    }

    /// Retrieve the bytes behind `cid`, checking their hash.
    pub async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>, UploadError> {
        let bytes = self.store.get(cid).await?.ok_or(UploadError::NotFound(*cid))?;
        let actual = Cid::of(&bytes);
        if actual != *cid {
            return Err(UploadError::DigestMismatch {
                expected: *cid,
                actual,
            });
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_identifier() {
        let cid = Cid::of(b"hello");
        assert_eq!(cid.to_string(), "zb2rhZfjRh2FHHB2RkHVEvL2vJnCTcu7kwRqgVsf9gpkLgteo");
        assert_eq!(cid.uri(), "ipfs://zb2rhZfjRh2FHHB2RkHVEvL2vJnCTcu7kwRqgVsf9gpkLgteo");
        assert_eq!(cid.uri().parse::<Cid>(), Ok(cid));
        assert_eq!(
            Cid::of(b"").to_string(),
            "zb2rhmy65F3REf8SZp7De11gxtECBGgUKaLdiDj7MCGCHxbDW"
        );
    }

    #[test]
    fn malformed_identifiers_rejected() {
        assert_eq!("b2rh".parse::<Cid>(), Err(CidError::Multibase));
        assert!(matches!("z0OIl".parse::<Cid>(), Err(CidError::Base58(_))));
        assert_eq!("z2".parse::<Cid>(), Err(CidError::Codec));
    }

    #[tokio::test]
    async fn fetch_returns_uploaded_bytes() {
        let channel = ProofChannel::new(MemoryProofStore::new());
        let proof = vec![0xab; 12_000];
        let cid = channel.upload(&proof).await.unwrap();
        assert_eq!(channel.fetch(&cid).await.unwrap(), proof);
    }

    #[tokio::test]
    async fn upload_retries_exactly_once() {
        let channel = ProofChannel::new(MemoryProofStore::new());

        channel.store().fail_next_puts(1);
        let cid = channel.upload(b"proof").await.unwrap();
        assert_eq!(channel.fetch(&cid).await.unwrap(), b"proof");

        channel.store().fail_next_puts(2);
        assert!(matches!(
            channel.upload(b"other proof").await,
            Err(UploadError::ProofUploadFailed { attempts: 2, .. })
        ));
        assert_eq!(channel.store().len(), 1);
    }

    #[tokio::test]
    async fn fetch_checks_the_digest() {
        let channel = ProofChannel::new(MemoryProofStore::new());
        let cid = Cid::of(b"honest");
        channel.store().insert_unchecked(cid, b"forged".to_vec());
        assert!(matches!(
            channel.fetch(&cid).await,
            Err(UploadError::DigestMismatch { .. })
        ));
        assert!(matches!(
            channel.fetch(&Cid::of(b"missing")).await,
            Err(UploadError::NotFound(_))
        ));
    }
}
