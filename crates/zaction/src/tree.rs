//! Commitment tree client.
//!
//! The chain stores the append-only commitment tree as an implicit array per
//! full tree: node `i` has children `2i + 1` and `2i + 2`, the root is node
//! `0`, and the leaf at local position `p` is node `2^32 - 1 + p`. Tree `t`
//! occupies array indices `[t * (2^33 - 1), (t + 1) * (2^33 - 1))`. Nodes the
//! chain has never written are roots of empty subtrees.
//!
//! $$\text{MerkleCRH}(\ell, l, r) = \text{ToBase}(\text{BLAKE2b-512}(
//!   \text{"ZAction\_MerkleCR"}, \ell \| l \| r))$$
//!
//! The client keeps no state: every [`root`](TreeClient::root) and
//! [`path`](TreeClient::path) call reads the chain again, so callers fetch
//! the anchor at build time.

use core::fmt;

use ff::{FromUniformBytes as _, PrimeField as _};
use lazy_static::lazy_static;
use pasta_curves::Fp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chain::{ChainError, ChainReader},
    constants::{MERKLE_CRH_PERSONALIZATION, MERKLE_DEPTH, TREE_ARRAY_LEN, TREE_LEAF_OFFSET, TREE_LEAVES},
    note::Commitment,
};

/// Value of an empty leaf.
pub const EMPTY_LEAF: u64 = 2;

lazy_static! {
    /// `EMPTY_ROOTS[l]` is the root of an empty subtree of height `l`.
    static ref EMPTY_ROOTS: Vec<Fp> = {
        let mut roots = vec![Fp::from(EMPTY_LEAF)];
        for level in 0..MERKLE_DEPTH {
            let below = roots.last().copied().unwrap_or_else(|| Fp::from(EMPTY_LEAF));
            roots.push(merkle_crh(level, below, below));
        }
        roots
    };
}

/// The Merkle node hash at `level` (leaves are level 0).
#[must_use]
pub fn merkle_crh(level: u8, left: Fp, right: Fp) -> Fp {
    let hash = blake2b_simd::Params::new()
        .hash_length(64)
        .personal(MERKLE_CRH_PERSONALIZATION)
        .to_state()
        .update(&[level])
        .update(&left.to_repr())
        .update(&right.to_repr())
        .finalize();
    Fp::from_uniform_bytes(hash.as_array())
}

/// Root of an empty subtree of height `level`.
#[must_use]
pub fn empty_root(level: u8) -> Fp {
    EMPTY_ROOTS
        .get(usize::from(level))
        .copied()
        .unwrap_or_else(|| Fp::from(EMPTY_LEAF))
}

/// Array index of the leaf at global `position`.
#[must_use]
pub const fn leaf_index(position: u64) -> u64 {
    tree_base(position) + TREE_LEAF_OFFSET + (position & (TREE_LEAVES - 1))
}

/// First array index of the tree holding global `position`.
#[must_use]
pub const fn tree_base(position: u64) -> u64 {
    (position >> MERKLE_DEPTH) * TREE_ARRAY_LEN
}

/// A commitment tree root. Spends prove membership against one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor(#[serde(with = "crate::encoding::field")] Fp);

impl Anchor {
    /// The root of a tree with no leaves.
    #[must_use]
    pub fn empty() -> Self {
        Self(empty_root(MERKLE_DEPTH))
    }

    /// Canonical 32-byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr()
    }
}

impl From<Fp> for Anchor {
    fn from(el: Fp) -> Self {
        Self(el)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.to_bytes()))
    }
}

/// Authentication path: sibling hashes from the leaf up, plus the leaf's
/// global position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    position: u64,
    siblings: Vec<Fp>,
}

impl MerklePath {
    /// Assemble a path from its parts.
    #[must_use]
    pub const fn from_parts(position: u64, siblings: Vec<Fp>) -> Self {
        Self { position, siblings }
    }

    /// The leaf's global position.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Sibling hashes, leaf level first.
    #[must_use]
    pub fn siblings(&self) -> &[Fp] {
        &self.siblings
    }

    /// The root obtained by hashing `cm` up this path.
    #[must_use]
    pub fn root(&self, cm: Commitment) -> Anchor {
        let mut node = Fp::from(cm);
        let mut index = self.position & (TREE_LEAVES - 1);
        for (level, sibling) in (0u8..).zip(&self.siblings) {
            node = if index & 1 == 0 {
                merkle_crh(level, node, *sibling)
            } else {
                merkle_crh(level, *sibling, node)
            };
            index >>= 1;
        }
        Anchor(node)
    }
}

/// Commitment tree lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The chain state could not be read.
    #[error("commitment tree unavailable: {0}")]
    TreeUnavailable(#[from] ChainError),

    /// The position is beyond the current tree size.
    #[error("position {position} not in tree of {leaf_count} leaves")]
    PositionNotFound {
        /// Requested leaf.
        position: u64,
        /// Leaves on chain.
        leaf_count: u64,
    },
}

/// Reads roots and authentication paths from chain state.
#[derive(Debug)]
pub struct TreeClient<'chain, C: ?Sized> {
    chain: &'chain C,
}

impl<'chain, C: ChainReader + ?Sized> TreeClient<'chain, C> {
    /// Client over `chain`.
    pub const fn new(chain: &'chain C) -> Self {
        Self { chain }
    }

    async fn node_or_empty(&self, index: u64, level: u8) -> Result<Fp, TreeError> {
        Ok(self
            .chain
            .merkle_node(index)
            .await?
            .unwrap_or_else(|| empty_root(level)))
    }

    /// The root of the tree holding the most recent leaf.
    pub async fn root(&self) -> Result<Anchor, TreeError> {
        let global = self.chain.global().await?;
        let Some(last) = global.leaf_count.checked_sub(1) else {
            return Ok(Anchor::empty());
        };
        let root = self.node_or_empty(tree_base(last), MERKLE_DEPTH).await?;
        Ok(Anchor(root))
    }

    /// The authentication path of the leaf at `position`.
    pub async fn path(&self, position: u64) -> Result<MerklePath, TreeError> {
        let global = self.chain.global().await?;
        if position >= global.leaf_count {
            return Err(TreeError::PositionNotFound {
                position,
                leaf_count: global.leaf_count,
            });
        }

        let base = tree_base(position);
        let mut index = leaf_index(position) - base;
        let mut siblings = Vec::with_capacity(usize::from(MERKLE_DEPTH));
        for level in 0..MERKLE_DEPTH {
            let sibling = if index & 1 == 1 { index + 1 } else { index - 1 };
            siblings.push(self.node_or_empty(base + sibling, level).await?);
            index = (index - 1) >> 1;
        }
        debug!(position, "fetched authentication path");
        Ok(MerklePath { position, siblings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;

    #[test]
    fn empty_roots_chain_up() {
        assert_eq!(empty_root(0), Fp::from(2u64));
        assert_eq!(empty_root(1), merkle_crh(0, Fp::from(2u64), Fp::from(2u64)));
        assert_eq!(Anchor::empty(), Anchor(empty_root(MERKLE_DEPTH)));
    }

    #[test]
    fn array_layout() {
        assert_eq!(leaf_index(0), TREE_LEAF_OFFSET);
        assert_eq!(leaf_index(5), TREE_LEAF_OFFSET + 5);
        assert_eq!(leaf_index(TREE_LEAVES), TREE_ARRAY_LEN + TREE_LEAF_OFFSET);
        assert_eq!(tree_base(TREE_LEAVES + 3), TREE_ARRAY_LEN);
    }

    #[tokio::test]
    async fn paths_hash_to_the_root() {
        let chain = MemoryChain::new();
        let leaves: Vec<Commitment> = (10u64..15).map(|seed| Commitment::from(Fp::from(seed))).collect();
        for cm in &leaves {
            chain.append(*cm);
        }
        let client = TreeClient::new(&chain);
        let root = client.root().await.unwrap();

        for (position, cm) in (0u64..).zip(&leaves) {
            let path = client.path(position).await.unwrap();
            assert_eq!(path.siblings().len(), usize::from(MERKLE_DEPTH));
            assert_eq!(path.root(*cm), root, "leaf {position}");
        }
        assert_ne!(root, Anchor::empty());
    }

    #[tokio::test]
    async fn missing_position_and_unreachable_chain() {
        let chain = MemoryChain::new();
        chain.append(Commitment::from(Fp::from(1u64)));
        let client = TreeClient::new(&chain);

        assert!(matches!(
            client.path(1).await,
            Err(TreeError::PositionNotFound {
                position: 1,
                leaf_count: 1
            })
        ));

        chain.set_available(false);
        assert!(matches!(client.root().await, Err(TreeError::TreeUnavailable(_))));
        assert!(matches!(client.path(0).await, Err(TreeError::TreeUnavailable(_))));
    }

    #[tokio::test]
    async fn empty_chain_has_empty_root() {
        let chain = MemoryChain::new();
        assert_eq!(TreeClient::new(&chain).root().await.unwrap(), Anchor::empty());
    }
}
