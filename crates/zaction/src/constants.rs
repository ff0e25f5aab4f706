//! Protocol-wide domain separators, personalizations and tree parameters.
//!
//! All BLAKE2b personalizations are exactly 16 bytes (the BLAKE2b
//! personal field width). Hash-to-curve domains use variable-length strings
//! under the `z.cash:` namespace.

/// BLAKE2b-512 personalization for `PRF^expand`: key expansion from
/// a spending key to child keys, and from a note's `rseed` to its trapdoors.
pub const PRF_EXPAND_PERSONALIZATION: &[u8; 16] = b"Zcash_ExpandSeed";

/// BLAKE2b-256 personalization hashing a wallet seed phrase into a
/// spending key.
pub const SEED_PERSONALIZATION: &[u8; 16] = b"ZAction_SeedHash";

/// BLAKE2b personalization for diversifier derivation from `dk`.
pub const DIVERSIFIER_PERSONALIZATION: &[u8; 16] = b"ZAction_Diversfy";

/// BLAKE2b-256 personalization deriving `ivk` from `(ak, nk)`.
pub const IVK_PERSONALIZATION: &[u8; 16] = b"ZAction_IvkDeriv";

/// BLAKE2b-256 personalization deriving the per-address X25519 secret.
pub const ADDRESS_SECRET_PERSONALIZATION: &[u8; 16] = b"ZAction_AddrSkey";

/// BLAKE2b-512 personalization for note commitments.
pub const NOTE_COMMITMENT_PERSONALIZATION: &[u8; 16] = b"ZAction_NoteCmmt";

/// BLAKE2b-512 personalization for nullifiers.
pub const NULLIFIER_PERSONALIZATION: &[u8; 16] = b"ZAction_Nullifie";

/// BLAKE2b-512 personalization for the Merkle tree node hash.
pub const MERKLE_CRH_PERSONALIZATION: &[u8; 16] = b"ZAction_MerkleCR";

/// BLAKE2b-256 personalization for the note encryption KDF.
pub const NOTE_KDF_PERSONALIZATION: &[u8; 16] = b"ZAction_NoteKdf_";

/// BLAKE2b-512 personalization for the bundle sighash.
///
/// All signatures (spend authorization and binding) sign this same digest:
/// the anchor, every action's public statement and ciphertexts, and the
/// per-asset value balance.
pub const SIGHASH_PERSONALIZATION: &[u8; 16] = b"ZAction_BndlHash";

/// Domain for the randomness generator `R`.
///
/// Shared with Orchard to reuse `reddsa::orchard::Binding`: same
/// generator, same binding signature verification.
pub const VALUE_COMMITMENT_R_DOMAIN: &str = "z.cash:Orchard-cv";

/// Domain for per-asset value generators `V_asset`.
pub const VALUE_COMMITMENT_V_DOMAIN: &str = "z.cash:ZAction-cv";

/// Depth of every commitment tree.
pub const MERKLE_DEPTH: u8 = 32;

/// Leaves in one full commitment tree: `2^depth`.
pub const TREE_LEAVES: u64 = 1 << MERKLE_DEPTH;

/// Array offset of the leftmost leaf inside one tree: `2^depth - 1`.
pub const TREE_LEAF_OFFSET: u64 = TREE_LEAVES - 1;

/// Array slots occupied by one full tree: `2^(depth+1) - 1`.
pub const TREE_ARRAY_LEN: u64 = (TREE_LEAVES << 1) - 1;

/// Length of a note memo, in bytes.
pub const MEMO_LEN: usize = 512;

/// Minimum wallet seed length, in characters.
pub const MIN_SEED_LEN: usize = 32;

/// Domain-separated key expansion.
///
/// `PRF^expand_key(t || parts) = BLAKE2b-512("Zcash_ExpandSeed", key || t ||
/// parts)`
///
/// Mirrors `zcash_spec::PrfExpand`: a struct with a single-byte domain
/// separator and associated constants for each derivation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PrfExpand {
    domain_separator: u8,
}

impl PrfExpand {
    // 0x00-0x08 are Sapling and Orchard; zaction allocates 0x10+.

    /// `[0x10]` -> `ask` (spend authorizing key, scalar field)
    pub(crate) const ASK: Self = Self {
        domain_separator: 0x10,
    };
    /// `[0x11]` -> `nk` (nullifier key, base field)
    pub(crate) const NK: Self = Self {
        domain_separator: 0x11,
    };
    /// `[0x12]` -> `dk` (diversifier key)
    pub(crate) const DK: Self = Self {
        domain_separator: 0x12,
    };
    /// `[0x13] || rho` -> `rcm` (note commitment trapdoor)
    pub(crate) const RCM: Self = Self {
        domain_separator: 0x13,
    };
    /// `[0x14] || rho` -> `psi` (nullifier trapdoor)
    pub(crate) const PSI: Self = Self {
        domain_separator: 0x14,
    };

    /// Evaluate the PRF over `key || domain_sep || parts`.
    ///
    /// Returns 64 bytes suitable for unbiased reduction into either field
    /// via `FromUniformBytes`.
    pub(crate) fn with(self, key: &[u8; 32], parts: &[&[u8]]) -> [u8; 64] {
        let mut state = blake2b_simd::Params::new()
            .hash_length(64)
            .personal(PRF_EXPAND_PERSONALIZATION)
            .to_state();
        state.update(key);
        state.update(&[self.domain_separator]);
        for part in parts {
            state.update(part);
        }
        *state.finalize().as_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Same key, different domain separators -> different outputs.
    #[test]
    fn prf_expand_domain_separators_independent() {
        let sk = [0x42u8; 32];
        let ask = PrfExpand::ASK.with(&sk, &[]);
        let nk = PrfExpand::NK.with(&sk, &[]);
        let dk = PrfExpand::DK.with(&sk, &[]);
        assert_ne!(ask, nk);
        assert_ne!(ask, dk);
        assert_ne!(nk, dk);
    }

    #[test]
    fn tree_layout_constants() {
        assert_eq!(TREE_LEAVES, 4_294_967_296);
        assert_eq!(TREE_LEAF_OFFSET, 4_294_967_295);
        assert_eq!(TREE_ARRAY_LEN, 8_589_934_591);
    }
}
