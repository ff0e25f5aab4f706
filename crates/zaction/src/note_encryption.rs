//! Note encryption.
//!
//! ```text
//! 1. Sender generates an ephemeral X25519 key pair (esk, epk)
//! 2. shared = X25519(esk, pk_d)
//! 3. key = BLAKE2b-256("ZAction_NoteKdf_", shared || epk)
//! 4. ciphertext = ChaCha20-Poly1305(key, nonce, note)
//! ```
//!
//! Every committed output (recipient and change) is encrypted to the
//! transmission key of its own address, so the owner can find it by
//! scanning the chain.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead as _, KeyInit as _},
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::{address::Address, constants::NOTE_KDF_PERSONALIZATION, note::Note};

/// An encrypted note, published next to its commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNote {
    /// Ephemeral public key.
    #[serde(with = "crate::encoding")]
    pub epk: [u8; 32],
    /// ChaCha20-Poly1305 nonce.
    #[serde(with = "crate::encoding")]
    pub nonce: [u8; 12],
    /// Encrypted note with authentication tag.
    #[serde(with = "crate::encoding::bytes")]
    pub ciphertext: Vec<u8>,
}

/// Note encryption failed.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    /// The plaintext could not be encoded.
    #[error("note encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The AEAD rejected the plaintext.
    #[error("note encryption failed")]
    Aead,
}

impl EncryptedNote {
    /// Canonical encoding for the sighash.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 12 + self.ciphertext.len());
        out.extend_from_slice(&self.epk);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }
}

fn kdf(shared: &[u8; 32], epk: &[u8; 32]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(NOTE_KDF_PERSONALIZATION)
        .to_state()
        .update(shared)
        .update(epk)
        .finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_bytes());
    key
}

/// Encrypt `note` to its own address. The position is not encrypted.
pub fn encrypt(note: &Note, rng: &mut (impl RngCore + CryptoRng)) -> Result<EncryptedNote, EncryptionError> {
    let esk = EphemeralSecret::random_from_rng(&mut *rng);
    let epk = PublicKey::from(&esk);
    let shared = esk.diffie_hellman(&PublicKey::from(*note.address.transmission_key()));
    let key = kdf(shared.as_bytes(), epk.as_bytes());

    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce);

    let mut plaintext = *note;
    plaintext.position = None;
    let encoded = serde_json::to_vec(&plaintext)?;

    let ciphertext = ChaCha20Poly1305::new(Key::from_slice(&key))
        .encrypt(Nonce::from_slice(&nonce), encoded.as_slice())
        .map_err(|_err| EncryptionError::Aead)?;

    Ok(EncryptedNote {
        epk: epk.to_bytes(),
        nonce,
        ciphertext,
    })
}

/// Try to decrypt with the secret behind `address`.
///
/// Returns `None` unless the ciphertext opens and the note inside is
/// addressed to `address`.
#[must_use]
pub fn try_decrypt(encrypted: &EncryptedNote, secret: &StaticSecret, address: &Address) -> Option<Note> {
    let shared = secret.diffie_hellman(&PublicKey::from(encrypted.epk));
    let key = kdf(shared.as_bytes(), &encrypted.epk);
    let plaintext = ChaCha20Poly1305::new(Key::from_slice(&key))
        .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_slice())
        .ok()?;
    let note: Note = serde_json::from_slice(&plaintext).ok()?;
    (note.address == *address).then_some(note)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::{
        keys::private::SpendingKey,
        note::Memo,
        value::{AssetId, NoteKind},
    };

    #[test]
    fn only_the_recipient_decrypts() {
        let mut rng = StdRng::seed_from_u64(0);
        let sk = SpendingKey::from([7u8; 32]);
        let ivk = sk.proof_authorizing_key().incoming_viewing_key();
        let d0 = sk.diversifier_key().diversifier(0);
        let d1 = sk.diversifier_key().diversifier(1);
        let address = ivk.address(d0);

        let mut note = Note::new(
            address,
            NoteKind::Fungible,
            AssetId::default(),
            30,
            Memo::from_bytes(b"This is a test!").unwrap(),
            &mut rng,
        );
        note.position = Some(4);
        let encrypted = encrypt(&note, &mut rng).unwrap();

        let opened = try_decrypt(&encrypted, &ivk.secret(&d0), &address).unwrap();
        assert_eq!(opened.commitment(), note.commitment());
        assert_eq!(opened.memo.text(), "This is a test!");
        assert_eq!(opened.position, None);

        assert!(try_decrypt(&encrypted, &ivk.secret(&d1), &ivk.address(d1)).is_none());
    }

    #[test]
    fn notes_of_unnamed_contracts_decrypt() {
        let mut rng = StdRng::seed_from_u64(1);
        let sk = SpendingKey::from([8u8; 32]);
        let ivk = sk.proof_authorizing_key().incoming_viewing_key();
        let d0 = sk.diversifier_key().diversifier(0);
        let address = ivk.address(d0);

        let token = Note::new(address, NoteKind::Auth, AssetId::default(), 0, Memo::EMPTY, &mut rng);
        let encrypted = encrypt(&token, &mut rng).unwrap();
        let opened = try_decrypt(&encrypted, &ivk.secret(&d0), &address).unwrap();
        assert_eq!(opened.kind, NoteKind::Auth);
        assert_eq!(opened.asset.contract, crate::name::Name::ZERO);
        assert_eq!(opened.commitment(), token.commitment());
    }
}
