//! Hex serde helpers for fixed-size byte arrays and field elements.
//!
//! Usable as `#[serde(with = "crate::encoding")]` on `[u8; N]` fields.

use ff::PrimeField;
use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

pub(crate) fn serialize<S: Serializer, const N: usize>(
    bytes: &[u8; N],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
) -> Result<[u8; N], D::Error> {
    let text = String::deserialize(deserializer)?;
    decode_array(&text).map_err(D::Error::custom)
}

/// Decode exactly `N` bytes of hex.
pub(crate) fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(text).map_err(|err| err.to_string())?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_bytes: Vec<u8>| format!("expected {N} bytes, got {len}"))
}

/// Canonical field element from its 32-byte little-endian repr.
pub(crate) fn field_from_bytes<F: PrimeField<Repr = [u8; 32]>>(bytes: [u8; 32]) -> Option<F> {
    F::from_repr(bytes).into()
}

/// Serde for pallas field elements as hex of the canonical repr.
pub(crate) mod field {
    use ff::PrimeField;
    use serde::{Deserializer, Serializer, de::Error as _};

    pub(crate) fn serialize<S: Serializer, F: PrimeField<Repr = [u8; 32]>>(
        el: &F,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        super::serialize(&el.to_repr(), serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>, F: PrimeField<Repr = [u8; 32]>>(
        deserializer: D,
    ) -> Result<F, D::Error> {
        let bytes: [u8; 32] = super::deserialize(deserializer)?;
        super::field_from_bytes(bytes).ok_or_else(|| D::Error::custom("non-canonical field element"))
    }
}

/// Serde for variable-length byte strings as hex.
pub(crate) mod bytes {
    use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(D::Error::custom)
    }
}
