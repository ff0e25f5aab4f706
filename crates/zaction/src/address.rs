//! Shielded payment addresses.
//!
//! An address is `(d, pk_d)`: an 11-byte diversifier and a 32-byte X25519
//! transmission key. The raw encoding is the 43-byte concatenation; the text
//! encoding is its lowercase hex.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

/// Length of a raw address encoding.
pub const ADDRESS_LEN: usize = 43;

/// An address diversifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Diversifier([u8; 11]);

impl Diversifier {
    /// The raw diversifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }
}

impl From<[u8; 11]> for Diversifier {
    fn from(bytes: [u8; 11]) -> Self {
        Self(bytes)
    }
}

/// A shielded address: where notes are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    diversifier: Diversifier,
    transmission_key: [u8; 32],
}

/// Errors decoding an [`Address`] from text.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum AddressDecodeError {
    /// Not valid hex.
    #[error("address is not hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Wrong raw length.
    #[error("address must be {ADDRESS_LEN} bytes, got {0}")]
    Length(usize),
}

impl Address {
    pub(crate) const fn from_parts(diversifier: Diversifier, transmission_key: [u8; 32]) -> Self {
        Self {
            diversifier,
            transmission_key,
        }
    }

    /// The diversifier.
    #[must_use]
    pub const fn diversifier(&self) -> &Diversifier {
        &self.diversifier
    }

    /// The X25519 transmission key `pk_d`.
    #[must_use]
    pub const fn transmission_key(&self) -> &[u8; 32] {
        &self.transmission_key
    }

    /// Raw 43-byte encoding `d || pk_d`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        let mut raw = [0u8; ADDRESS_LEN];
        for (dst, src) in raw
            .iter_mut()
            .zip(self.diversifier.0.iter().chain(&self.transmission_key))
        {
            *dst = *src;
        }
        raw
    }

    /// Parse the raw 43-byte encoding.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, AddressDecodeError> {
        let (diversifier, pk_d) = raw
            .split_first_chunk::<11>()
            .ok_or(AddressDecodeError::Length(raw.len()))?;
        let transmission_key: [u8; 32] = pk_d
            .try_into()
            .map_err(|_err| AddressDecodeError::Length(raw.len()))?;
        Ok(Self::from_parts(Diversifier(*diversifier), transmission_key))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.to_bytes()))
    }
}

impl FromStr for Address {
    type Err = AddressDecodeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(&hex::decode(text.trim())?)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Address {
        Address::from_parts(Diversifier::from([7u8; 11]), [9u8; 32])
    }

    #[test]
    fn text_encoding_is_hex_of_raw_bytes() {
        let addr = sample();
        let text = addr.to_string();
        assert_eq!(text.len(), ADDRESS_LEN * 2);
        assert!(text.starts_with("0707070707070707070707"), "{text}");
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn malformed_addresses_rejected() {
        assert_eq!(
            "0a0b".parse::<Address>(),
            Err(AddressDecodeError::Length(2))
        );
        assert!(matches!(
            "zz".repeat(ADDRESS_LEN).parse::<Address>(),
            Err(AddressDecodeError::Hex(_))
        ));
        let too_long = format!("{}00", sample());
        assert_eq!(
            too_long.parse::<Address>(),
            Err(AddressDecodeError::Length(44))
        );
    }

    #[test]
    fn hex_errors_compare_by_value() {
        let err = "0g".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            AddressDecodeError::Hex(hex::FromHexError::InvalidHexCharacter { c: 'g', index: 1 })
        );
        assert_ne!(err, AddressDecodeError::Length(1));
    }
}
