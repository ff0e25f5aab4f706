//! Ledger account names and token symbols.
//!
//! Names are the ledger's base-32 encoding of up to 13 characters from
//! `.12345abcdefghijklmnopqrstuvwxyz` into a `u64`. Symbols pack an
//! uppercase code of up to 7 letters above an 8-bit precision.

use core::{
    fmt::{self, Write as _},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

const NAME_CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Errors parsing a [`Name`] or [`Symbol`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Longer than 13 characters.
    #[error("name {0:?} is longer than 13 characters")]
    TooLong(String),

    /// Character outside `.1-5a-z`, or a 13th character past `j`.
    #[error("name {0:?} contains an invalid character")]
    InvalidCharacter(String),

    /// Symbol code not 1-7 uppercase letters.
    #[error("symbol code {0:?} must be 1-7 uppercase letters")]
    InvalidSymbol(String),
}

/// A ledger account or action name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u64);

fn char_to_value(byte: u8) -> Option<u64> {
    match byte {
        b'.' => Some(0),
        b'1'..=b'5' => Some(u64::from(byte - b'1') + 1),
        b'a'..=b'z' => Some(u64::from(byte - b'a') + 6),
        _ => None,
    }
}

impl Name {
    /// The empty name.
    pub const ZERO: Self = Self(0);

    /// A name from its raw encoding, usable in constants.
    #[must_use]
    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    /// The raw `u64` encoding.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Name {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bytes = text.as_bytes();
        if bytes.len() > 13 {
            return Err(NameError::TooLong(text.to_owned()));
        }
        let invalid = || NameError::InvalidCharacter(text.to_owned());

        let mut value = 0u64;
        let mut used = 0u32;
        for byte in bytes.iter().take(12) {
            value = (value << 5) | char_to_value(*byte).ok_or_else(invalid)?;
            used += 1;
        }
        // an empty name shifts by the full width
        value = value.checked_shl(4 + 5 * (12 - used)).unwrap_or_default();

        if let Some(last) = bytes.get(12) {
            let tail = char_to_value(*last).ok_or_else(invalid)?;
            if tail > 0x0f {
                return Err(invalid());
            }
            value |= tail;
        }
        Ok(Self(value))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        for position in 0u8..13 {
            if rest == 0 {
                break;
            }
            let shift = if position == 12 { 60 } else { 59 };
            let index = usize::try_from((rest & 0xf800_0000_0000_0000) >> shift).map_err(|_err| fmt::Error)?;
            let ch = NAME_CHARMAP.get(index).ok_or(fmt::Error)?;
            formatter.write_char(char::from(*ch))?;
            rest <<= 5;
        }
        Ok(())
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A token symbol: `code << 8 | precision`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u64);

impl Symbol {
    /// Pack an uppercase code and a precision.
    pub fn new(code: &str, precision: u8) -> Result<Self, NameError> {
        let invalid = || NameError::InvalidSymbol(code.to_owned());
        if code.is_empty() || code.len() > 7 {
            return Err(invalid());
        }
        let mut raw = 0u64;
        for byte in code.bytes().rev() {
            if !byte.is_ascii_uppercase() {
                return Err(invalid());
            }
            raw = (raw << 8) | u64::from(byte);
        }
        Ok(Self((raw << 8) | u64::from(precision)))
    }

    /// The raw `u64` encoding.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The code in its raw `u64` encoding (the symbol without precision).
    #[must_use]
    pub const fn code_value(self) -> u64 {
        self.0 >> 8
    }

    /// The code as text.
    #[must_use]
    pub fn code(self) -> String {
        self.code_value()
            .to_le_bytes()
            .iter()
            .take_while(|byte| **byte != 0)
            .map(|byte| char::from(*byte))
            .collect()
    }

    /// Decimal places.
    #[must_use]
    pub fn precision(self) -> u8 {
        self.0.to_le_bytes().first().copied().unwrap_or_default()
    }
}

impl From<u64> for Symbol {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{},{}", self.precision(), self.code())
    }
}
