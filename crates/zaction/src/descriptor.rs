//! Caller-facing transaction requests.
//!
//! A request is an ordered list of transparent ledger actions, each with
//! the zaction descriptors that execute alongside it. Descriptors arrive as
//! loosely typed JSON ([`ZActionDesc`]) and are parsed into a
//! [`Descriptor`] before any note is touched.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, AddressDecodeError},
    config::Settings,
    name::{Name, NameError, Symbol},
    note::{Commitment, Memo, MemoTooLong},
    value::{AssetId, NoteKind},
};

/// The operation a zaction performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub enum ZActionType {
    /// Padding: no notes, zero value.
    Null,
    /// Shield fungible value into a new note.
    MintFt,
    /// Shield an NFT into a new note.
    MintNft,
    /// Issue an auth token to a shielded address.
    MintAuth,
    /// Move fungible value between notes.
    TransferFt,
    /// Move an NFT to a new owner.
    TransferNft,
    /// Unshield fungible value to a ledger account.
    BurnFt,
    /// Unshield an NFT to a ledger account.
    BurnNft,
    /// Consume an auth token, revealing its commitment to the issuing
    /// contract.
    BurnAuth,
}

/// A descriptor code with no supported operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported zaction type {0}")]
pub struct UnsupportedType(pub u64);

impl ZActionType {
    /// The wire code.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Null => 0x0,
            Self::MintFt => 0x1,
            Self::MintNft => 0x2,
            Self::MintAuth => 0x3,
            Self::TransferFt => 0x4,
            Self::TransferNft => 0x5,
            Self::BurnFt => 0x6,
            Self::BurnNft => 0x8,
            Self::BurnAuth => 0x9,
        }
    }

    /// Fungible, NFT or auth token.
    #[must_use]
    pub const fn kind(self) -> NoteKind {
        match self {
            Self::Null | Self::MintFt | Self::TransferFt | Self::BurnFt => NoteKind::Fungible,
            Self::MintNft | Self::TransferNft | Self::BurnNft => NoteKind::NonFungible,
            Self::MintAuth | Self::BurnAuth => NoteKind::Auth,
        }
    }

    /// Whether the action spends an existing note.
    #[must_use]
    pub const fn spends(self) -> bool {
        matches!(
            self,
            Self::TransferFt | Self::TransferNft | Self::BurnFt | Self::BurnNft | Self::BurnAuth
        )
    }

    /// Whether the action commits a recipient output.
    #[must_use]
    pub const fn has_output(self) -> bool {
        matches!(
            self,
            Self::MintFt | Self::MintNft | Self::MintAuth | Self::TransferFt | Self::TransferNft
        )
    }

    /// Whether value crosses the pool boundary publicly.
    #[must_use]
    pub const fn is_public(self) -> bool {
        matches!(
            self,
            Self::MintFt | Self::MintNft | Self::BurnFt | Self::BurnNft
        )
    }

    /// Whether the action may carry a change output.
    #[must_use]
    pub const fn has_change(self) -> bool {
        matches!(self, Self::TransferFt | Self::BurnFt)
    }
}

impl From<ZActionType> for u64 {
    fn from(za_type: ZActionType) -> Self {
        za_type.code()
    }
}

impl TryFrom<u64> for ZActionType {
    type Error = UnsupportedType;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            0x0 => Ok(Self::Null),
            0x1 => Ok(Self::MintFt),
            0x2 => Ok(Self::MintNft),
            0x3 => Ok(Self::MintAuth),
            0x4 => Ok(Self::TransferFt),
            0x5 => Ok(Self::TransferNft),
            0x6 => Ok(Self::BurnFt),
            0x8 => Ok(Self::BurnNft),
            0x9 => Ok(Self::BurnAuth),
            other => Err(UnsupportedType(other)),
        }
    }
}

impl fmt::Display for ZActionType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Null => "null",
            Self::MintFt => "mintft",
            Self::MintNft => "mintnft",
            Self::MintAuth => "mintauth",
            Self::TransferFt => "transferft",
            Self::TransferNft => "transfernft",
            Self::BurnFt => "burnft",
            Self::BurnNft => "burnnft",
            Self::BurnAuth => "burnauth",
        };
        formatter.write_str(label)
    }
}

/// A `u64` given as a JSON number or as a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Word {
    /// A JSON number.
    Number(u64),
    /// Decimal text, or for some fields a ledger name or symbol.
    Text(String),
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Word {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// A zaction descriptor as the caller writes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZActionDesc {
    /// Operation code.
    pub za_type: u64,
    /// Hex address for mints and transfers, ledger account for burns, hex
    /// commitment of the token for auth burns.
    pub to: String,
    /// Amount, or NFT token id.
    pub d1: Word,
    /// Symbol, configured token code, or NFT category.
    pub d2: Word,
    /// Issuing contract; may be empty when `d2` is a configured token code.
    pub sc: Word,
    /// Memo text.
    #[serde(default)]
    pub memo: String,
    /// Hex address receiving change instead of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_to: Option<String>,
}

/// Where a descriptor's value goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// A new shielded note.
    Shielded(Address),
    /// A ledger account, for burns.
    Ledger(Name),
    /// The auth token an auth burn consumes.
    AuthToken(Commitment),
}

/// A malformed descriptor.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    /// The type code has no operation.
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedType),

    /// A shielded address did not decode.
    #[error("bad address {text:?}: {source}")]
    Address {
        /// The offending text.
        text: String,
        /// Why it failed.
        source: AddressDecodeError,
    },

    /// A ledger name did not parse.
    #[error(transparent)]
    Name(#[from] NameError),

    /// An auth token commitment is not 32 canonical hex bytes.
    #[error("bad auth token commitment {0:?}")]
    Commitment(String),

    /// A numeric field is neither a number nor valid text for it.
    #[error("field {field} is not a valid value: {text:?}")]
    Number {
        /// `d1`, `d2` or `sc`.
        field: &'static str,
        /// The offending text.
        text: String,
    },

    /// Fungible amounts must be positive.
    #[error("zero amount")]
    ZeroAmount,

    /// The memo does not fit a note.
    #[error(transparent)]
    Memo(#[from] MemoTooLong),
}

/// A validated descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    /// Operation.
    pub za_type: ZActionType,
    /// Destination.
    pub recipient: Recipient,
    /// Token class.
    pub asset: AssetId,
    /// Amount, or NFT token id.
    pub value: u64,
    /// Memo for the output (or the ledger transfer on burns).
    pub memo: Memo,
    /// Redirected change address.
    pub change_to: Option<Address>,
}

fn parse_address(text: &str) -> Result<Address, DescriptorError> {
    text.parse().map_err(|source| DescriptorError::Address {
        text: text.to_owned(),
        source,
    })
}

fn parse_commitment(text: &str) -> Result<Commitment, DescriptorError> {
    let invalid = || DescriptorError::Commitment(text.to_owned());
    let bytes: [u8; 32] = hex::decode(text.trim())
        .map_err(|_err| invalid())?
        .try_into()
        .map_err(|_err| invalid())?;
    Commitment::from_bytes(&bytes).ok_or_else(invalid)
}

fn number(word: &Word, field: &'static str) -> Result<u64, DescriptorError> {
    match word {
        Word::Number(value) => Ok(*value),
        Word::Text(text) => text.parse().map_err(|_err| DescriptorError::Number {
            field,
            text: text.clone(),
        }),
    }
}

/// `d2` accepts a raw number or `"precision,CODE"`.
fn symbol(word: &Word) -> Result<u64, DescriptorError> {
    let invalid = || DescriptorError::Number {
        field: "d2",
        text: match word {
            Word::Number(value) => value.to_string(),
            Word::Text(text) => text.clone(),
        },
    };
    match word {
        Word::Number(value) => Ok(*value),
        Word::Text(text) => match text.split_once(',') {
            Some((precision, code)) => {
                let precision: u8 = precision.parse().map_err(|_err| invalid())?;
                Ok(Symbol::new(code, precision)?.value())
            }
            None => text.parse().map_err(|_err| invalid()),
        },
    }
}

/// A bare code in `d2` naming a configured token.
fn configured_token(word: &Word, settings: &Settings) -> Result<Option<AssetId>, DescriptorError> {
    let Word::Text(code) = word else {
        return Ok(None);
    };
    settings.token(code).map_err(|_err| DescriptorError::Number {
        field: "d2",
        text: code.clone(),
    })
}

fn is_empty(word: &Word) -> bool {
    matches!(word, Word::Text(text) if text.is_empty())
}

/// `sc` accepts a raw number or a ledger name.
fn contract(word: &Word) -> Result<Name, DescriptorError> {
    match word {
        Word::Number(value) => Ok(Name::from(*value)),
        Word::Text(text) => match text.parse::<u64>() {
            Ok(value) => Ok(Name::from(value)),
            Err(_) => Ok(text.parse()?),
        },
    }
}

impl Descriptor {
    /// Validate a caller descriptor. `Null` is padding and never accepted
    /// from callers.
    pub fn parse(desc: &ZActionDesc) -> Result<Self, DescriptorError> {
        Self::parse_with(desc, &Settings::default())
    }

    /// [`parse`](Self::parse), also resolving a token code in `d2` through
    /// `settings`. The configured contract applies when `sc` is empty.
    pub fn parse_with(desc: &ZActionDesc, settings: &Settings) -> Result<Self, DescriptorError> {
        let za_type = ZActionType::try_from(desc.za_type)?;
        if za_type == ZActionType::Null {
            return Err(UnsupportedType(desc.za_type).into());
        }

        let recipient = if za_type.has_output() {
            Recipient::Shielded(parse_address(&desc.to)?)
        } else if za_type == ZActionType::BurnAuth {
            Recipient::AuthToken(parse_commitment(&desc.to)?)
        } else {
            Recipient::Ledger(desc.to.parse()?)
        };
        let value = number(&desc.d1, "d1")?;
        if za_type.kind() == NoteKind::Fungible && value == 0 {
            return Err(DescriptorError::ZeroAmount);
        }
        let asset = match configured_token(&desc.d2, settings)? {
            Some(token) if is_empty(&desc.sc) => token,
            Some(token) => AssetId {
                symbol: token.symbol,
                contract: contract(&desc.sc)?,
            },
            None => AssetId {
                symbol: symbol(&desc.d2)?,
                contract: contract(&desc.sc)?,
            },
        };
        let memo = Memo::from_bytes(desc.memo.as_bytes())?;
        let change_to = desc
            .change_to
            .as_deref()
            .map(parse_address)
            .transpose()?;

        Ok(Self {
            za_type,
            recipient,
            asset,
            value,
            memo,
            change_to,
        })
    }
}

/// `{actor, permission}` on a ledger action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionLevel {
    /// Authorizing account.
    pub actor: Name,
    /// Permission of that account.
    pub permission: Name,
}

/// An opaque transparent ledger call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparentAction {
    /// Contract account.
    pub account: Name,
    /// Action name.
    pub name: Name,
    /// Required authorizations.
    pub authorization: Vec<PermissionLevel>,
    /// Action payload, passed through untouched.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One request entry: a transparent action and its zactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEntry {
    /// The ledger call.
    pub action: TransparentAction,
    /// Zactions executed alongside it.
    #[serde(default)]
    pub zaction_descs: Vec<ZActionDesc>,
}

/// An ordered transaction request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRequest(pub Vec<RequestEntry>);

impl TransactionRequest {
    /// Every descriptor, in request order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ZActionDesc> {
        self.0.iter().flat_map(|entry| entry.zaction_descs.iter())
    }
}

#[cfg(test)]
mod tests {
    use pasta_curves::Fp;

    use super::*;
    use crate::keys::private::SpendingKey;

    fn address_hex() -> String {
        let sk = SpendingKey::from([1u8; 32]);
        sk.proof_authorizing_key()
            .incoming_viewing_key()
            .address(sk.diversifier_key().diversifier(0))
            .to_string()
    }

    #[test]
    fn codes_round_trip_and_gaps_are_unsupported() {
        for za_type in [
            ZActionType::Null,
            ZActionType::MintFt,
            ZActionType::MintNft,
            ZActionType::MintAuth,
            ZActionType::TransferFt,
            ZActionType::TransferNft,
            ZActionType::BurnFt,
            ZActionType::BurnNft,
            ZActionType::BurnAuth,
        ] {
            assert_eq!(ZActionType::try_from(za_type.code()), Ok(za_type));
        }
        for code in [7u64, 10, 0xDEAD_BEEF] {
            assert_eq!(ZActionType::try_from(code), Err(UnsupportedType(code)));
        }
    }

    #[test]
    fn parses_request_json() {
        let json = format!(
            r#"[{{
                "action": {{
                    "account": "eosio.token",
                    "name": "transfer",
                    "authorization": [{{"actor": "alice", "permission": "active"}}],
                    "data": {{"from": "alice"}}
                }},
                "zaction_descs": [{{
                    "za_type": 4,
                    "to": "{}",
                    "d1": "30",
                    "d2": "4,EOS",
                    "sc": "eosio.token",
                    "memo": "This is a test!"
                }}]
            }}]"#,
            address_hex()
        );
        let request: TransactionRequest = serde_json::from_str(&json).unwrap();
        let desc = request.descriptors().next().unwrap();
        let parsed = Descriptor::parse(desc).unwrap();

        assert_eq!(parsed.za_type, ZActionType::TransferFt);
        assert_eq!(parsed.value, 30);
        assert_eq!(parsed.asset.symbol, 1_397_703_940);
        assert_eq!(parsed.asset.contract.to_string(), "eosio.token");
        assert_eq!(parsed.memo.text(), "This is a test!");
    }

    #[test]
    fn numeric_fields_accept_numbers() {
        let desc = ZActionDesc {
            za_type: 6,
            to: "alice".to_owned(),
            d1: Word::from(5),
            d2: Word::from(1_397_703_940),
            sc: Word::from(6_138_663_591_592_764_928),
            memo: String::new(),
            change_to: None,
        };
        let parsed = Descriptor::parse(&desc).unwrap();
        assert_eq!(parsed.recipient, Recipient::Ledger("alice".parse().unwrap()));
        assert_eq!(parsed.asset.contract.to_string(), "eosio.token");
    }

    #[test]
    fn token_codes_resolve_through_settings() {
        let settings = Settings::from_toml("[tokens.EOS]\nsymbol = \"4,EOS\"\ncontract = \"eosio.token\"").unwrap();
        let desc = ZActionDesc {
            za_type: 4,
            to: address_hex(),
            d1: Word::from(30),
            d2: Word::from("EOS"),
            sc: Word::from(""),
            memo: String::new(),
            change_to: None,
        };

        let parsed = Descriptor::parse_with(&desc, &settings).unwrap();
        assert_eq!(parsed.asset, settings.token("EOS").unwrap().unwrap());
        assert_eq!(parsed.asset.symbol, 1_397_703_940);

        let wrapped = ZActionDesc {
            sc: Word::from("wrap.token"),
            ..desc.clone()
        };
        let parsed = Descriptor::parse_with(&wrapped, &settings).unwrap();
        assert_eq!(parsed.asset.contract.to_string(), "wrap.token");

        assert!(matches!(
            Descriptor::parse(&desc),
            Err(DescriptorError::Number { field: "d2", .. })
        ));
    }

    #[test]
    fn burn_to_the_empty_account() {
        let desc = ZActionDesc {
            za_type: 6,
            to: String::new(),
            d1: Word::from(5),
            d2: Word::from("4,EOS"),
            sc: Word::from("eosio.token"),
            memo: String::new(),
            change_to: None,
        };
        let parsed = Descriptor::parse(&desc).unwrap();
        assert_eq!(parsed.recipient, Recipient::Ledger(Name::ZERO));
    }

    #[test]
    fn auth_descriptors() {
        let mint = ZActionDesc {
            za_type: 3,
            to: address_hex(),
            d1: Word::from(0),
            d2: Word::from(0),
            sc: Word::from("thezeosalias"),
            memo: String::new(),
            change_to: None,
        };
        let parsed = Descriptor::parse(&mint).unwrap();
        assert_eq!(parsed.za_type, ZActionType::MintAuth);
        assert_eq!(parsed.za_type.kind(), NoteKind::Auth);
        assert_eq!(parsed.value, 0, "auth tokens may carry a zero d1");

        let cm = Commitment::from(Fp::from(42u64));
        let burn = ZActionDesc {
            za_type: 9,
            to: cm.to_string(),
            ..mint.clone()
        };
        let parsed = Descriptor::parse(&burn).unwrap();
        assert_eq!(parsed.recipient, Recipient::AuthToken(cm));

        for to in ["alice", "00", "ff".repeat(32).as_str()] {
            let bad = ZActionDesc {
                za_type: 9,
                to: to.to_owned(),
                ..mint.clone()
            };
            assert!(
                matches!(Descriptor::parse(&bad), Err(DescriptorError::Commitment(_))),
                "{to}"
            );
        }
    }

    #[test]
    fn rejects_bad_descriptors() {
        let base = ZActionDesc {
            za_type: 4,
            to: address_hex(),
            d1: Word::from(1),
            d2: Word::from(0),
            sc: Word::from(0),
            memo: String::new(),
            change_to: None,
        };

        let unsupported = ZActionDesc { za_type: 7, ..base.clone() };
        assert!(matches!(
            Descriptor::parse(&unsupported),
            Err(DescriptorError::UnsupportedType(UnsupportedType(7)))
        ));
        let null = ZActionDesc { za_type: 0, ..base.clone() };
        assert!(matches!(
            Descriptor::parse(&null),
            Err(DescriptorError::UnsupportedType(_))
        ));
        let bad_address = ZActionDesc {
            to: "zz".to_owned(),
            ..base.clone()
        };
        assert!(matches!(
            Descriptor::parse(&bad_address),
            Err(DescriptorError::Address { .. })
        ));
        let zero = ZActionDesc {
            d1: Word::from(0),
            ..base.clone()
        };
        assert_eq!(Descriptor::parse(&zero), Err(DescriptorError::ZeroAmount));
        let long_memo = ZActionDesc {
            memo: "x".repeat(513),
            ..base
        };
        assert!(matches!(
            Descriptor::parse(&long_memo),
            Err(DescriptorError::Memo(_))
        ));
    }
}
