//! Wallet and builder settings.
//!
//! Loaded from TOML, then overridden by `ZACTION_*` environment variables.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! inline_proof_limit = 8192
//! bundle_sizes = [1, 2, 3, 4]
//! selection = "largest_first"
//! shielded_contract = "thezeostoken"
//!
//! [tokens.EOS]
//! symbol = "4,EOS"
//! contract = "eosio.token"
//! ```

use alloc::collections::BTreeMap;
use std::{env, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    name::{Name, NameError, Symbol},
    note_store::SelectionPolicy,
    value::AssetId,
};

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "ZACTION_";

/// Configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Settings`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override does not parse.
    #[error("invalid value {value:?} for {key}")]
    InvalidOverride {
        /// Variable name.
        key: String,
        /// Its value.
        value: String,
    },

    /// Values parse but are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A token entry names an invalid symbol or contract.
    #[error("invalid token: {0}")]
    Token(#[from] NameError),
}

/// A known fungible token, named in descriptors by its code alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// `"precision,CODE"`, e.g. `"4,EOS"`.
    pub symbol: String,
    /// Issuing contract.
    pub contract: Name,
}

impl TokenConfig {
    /// The asset id this entry names.
    pub fn asset(&self) -> Result<AssetId, ConfigError> {
        let (precision, code) = self
            .symbol
            .split_once(',')
            .ok_or_else(|| ConfigError::Invalid(format!("symbol {:?} is not precision,CODE", self.symbol)))?;
        let precision: u8 = precision
            .parse()
            .map_err(|_err| ConfigError::Invalid(format!("bad precision in {:?}", self.symbol)))?;
        Ok(AssetId::fungible(Symbol::new(code, precision)?, self.contract))
    }
}

/// Everything configurable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Proofs longer than this many bytes are uploaded and referenced by
    /// digest.
    #[serde(default = "default_inline_proof_limit")]
    pub inline_proof_limit: usize,

    /// Supported bundle arities, ascending. Bundles are padded up to the
    /// smallest size that fits.
    #[serde(default = "default_bundle_sizes")]
    pub bundle_sizes: Vec<usize>,

    /// Note selection order.
    #[serde(default)]
    pub selection: SelectionPolicy,

    /// Concurrent proofs; hardware parallelism when unset.
    #[serde(default)]
    pub prover_threads: Option<usize>,

    /// Contract receiving `begin`/`step` actions.
    #[serde(default = "default_shielded_contract")]
    pub shielded_contract: Name,

    /// Known fungible tokens by code.
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenConfig>,
}

fn default_inline_proof_limit() -> usize {
    8192
}

fn default_bundle_sizes() -> Vec<usize> {
    vec![1, 2, 3, 4]
}

fn default_shielded_contract() -> Name {
    // "thezeostoken"
    Name::from_value(14_651_886_699_981_051_184)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inline_proof_limit: default_inline_proof_limit(),
            bundle_sizes: default_bundle_sizes(),
            selection: SelectionPolicy::default(),
            prover_threads: None,
            shielded_contract: default_shielded_contract(),
            tokens: BTreeMap::new(),
        }
    }
}

fn parse_override<T: core::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_err| ConfigError::InvalidOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

impl Settings {
    /// Parse TOML text and validate it.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read `path`, then apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = path.as_ref();
        info!(path = %file.display(), "loading config");
        let text = fs::read_to_string(file).map_err(|source| ConfigError::Io {
            path: file.display().to_string(),
            source,
        })?;
        let mut settings = Self::from_toml(&text)?;
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Apply `ZACTION_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env::vars().filter(|(key, _value)| key.starts_with(ENV_PREFIX)))
    }

    /// Apply `(variable, value)` overrides.
    ///
    /// Recognized: `ZACTION_INLINE_PROOF_LIMIT`, `ZACTION_BUNDLE_SIZES`
    /// (comma separated), `ZACTION_SELECTION` (`largest_first` or
    /// `oldest_first`), `ZACTION_PROVER_THREADS`,
    /// `ZACTION_SHIELDED_CONTRACT`. Others are ignored.
    pub fn apply_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "INLINE_PROOF_LIMIT" => self.inline_proof_limit = parse_override(&key, &value)?,
                "BUNDLE_SIZES" => {
                    self.bundle_sizes = value
                        .split(',')
                        .map(|size| parse_override(&key, size.trim()))
                        .collect::<Result<_, _>>()?;
                }
                "SELECTION" => {
                    self.selection = match value.as_str() {
                        "largest_first" => SelectionPolicy::LargestFirst,
                        "oldest_first" => SelectionPolicy::OldestFirst,
                        _ => {
                            return Err(ConfigError::InvalidOverride { key, value });
                        }
                    };
                }
                "PROVER_THREADS" => self.prover_threads = Some(parse_override(&key, &value)?),
                "SHIELDED_CONTRACT" => self.shielded_contract = parse_override(&key, &value)?,
                _ => {}
            }
        }
        self.validate()
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bundle_sizes.is_empty() || self.bundle_sizes.contains(&0) {
            return Err(ConfigError::Invalid("bundle_sizes must be non-empty and positive".to_owned()));
        }
        if !self.bundle_sizes.is_sorted_by(|lhs, rhs| lhs < rhs) {
            return Err(ConfigError::Invalid("bundle_sizes must be strictly ascending".to_owned()));
        }
        if self.prover_threads == Some(0) {
            return Err(ConfigError::Invalid("prover_threads must be positive".to_owned()));
        }
        for token in self.tokens.values() {
            token.asset()?;
        }
        Ok(())
    }

    /// The asset of a known token code.
    pub fn token(&self, code: &str) -> Result<Option<AssetId>, ConfigError> {
        self.tokens.get(code).map(TokenConfig::asset).transpose()
    }

    /// Concurrent proofs to run.
    #[must_use]
    pub fn prover_threads(&self) -> usize {
        self.prover_threads.unwrap_or_else(crate::prover::default_threads)
    }

    /// Smallest configured arity holding `actions`, or `actions` itself
    /// when it exceeds every size.
    #[must_use]
    pub fn padded_len(&self, actions: usize) -> usize {
        self.bundle_sizes
            .iter()
            .copied()
            .find(|size| *size >= actions)
            .unwrap_or(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.inline_proof_limit, 8192);
        assert_eq!(settings.shielded_contract.to_string(), "thezeostoken");
        assert_eq!(settings.selection, SelectionPolicy::LargestFirst);
    }

    #[test]
    fn parses_full_file() {
        let settings = Settings::from_toml(
            r#"
            inline_proof_limit = 4096
            bundle_sizes = [2, 4]
            selection = "oldest_first"
            prover_threads = 3

            [tokens.EOS]
            symbol = "4,EOS"
            contract = "eosio.token"
            "#,
        )
        .unwrap();
        assert_eq!(settings.inline_proof_limit, 4096);
        assert_eq!(settings.selection, SelectionPolicy::OldestFirst);
        assert_eq!(settings.prover_threads(), 3);

        let eos = settings.token("EOS").unwrap().unwrap();
        assert_eq!(eos.symbol, 1_397_703_940);
        assert_eq!(settings.token("ZEOS").unwrap(), None);
    }

    #[test]
    fn padding_picks_smallest_fitting_size() {
        let settings = Settings::default();
        assert_eq!(settings.padded_len(1), 1);
        assert_eq!(settings.padded_len(3), 3);
        assert_eq!(settings.padded_len(5), 5);

        let sparse = Settings {
            bundle_sizes: vec![2, 4],
            ..Settings::default()
        };
        assert_eq!(sparse.padded_len(1), 2);
        assert_eq!(sparse.padded_len(3), 4);
    }

    #[test]
    fn overrides_apply_and_validate() {
        let mut settings = Settings::default();
        settings
            .apply_overrides([
                ("ZACTION_INLINE_PROOF_LIMIT".to_owned(), "100".to_owned()),
                ("ZACTION_BUNDLE_SIZES".to_owned(), "1, 4".to_owned()),
                ("ZACTION_SELECTION".to_owned(), "oldest_first".to_owned()),
                ("ZACTION_PROVER_THREADS".to_owned(), "6".to_owned()),
                ("PATH".to_owned(), "/bin".to_owned()),
            ])
            .unwrap();
        assert_eq!(settings.inline_proof_limit, 100);
        assert_eq!(settings.prover_threads(), 6);
        assert_eq!(settings.bundle_sizes, vec![1, 4]);
        assert_eq!(settings.selection, SelectionPolicy::OldestFirst);

        assert!(matches!(
            settings.apply_overrides([("ZACTION_PROVER_THREADS".to_owned(), "many".to_owned())]),
            Err(ConfigError::InvalidOverride { .. })
        ));
        assert!(matches!(
            settings.apply_overrides([("ZACTION_BUNDLE_SIZES".to_owned(), "4,2".to_owned())]),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_files() {
        assert!(matches!(
            Settings::from_toml("bundle_sizes = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml("inline_proof_limit = \"big\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_toml("[tokens.BAD]\nsymbol = \"4,eos\"\ncontract = \"eosio.token\""),
            Err(ConfigError::Token(_))
        ));
        assert!(matches!(
            Settings::load_from("/nonexistent/zaction.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
