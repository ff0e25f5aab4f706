//! Signature types that bridge private (sign) and public (verify) keys.

use reddsa::orchard::{Binding, SpendAuth};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A spend authorization signature (RedPallas over SpendAuth).
#[derive(Clone, Copy, Debug)]
pub struct SpendAuthSignature(pub reddsa::Signature<SpendAuth>);

impl From<[u8; 64]> for SpendAuthSignature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(reddsa::Signature::<SpendAuth>::from(bytes))
    }
}

impl From<SpendAuthSignature> for [u8; 64] {
    fn from(sig: SpendAuthSignature) -> [u8; 64] {
        <[u8; 64]>::from(sig.0)
    }
}

impl Serialize for SpendAuthSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::encoding::serialize(&<[u8; 64]>::from(*self), serializer)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for SpendAuthSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: [u8; 64] = crate::encoding::deserialize(deserializer)?;
        Ok(Self::from(bytes))
    }
}

/// A binding signature (RedPallas over the Binding group).
///
/// Proves the signer knew the opening $\mathsf{bsk}$ of the commitment
/// $\mathsf{bvk}$ to value 0 under every asset generator, so each asset's
/// declared balance is the true net of the bundle's actions.
#[derive(Clone, Copy, Debug)]
pub struct BindingSignature(pub reddsa::Signature<Binding>);

impl From<[u8; 64]> for BindingSignature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes.into())
    }
}

impl From<BindingSignature> for [u8; 64] {
    fn from(sig: BindingSignature) -> Self {
        sig.0.into()
    }
}

impl Serialize for BindingSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::encoding::serialize(&<[u8; 64]>::from(*self), serializer)
    }
}

#[expect(clippy::missing_trait_methods, reason = "serde default is sufficient")]
impl<'de> Deserialize<'de> for BindingSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: [u8; 64] = crate::encoding::deserialize(deserializer)?;
        Ok(Self::from(bytes))
    }
}
