//! Custody abstraction for spend authorization.
//!
//! A custody device holds the spend authorizing key (`ask`) and authorizes
//! spend actions **after seeing all effecting data**. The [`Custody`] trait
//! lets hardware wallets, software wallets and test doubles sit behind one
//! interface.
//!
//! ## Protocol (two-phase)
//!
//! 1. The wallet builds and proves the bundle (phase 1):
//!    - every action's `cv` and `rk` come from `ak`, never `ask`
//!    - actions without a spend are signed locally with `rsk = alpha`
//!
//! 2. The custody device authorizes spends (phase 2):
//!    - receives the unproven bundle and one [`SpendRequest`] per spend
//!    - computes the bundle sighash itself
//!    - signs it with $\mathsf{rsk} = \mathsf{ask} + \alpha$ per spend
//!    - returns one signature per request

use core::convert::Infallible;

use rand::{CryptoRng, RngCore};

use crate::{
    bundle::UnprovenBundle,
    keys::{SpendAuthRandomizer, SpendAuthSignature, private::SpendAuthorizingKey},
    note::Commitment,
};

/// Per-spend authorization material sent to custody.
#[derive(Clone, Copy, Debug)]
pub struct SpendRequest {
    /// Index of the spend in the bundle's actions.
    pub action_index: usize,
    /// The action's randomizer.
    pub alpha: SpendAuthRandomizer,
    /// Commitment of the note being spent, for display or policy checks.
    pub cm: Commitment,
}

impl SpendRequest {
    /// One request per spending action in `bundle`.
    #[must_use]
    pub fn for_bundle(bundle: &UnprovenBundle) -> Vec<Self> {
        bundle
            .actions
            .iter()
            .enumerate()
            .filter_map(|(action_index, action)| {
                action.witness.spend.as_ref().map(|spend| Self {
                    action_index,
                    alpha: action.witness.alpha,
                    cm: spend.note.commitment(),
                })
            })
            .collect()
    }
}

/// Custody device abstraction for spend authorization.
pub trait Custody {
    /// Error type for authorization failures.
    type Error;

    /// Authorize every spend in `bundle`.
    ///
    /// Returns one signature per request, in request order.
    fn authorize<R: RngCore + CryptoRng>(
        &self,
        bundle: &UnprovenBundle,
        spends: &[SpendRequest],
        rng: &mut R,
    ) -> Result<Vec<SpendAuthSignature>, Self::Error>;
}

/// Software custody: holds the spend authorizing key in memory.
#[derive(Clone, Copy, Debug)]
pub struct Local {
    ask: SpendAuthorizingKey,
}

impl Local {
    /// Custody over `ask`.
    #[must_use]
    pub const fn new(ask: SpendAuthorizingKey) -> Self {
        Self { ask }
    }
}

impl Custody for Local {
    type Error = Infallible;

    fn authorize<R: RngCore + CryptoRng>(
        &self,
        bundle: &UnprovenBundle,
        spends: &[SpendRequest],
        rng: &mut R,
    ) -> Result<Vec<SpendAuthSignature>, Self::Error> {
        let sighash = bundle.sighash();
        Ok(spends
            .iter()
            .map(|spend| self.ask.randomize(&spend.alpha).sign(&mut *rng, sighash.as_ref()))
            .collect())
    }
}
