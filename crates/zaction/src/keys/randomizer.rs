//! Per-action spend authorization randomizer.

use ff::Field as _;
use pasta_curves::Fq;
use rand::{CryptoRng, RngCore};

/// Per-action authorization randomizer $\alpha$.
///
/// Spends sign with $\mathsf{rsk} = \mathsf{ask} + \alpha$; actions without
/// a spend sign with $\mathsf{rsk} = \alpha$. Either way the circuit checks
/// the published `rk` against $\alpha$, so a fresh one is sampled for every
/// action.
#[derive(Clone, Copy, Debug)]
pub struct SpendAuthRandomizer(Fq);

impl SpendAuthRandomizer {
    /// Sample a fresh nonzero randomizer.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        loop {
            let alpha = Fq::random(&mut *rng);
            if !bool::from(alpha.is_zero()) {
                return Self(alpha);
            }
        }
    }

    pub(crate) const fn inner(&self) -> &Fq {
        &self.0
    }
}
