use serde::Serialize;

use crate::error::BetaError;

/// Shape parameters of a Beta distribution.
///
/// Serialised as the `[alpha, beta]` pair the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "[f64; 2]")]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaParams {
    /// Moment-matched Beta for a quantity in (0, 1) with the given mean and
    /// standard deviation.
    ///
    /// Fails unless `0 < mean < 1` and `sd` is small enough for both shape
    /// parameters to be positive.
    pub fn from_mean_sd(mean: f64, sd: f64) -> Result<Self, BetaError> {
        if !(mean > 0.0 && mean < 1.0) {
            return Err(BetaError::MeanOutOfRange { mean });
        }
        if !(sd > 0.0 && sd.is_finite()) {
            return Err(BetaError::NonPositiveSd { sd });
        }
        let variance = sd * sd;
        let alpha = ((1.0 - mean) / variance - 1.0 / mean) * mean * mean;
        let beta = alpha * (1.0 / mean - 1.0);
        if !(alpha > 0.0 && beta > 0.0 && alpha.is_finite() && beta.is_finite()) {
            return Err(BetaError::Improper {
                mean,
                sd,
                alpha,
                beta,
            });
        }
        Ok(Self { alpha, beta })
    }

    /// Flat Beta(1, 1), handed to the engine when the prior is never read.
    pub const fn flat() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let total = self.alpha + self.beta;
        self.alpha * self.beta / (total * total * (total + 1.0))
    }
}

impl From<BetaParams> for [f64; 2] {
    fn from(params: BetaParams) -> Self {
        [params.alpha, params.beta]
    }
}
