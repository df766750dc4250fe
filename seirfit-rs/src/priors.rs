use serde::{Deserialize, Serialize};

use crate::beta::BetaParams;
use crate::error::PriorError;

/// `(log-mean, log-sd)` of a log-normal prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LogNormalPrior {
    pub log_mean: f64,
    pub log_sd: f64,
}

impl LogNormalPrior {
    pub const fn new(log_mean: f64, log_sd: f64) -> Self {
        Self { log_mean, log_sd }
    }

    pub fn with_median(median: f64, log_sd: f64) -> Self {
        Self::new(median.ln(), log_sd)
    }

    fn validate(&self, name: &'static str) -> Result<(), PriorError> {
        if !self.log_mean.is_finite() {
            return Err(PriorError::NonFiniteLocation {
                name,
                location: self.log_mean,
            });
        }
        if !(self.log_sd > 0.0 && self.log_sd.is_finite()) {
            return Err(PriorError::NonPositiveSpread {
                name,
                sd: self.log_sd,
            });
        }
        Ok(())
    }
}

impl From<[f64; 2]> for LogNormalPrior {
    fn from([log_mean, log_sd]: [f64; 2]) -> Self {
        Self { log_mean, log_sd }
    }
}

impl From<LogNormalPrior> for [f64; 2] {
    fn from(prior: LogNormalPrior) -> Self {
        [prior.log_mean, prior.log_sd]
    }
}

/// `(mean, sd)` of a quantity in (0, 1), fitted with a Beta prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct UnitPrior {
    pub mean: f64,
    pub sd: f64,
}

impl UnitPrior {
    pub const fn new(mean: f64, sd: f64) -> Self {
        Self { mean, sd }
    }

    pub fn to_beta(&self, name: &'static str) -> Result<BetaParams, PriorError> {
        BetaParams::from_mean_sd(self.mean, self.sd)
            .map_err(|source| PriorError::Beta { name, source })
    }

    /// Same mean, spread divided by `factor`.
    pub fn narrowed(&self, factor: f64) -> Self {
        Self::new(self.mean, self.sd / factor)
    }
}

impl From<[f64; 2]> for UnitPrior {
    fn from([mean, sd]: [f64; 2]) -> Self {
        Self { mean, sd }
    }
}

impl From<UnitPrior> for [f64; 2] {
    fn from(prior: UnitPrior) -> Self {
        [prior.mean, prior.sd]
    }
}

/// Every prior of one fit. All distancing segments share `f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    #[serde(rename = "R0_prior")]
    pub r0: LogNormalPrior,
    #[serde(rename = "i0_prior")]
    pub i0: LogNormalPrior,
    #[serde(rename = "start_decline_prior")]
    pub start_decline: LogNormalPrior,
    #[serde(rename = "end_decline_prior")]
    pub end_decline: LogNormalPrior,
    /// Intervention strength.
    #[serde(rename = "f_prior")]
    pub f: UnitPrior,
    /// Fraction of the population practising distancing.
    #[serde(rename = "e_prior")]
    pub e: UnitPrior,
    #[serde(rename = "samp_frac_prior")]
    pub samp_frac: UnitPrior,
    /// Scale of the negative-binomial dispersion prior.
    #[serde(rename = "phi_prior")]
    pub phi: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            r0: LogNormalPrior::with_median(2.6, 0.2),
            i0: LogNormalPrior::with_median(8.0, 1.0),
            start_decline: LogNormalPrior::with_median(15.0, 0.05),
            end_decline: LogNormalPrior::with_median(22.0, 0.05),
            f: UnitPrior::new(0.4, 0.2),
            e: UnitPrior::new(0.8, 0.05),
            samp_frac: UnitPrior::new(0.4, 0.2),
            phi: 1.0,
        }
    }
}

impl Priors {
    /// Beta-destined priors are checked when they are converted.
    pub fn validate(&self) -> Result<(), PriorError> {
        self.r0.validate("R0")?;
        self.i0.validate("i0")?;
        self.start_decline.validate("start_decline")?;
        self.end_decline.validate("end_decline")?;
        if !(self.phi > 0.0 && self.phi.is_finite()) {
            return Err(PriorError::NonPositiveSpread {
                name: "phi",
                sd: self.phi,
            });
        }
        Ok(())
    }
}
