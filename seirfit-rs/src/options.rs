use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::priors::Priors;
use crate::protocol::ProtocolError;
use crate::schema::{FixedParams, InitialState, NamedValues};

/// Observation model for the daily counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObsModel {
    Poisson,
    #[default]
    #[serde(rename = "NB2")]
    NegBinomial2,
}

impl ObsModel {
    pub const fn engine_code(self) -> i32 {
        match self {
            Self::Poisson => 0,
            Self::NegBinomial2 => 1,
        }
    }
}

/// How the sampling fraction of the first data stream is treated.
///
/// Every other stream always uses its fixed fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampFracType {
    #[default]
    Fixed,
    Estimated,
    #[serde(rename = "rw")]
    RandomWalk,
    Segmented,
}

impl SampFracType {
    /// Code the engine reads as `samp_frac_type`.
    ///
    /// Only segmented mode gets its own code; the other modes are told apart
    /// by `n_samp_frac`. This mirrors the engine's current data block and
    /// must be revisited whenever that block changes.
    pub const fn engine_code(self) -> i32 {
        match self {
            Self::Segmented => 4,
            Self::Fixed | Self::Estimated | Self::RandomWalk => 1,
        }
    }

    /// Number of sampling-fraction parameters the engine estimates.
    pub fn n_params(self, last_day_obs: usize, samp_frac_seg: &[u32]) -> usize {
        match self {
            Self::Fixed => 0,
            Self::Estimated => 1,
            Self::Segmented => samp_frac_seg.iter().copied().max().unwrap_or(0) as usize,
            Self::RandomWalk => last_day_obs,
        }
    }
}

/// Inference algorithm the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitType {
    /// Full MCMC sampling.
    #[default]
    #[serde(rename = "NUTS")]
    Nuts,
    /// Variational approximation.
    #[serde(rename = "VB")]
    Vb,
    /// Posterior mode.
    #[serde(rename = "optimizing")]
    Optimizing,
}

macro_rules! impl_from_str_via_serde {
    ($($ty:ty),*) => {
        $(
            impl FromStr for $ty {
                type Err = UnknownSelector;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    serde_json::from_value(serde_json::Value::String(s.to_owned()))
                        .map_err(|_| UnknownSelector {
                            kind: stringify!($ty),
                            value: s.to_owned(),
                        })
                }
            }
        )*
    };
}

impl_from_str_via_serde!(ObsModel, SampFracType, FitType);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownSelector {
    pub kind: &'static str,
    pub value: String,
}

/// ODE solver control, passed through to the engine unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct OdeControl {
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_num_steps: f64,
}

impl Default for OdeControl {
    fn default() -> Self {
        Self {
            rel_tol: 1e-7,
            abs_tol: 1e-6,
            max_num_steps: 1e6,
        }
    }
}

impl From<[f64; 3]> for OdeControl {
    fn from([rel_tol, abs_tol, max_num_steps]: [f64; 3]) -> Self {
        Self {
            rel_tol,
            abs_tol,
            max_num_steps,
        }
    }
}

impl From<OdeControl> for [f64; 3] {
    fn from(c: OdeControl) -> Self {
        [c.rel_tol, c.abs_tol, c.max_num_steps]
    }
}

/// A per-stream parameter given either as one number or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerStream {
    One(f64),
    Each(Vec<f64>),
}

impl PerStream {
    pub fn as_vec(&self) -> Vec<f64> {
        match self {
            Self::One(v) => vec![*v],
            Self::Each(v) => v.clone(),
        }
    }
}

/// Scalar inputs, selectors and named parameter vectors of one fit.
///
/// Field names follow the keys of the run document; anything left out takes
/// its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub obs_model: ObsModel,
    pub forecast_days: usize,
    pub time_increment: f64,
    pub samp_frac_type: SampFracType,
    pub days_back: u32,
    #[serde(flatten)]
    pub priors: Priors,
    /// Shape of the ramp into distancing: 0 is linear, positive starts slow
    /// and finishes fast, negative the reverse.
    pub f_ramp_rate: f64,
    pub rw_sigma: f64,
    pub seed: u64,
    pub chains: u32,
    pub iter: u32,
    #[serde(rename = "N_pop")]
    pub n_pop: f64,
    pub pars: NamedValues,
    pub state_0: NamedValues,
    pub save_state_predictions: bool,
    pub delay_shape: PerStream,
    pub delay_scale: PerStream,
    pub ode_control: OdeControl,
    pub fit_type: FitType,
    /// Forwarded verbatim to the engine.
    pub engine_args: serde_json::Map<String, serde_json::Value>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            obs_model: ObsModel::default(),
            forecast_days: 0,
            time_increment: 0.25,
            samp_frac_type: SampFracType::default(),
            days_back: 45,
            priors: Priors::default(),
            f_ramp_rate: 0.0,
            rw_sigma: 0.1,
            seed: 42,
            chains: 4,
            iter: 2000,
            n_pop: 5.1e6,
            pars: FixedParams::default().to_named(),
            state_0: InitialState::default().to_named(),
            save_state_predictions: false,
            delay_shape: PerStream::One(1.73),
            delay_scale: PerStream::One(9.85),
            ode_control: OdeControl::default(),
            fit_type: FitType::default(),
            engine_args: serde_json::Map::new(),
        }
    }
}

impl FitOptions {
    pub fn from_toml_str(raw: &str) -> Result<Self, ProtocolError> {
        Ok(toml::from_str(raw)?)
    }
}

impl fmt::Display for SampFracType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fixed => "fixed",
            Self::Estimated => "estimated",
            Self::RandomWalk => "rw",
            Self::Segmented => "segmented",
        };
        f.write_str(name)
    }
}
