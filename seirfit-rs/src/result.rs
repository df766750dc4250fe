use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::bundle::{Assembled, ConfigBundle, FitInputs};
use crate::data::{CaseSeries, matrix_rows};
use crate::draws::RawDraws;
use crate::inits::InitialValues;
use crate::options::{FitType, ObsModel, SampFracType};
use crate::priors::Priors;
use crate::protocol::{Environment, ProtocolError};
use crate::schema::{FixedParams, InitialState};
use crate::time_grid::TimeGrid;

/// A finished fit, with everything a later projection needs to extend it
/// consistently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub draws: RawDraws,
    pub bundle: ConfigBundle,
    /// Priors exactly as supplied, before Beta conversion.
    pub priors: Priors,
    pub obs_model: ObsModel,
    pub samp_frac_type: SampFracType,
    pub fit_type: FitType,
    pub daily_cases: CaseSeries,
    pub samp_frac_fixed: Vec<Vec<f64>>,
    pub days: Vec<usize>,
    pub time: TimeGrid,
    pub last_day_obs: usize,
    pub pars: FixedParams,
    #[serde(rename = "N_pop")]
    pub n_pop: f64,
    pub state_0: InitialState,
    pub f_seg: Vec<(String, u32)>,
    pub init: Vec<InitialValues>,
    /// Program or URL that produced the draws.
    pub engine: String,
    pub seed: u64,
    /// SHA-256 of the serialised data block.
    pub fingerprint: String,
}

impl FitResult {
    pub fn package(
        inputs: &FitInputs,
        assembled: Assembled,
        init: Vec<InitialValues>,
        draws: RawDraws,
    ) -> Self {
        let Assembled {
            bundle,
            pars,
            state_0,
            grid,
        } = assembled;
        let options = &inputs.options;
        Self {
            fingerprint: fingerprint(&bundle),
            f_seg: bundle.tagged_f_seg(),
            days: bundle.days.clone(),
            last_day_obs: bundle.last_day_obs,
            draws,
            priors: options.priors,
            obs_model: options.obs_model,
            samp_frac_type: options.samp_frac_type,
            fit_type: options.fit_type,
            engine: String::new(),
            seed: options.seed,
            daily_cases: inputs.daily_cases.clone(),
            samp_frac_fixed: matrix_rows(&inputs.samp_frac_fixed),
            time: grid,
            pars,
            n_pop: options.n_pop,
            state_0,
            init,
            bundle,
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>, seed: u64) -> Self {
        self.engine = engine.into();
        self.seed = seed;
        self
    }

    /// Posterior mean of one draw column.
    pub fn posterior_mean(&self, column: &str) -> Option<f64> {
        let values = self.draws.column(column)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Write `fit.json` and `draws.csv` through the run environment.
    pub fn write_to<I>(&self, env: &Environment<I>) -> Result<(), ProtocolError> {
        env.write("fit.json", &serde_json::to_vec_pretty(self)?)?;
        let mut draws = Vec::new();
        self.draws.write_csv(&mut draws)?;
        env.write("draws.csv", &draws)
    }
}

/// Hex SHA-256 of the bundle's JSON form. Identical bundles always share a
/// fingerprint.
pub fn fingerprint(bundle: &ConfigBundle) -> String {
    let mut hasher = Sha256::new();
    // non-finite floats serialise as null
    if let Ok(bytes) = serde_json::to_vec(bundle) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}
