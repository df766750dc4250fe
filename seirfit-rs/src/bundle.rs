use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::beta::BetaParams;
use crate::data::{CaseSeries, VectorOrMatrix, matrix_rows};
use crate::error::{DimensionError, FitError, Result, SegmentError};
use crate::options::{FitOptions, ObsModel, OdeControl, SampFracType};
use crate::priors::LogNormalPrior;
use crate::schema::{FixedParams, InitialState};
use crate::time_grid::TimeGrid;

/// Names of the constants in `x_r`, in order.
pub const X_R_NAMES: [&str; 10] = [
    "N",
    "D",
    "k1",
    "k2",
    "q",
    "ud",
    "ur",
    "f0",
    "imported_cases",
    "imported_window",
];

/// Everything the caller hands to one fit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FitInputs {
    pub daily_cases: CaseSeries,
    #[serde(deserialize_with = "deserialize_fractions")]
    pub samp_frac_fixed: DMatrix<f64>,
    /// Sampling-fraction segment per day, starting at 1. Defaults to a
    /// single segment.
    #[serde(default)]
    pub samp_frac_seg: Option<Vec<u32>>,
    /// Distancing segment per day, opening with segment 0.
    #[serde(default)]
    pub f_seg: Option<Vec<u32>>,
    #[serde(flatten)]
    pub options: FitOptions,
}

fn deserialize_fractions<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<DMatrix<f64>, D::Error> {
    VectorOrMatrix::<f64>::deserialize(deserializer)?
        .into_matrix()
        .map_err(serde::de::Error::custom)
}

impl FitInputs {
    pub fn new(daily_cases: CaseSeries, samp_frac_fixed: DMatrix<f64>) -> Self {
        Self {
            daily_cases,
            samp_frac_fixed,
            samp_frac_seg: None,
            f_seg: None,
            options: FitOptions::default(),
        }
    }

    /// Single-stream inputs with a constant sampling fraction over the
    /// observed and forecast days.
    pub fn single_stream(daily_cases: CaseSeries, samp_frac: f64, forecast_days: usize) -> Self {
        let n_days = daily_cases.n_days() + forecast_days;
        let mut inputs = Self::new(daily_cases, DMatrix::from_element(n_days, 1, samp_frac));
        inputs.options.forecast_days = forecast_days;
        inputs
    }
}

/// Data block handed to the inference engine. Index arrays are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigBundle {
    #[serde(rename = "T")]
    pub n_time: usize,
    pub days: Vec<usize>,
    pub daily_cases: Vec<Vec<i64>>,
    #[serde(rename = "N")]
    pub n_days: usize,
    #[serde(rename = "S")]
    pub n_states: usize,
    #[serde(rename = "J")]
    pub n_streams: usize,
    pub y0_vars: [f64; 10],
    pub t0: f64,
    pub time: TimeGrid,
    pub x_r: [f64; 10],
    pub delay_shape: Vec<f64>,
    pub delay_scale: Vec<f64>,
    pub samp_frac_fixed: Vec<Vec<f64>>,
    pub samp_frac_type: i32,
    pub samp_frac_seg: Vec<u32>,
    pub time_day_id: Vec<usize>,
    pub time_day_id0: Vec<usize>,
    #[serde(rename = "R0_prior")]
    pub r0_prior: LogNormalPrior,
    pub phi_prior: f64,
    pub f_prior: BetaParams,
    pub e_prior: BetaParams,
    pub samp_frac_prior: BetaParams,
    pub start_decline_prior: LogNormalPrior,
    pub end_decline_prior: LogNormalPrior,
    pub i0_prior: LogNormalPrior,
    pub n_f_s: usize,
    pub f_seg: Vec<u32>,
    pub last_day_obs: usize,
    pub obs_model: i32,
    pub ode_control: OdeControl,
    pub est_phi: usize,
    pub n_samp_frac: usize,
    pub rw_sigma: f64,
    pub priors_only: i32,
    #[serde(rename = "contains_NAs")]
    pub contains_nas: i32,
    pub f_ramp_rate: f64,
}

impl ConfigBundle {
    /// `x_r` value by name.
    pub fn constant(&self, name: &str) -> Option<f64> {
        X_R_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.x_r[i])
    }

    /// Distancing segment of each day, tagged `f_seg_id_<day>`.
    pub fn tagged_f_seg(&self) -> Vec<(String, u32)> {
        self.days
            .iter()
            .zip(&self.f_seg)
            .map(|(day, &seg)| (format!("f_seg_id_{day}"), seg))
            .collect()
    }
}

/// Validated, typed pieces of the inputs that the sampler and the result
/// need alongside the bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub bundle: ConfigBundle,
    pub pars: FixedParams,
    pub state_0: InitialState,
    pub grid: TimeGrid,
}

/// Validate `inputs` and build the engine's data block.
pub fn assemble(inputs: &FitInputs) -> Result<Assembled> {
    let options = &inputs.options;

    // Stale layouts are reported before anything else is looked at.
    let pars = FixedParams::from_named(&options.pars)?;
    let state_0 = InitialState::from_named(&options.state_0)?;

    check_scalars(options)?;
    options.priors.validate()?;

    let cases = &inputs.daily_cases;
    let last_day_obs = cases.n_days();
    let n_streams = cases.n_streams();
    let n_days = last_day_obs + options.forecast_days;

    let delay_shape = options.delay_shape.as_vec();
    let delay_scale = options.delay_scale.as_vec();
    check_length("delay_shape", &delay_shape, n_streams)?;
    check_length("delay_scale", &delay_scale, n_streams)?;

    let samp_frac_fixed = &inputs.samp_frac_fixed;
    if samp_frac_fixed.nrows() != n_days {
        return Err(DimensionError::Rows {
            name: "samp_frac_fixed",
            expected: n_days,
            actual: samp_frac_fixed.nrows(),
        }
        .into());
    }
    if samp_frac_fixed.ncols() != n_streams {
        return Err(DimensionError::Columns {
            name: "samp_frac_fixed",
            expected: n_streams,
            actual: samp_frac_fixed.ncols(),
        }
        .into());
    }
    check_fixed_fractions(samp_frac_fixed, options.samp_frac_type)?;

    let days: Vec<usize> = (1..=n_days).collect();
    let grid = TimeGrid::run_up_to(n_days as f64, options.time_increment);

    let f_seg = match &inputs.f_seg {
        Some(seg) => seg.clone(),
        None => default_f_seg(n_days),
    };
    check_length("f_seg", &f_seg, n_days)?;
    if let Some(&first) = f_seg.first()
        && first != 0
    {
        return Err(SegmentError::Origin {
            name: "f_seg",
            expected: 0,
            found: first,
        }
        .into());
    }

    let days_back = f64::from(options.days_back);
    let time_day_id = days
        .iter()
        .map(|&day| grid.closing_index(day as f64) + 1)
        .collect();
    let time_day_id0 = days
        .iter()
        .map(|&day| grid.window_start_index(day as f64, days_back) + 1)
        .collect();

    let daily_cases = cases.to_engine_rows()?;
    let contains_nas = cases.has_missing();
    if contains_nas {
        log::info!(
            "{} missing case values marked for the engine",
            cases.missing_count()
        );
    }

    let samp_frac_seg = match &inputs.samp_frac_seg {
        Some(seg) => seg.clone(),
        None => vec![1; n_days],
    };
    check_length("samp_frac_seg", &samp_frac_seg, n_days)?;
    if let Some((day, &found)) = samp_frac_seg.iter().enumerate().find(|&(_, &s)| s < 1) {
        return Err(SegmentError::BelowMinimum {
            name: "samp_frac_seg",
            day,
            found,
            minimum: 1,
        }
        .into());
    }
    let n_samp_frac = options
        .samp_frac_type
        .n_params(last_day_obs, &samp_frac_seg);

    let mut x_r = [0.0; 10];
    x_r[0] = options.n_pop;
    x_r[1..8].copy_from_slice(&pars.values());
    // imported cases and their window only matter to projections
    x_r[8] = 0.0;
    x_r[9] = 0.0;

    let priors = &options.priors;
    let f_prior = priors.f.to_beta("f")?;
    let e_prior = priors.e.to_beta("e")?;
    let samp_frac_prior = match options.samp_frac_type {
        SampFracType::Fixed => BetaParams::flat(),
        _ => priors.samp_frac.to_beta("samp_frac")?,
    };

    let bundle = ConfigBundle {
        n_time: grid.len(),
        days,
        daily_cases,
        n_days,
        n_states: state_0.values().len(),
        n_streams,
        y0_vars: state_0.values(),
        t0: TimeGrid::RUN_UP_START - 1e-6,
        time: grid.clone(),
        x_r,
        delay_shape,
        delay_scale,
        samp_frac_fixed: matrix_rows(samp_frac_fixed),
        samp_frac_type: options.samp_frac_type.engine_code(),
        samp_frac_seg,
        time_day_id,
        time_day_id0,
        r0_prior: priors.r0,
        phi_prior: priors.phi,
        f_prior,
        e_prior,
        samp_frac_prior,
        start_decline_prior: priors.start_decline,
        end_decline_prior: priors.end_decline,
        i0_prior: priors.i0,
        n_f_s: f_seg.iter().copied().max().unwrap_or(0) as usize,
        f_seg,
        last_day_obs,
        obs_model: options.obs_model.engine_code(),
        ode_control: options.ode_control,
        // dispersion only exists under the negative binomial
        est_phi: match options.obs_model {
            ObsModel::NegBinomial2 => n_streams,
            ObsModel::Poisson => 0,
        },
        n_samp_frac,
        rw_sigma: options.rw_sigma,
        priors_only: 0,
        contains_nas: i32::from(contains_nas),
        f_ramp_rate: options.f_ramp_rate,
    };

    log::debug!(
        "assembled bundle: {} days ({} observed), {} streams, {} time steps, samp_frac {} with {} parameters",
        bundle.n_days,
        bundle.last_day_obs,
        bundle.n_streams,
        bundle.n_time,
        options.samp_frac_type,
        bundle.n_samp_frac,
    );

    Ok(Assembled {
        bundle,
        pars,
        state_0,
        grid,
    })
}

fn default_f_seg(n_days: usize) -> Vec<u32> {
    let mut seg = vec![1; n_days];
    if let Some(first) = seg.first_mut() {
        *first = 0;
    }
    seg
}

fn check_length<T>(name: &'static str, values: &[T], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(DimensionError::Length {
            name,
            expected,
            actual: values.len(),
        }
        .into());
    }
    Ok(())
}

fn check_scalars(options: &FitOptions) -> Result<()> {
    let checks: [(&'static str, bool, &'static str); 6] = [
        (
            "time_increment",
            options.time_increment > 0.0 && options.time_increment.is_finite(),
            "must be a positive number of days",
        ),
        ("days_back", options.days_back > 0, "must be positive"),
        (
            "N_pop",
            options.n_pop > 0.0 && options.n_pop.is_finite(),
            "must be positive",
        ),
        ("chains", options.chains > 0, "must be positive"),
        ("iter", options.iter > 0, "must be positive"),
        (
            "rw_sigma",
            options.rw_sigma > 0.0 && options.rw_sigma.is_finite(),
            "must be positive",
        ),
    ];
    match checks.into_iter().find(|&(_, ok, _)| !ok) {
        Some((name, _, reason)) => Err(FitError::InvalidOption { name, reason }),
        None => Ok(()),
    }
}

/// Streams other than the first always use fixed fractions; the first does
/// too unless its fraction is estimated.
fn check_fixed_fractions(fractions: &DMatrix<f64>, samp_frac_type: SampFracType) -> Result<()> {
    let first_fixed_stream = match samp_frac_type {
        SampFracType::Fixed => 0,
        _ => 1,
    };
    for stream in first_fixed_stream..fractions.ncols() {
        for (day, &value) in fractions.column(stream).iter().enumerate() {
            if !(0.0..=1.0).contains(&value) {
                return Err(FitError::SampleFraction { stream, day, value });
            }
        }
    }
    Ok(())
}
