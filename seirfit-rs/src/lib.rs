//! Prepares case counts and priors for a Bayesian SEIR model, hands them to an
//! external inference engine and packages the posterior draws.
//!
//! The engine itself (ODE solver and sampler) lives behind
//! [`engine::InferenceEngine`]; this crate validates inputs, builds the
//! engine's data block and keeps everything needed to reuse a fit.
//!
//! ```no_run
//! use seirfit::{CaseSeries, CommandEngine, FitInputs, fit_seir};
//!
//! let cases = CaseSeries::from_counts(&[1.0, 3.0, 2.0, 6.0, 9.0]).unwrap();
//! let inputs = FitInputs::single_stream(cases, 0.2, 0);
//! let engine = CommandEngine::new("/opt/seir-engine/run", "/tmp/seirfit");
//! let fit = fit_seir(&inputs, &engine).unwrap();
//! println!("posterior mean R0: {:?}", fit.posterior_mean("R0"));
//! ```

pub mod beta;
pub mod bundle;
pub mod data;
pub mod draws;
pub mod engine;
pub mod error;
pub mod inits;
pub mod options;
pub mod priors;
pub mod protocol;
pub mod result;
pub mod schema;
pub mod time_grid;

pub use beta::BetaParams;
pub use bundle::{Assembled, ConfigBundle, FitInputs, assemble};
pub use data::{CaseSeries, MISSING_SENTINEL};
pub use draws::RawDraws;
pub use engine::{CommandEngine, EngineError, EngineRequest, HttpEngine, InferenceEngine};
pub use error::{FitError, Result};
pub use inits::{InitialValues, sample_initial_values};
pub use options::{FitOptions, FitType, ObsModel, SampFracType};
pub use priors::{LogNormalPrior, Priors, UnitPrior};
pub use protocol::Environment;
pub use result::FitResult;
pub use schema::{FixedParams, InitialState, NamedValues};
pub use time_grid::TimeGrid;

/// Fit the model to `inputs` with `engine`.
///
/// All validation happens before the engine is called. Any failure, the
/// engine's included, aborts the whole fit.
pub fn fit_seir(inputs: &FitInputs, engine: &dyn InferenceEngine) -> Result<FitResult> {
    let assembled = assemble(inputs)?;
    let options = &inputs.options;

    let init = sample_initial_values(
        &options.priors,
        assembled.bundle.n_f_s,
        assembled.pars.ud,
        options.chains,
        options.seed,
    )?;

    let request = EngineRequest {
        data: &assembled.bundle,
        init: &init,
        iter: options.iter,
        chains: options.chains,
        seed: options.seed,
        pars: engine::retained_quantities(options.save_state_predictions),
        fit_type: options.fit_type,
        engine_args: &options.engine_args,
    };
    log::info!(
        "fitting {} days of {} stream(s): {} chains x {} iterations, seed {}",
        assembled.bundle.last_day_obs,
        assembled.bundle.n_streams,
        options.chains,
        options.iter,
        options.seed,
    );
    let draws = engine.sample(&request)?;
    log::info!("engine returned {} draws", draws.n_draws());

    Ok(FitResult::package(inputs, assembled, init, draws)
        .with_engine(engine.identifier(), options.seed))
}
