use rand::{SeedableRng, distr::Distribution, rngs::StdRng};
use rand_distr::{Beta, LogNormal};
use serde::Serialize;

use crate::error::PriorError;
use crate::priors::{LogNormalPrior, Priors};

/// Starting point of one chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialValues {
    #[serde(rename = "R0")]
    pub r0: f64,
    pub f_s: Vec<f64>,
    pub i0: f64,
    pub ur: f64,
    pub start_decline: f64,
    pub end_decline: f64,
}

/// Detection rate of the distancing group implied by the expected fraction
/// `e` that distances and the detection rate `ud` of the rest.
pub fn implied_ur(e: f64, ud: f64) -> f64 {
    (ud - e * ud) / e
}

/// Draw one starting point per chain from the priors, narrowed so chains
/// start near the prior centre.
///
/// Log-normal spreads are halved and the intervention-strength spread is
/// quartered. Chains are drawn in order from a single generator seeded with
/// `seed`, so the same seed always yields the same starting points.
pub fn sample_initial_values(
    priors: &Priors,
    n_f_s: usize,
    ud: f64,
    chains: u32,
    seed: u64,
) -> Result<Vec<InitialValues>, PriorError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let r0 = narrowed_log_normal("R0", priors.r0)?;
    let i0 = narrowed_log_normal("i0", priors.i0)?;
    let start_decline = narrowed_log_normal("start_decline", priors.start_decline)?;
    let end_decline = narrowed_log_normal("end_decline", priors.end_decline)?;
    let f_shape = priors.f.narrowed(4.0).to_beta("f")?;
    let f_s = Beta::new(f_shape.alpha, f_shape.beta).map_err(|e| PriorError::Sampling {
        name: "f",
        reason: e.to_string(),
    })?;
    let ur = implied_ur(priors.e.mean, ud);

    let inits = (0..chains)
        .map(|_| InitialValues {
            r0: r0.sample(&mut rng),
            f_s: (0..n_f_s).map(|_| f_s.sample(&mut rng)).collect(),
            i0: i0.sample(&mut rng),
            ur,
            start_decline: start_decline.sample(&mut rng),
            end_decline: end_decline.sample(&mut rng),
        })
        .collect();
    Ok(inits)
}

fn narrowed_log_normal(
    name: &'static str,
    prior: LogNormalPrior,
) -> Result<LogNormal<f64>, PriorError> {
    LogNormal::new(prior.log_mean, prior.log_sd / 2.0).map_err(|e| PriorError::Sampling {
        name,
        reason: e.to_string(),
    })
}
