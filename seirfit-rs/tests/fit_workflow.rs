use std::cell::RefCell;

use nalgebra::DMatrix;
use seirfit::error::DimensionError;
use seirfit::options::PerStream;
use seirfit::{
    CaseSeries, EngineError, EngineRequest, Environment, FitError, FitInputs, InferenceEngine,
    MISSING_SENTINEL, NamedValues, RawDraws, SampFracType, assemble, fit_seir,
};
use serde_json::{Value, json};

/// Engine that records each request document and returns fixed draws.
#[derive(Default)]
struct RecordingEngine {
    requests: RefCell<Vec<Value>>,
}

impl InferenceEngine for RecordingEngine {
    fn sample(&self, request: &EngineRequest) -> Result<RawDraws, EngineError> {
        self.requests.borrow_mut().push(request.to_document(None)?);
        let n = request.chains as usize * 2;
        RawDraws::from_columns(vec![
            ("R0".to_string(), (0..n).map(|i| 2.0 + i as f64 * 0.1).collect()),
            ("phi.1".to_string(), vec![3.0; n]),
        ])
    }
}

struct FailingEngine;

impl InferenceEngine for FailingEngine {
    fn sample(&self, _request: &EngineRequest) -> Result<RawDraws, EngineError> {
        Err(EngineError::Failed {
            status: "exit status: 70".to_string(),
            stderr: "ODE solver did not converge".to_string(),
        })
    }
}

fn daily_cases(n: usize) -> Vec<f64> {
    (0..n).map(|i| ((i * 37) % 23 + i) as f64).collect()
}

fn two_stream_inputs(n: usize, delay_len: usize) -> FitInputs {
    let rows = daily_cases(n)
        .into_iter()
        .map(|c| vec![Some(c), Some((c / 10.0).floor())])
        .collect();
    let mut inputs = FitInputs::new(
        CaseSeries::from_rows(rows).unwrap(),
        DMatrix::from_fn(n, 2, |_, j| if j == 0 { 0.2 } else { 0.05 }),
    );
    inputs.options.delay_shape = PerStream::Each(vec![1.73; delay_len]);
    inputs.options.delay_scale = PerStream::Each(vec![9.85; delay_len]);
    inputs
}

#[test]
fn fixed_single_stream_bundle() {
    let cases = CaseSeries::from_counts(&daily_cases(42)).unwrap();
    let inputs = FitInputs::single_stream(cases, 0.2, 0);
    let bundle = assemble(&inputs).unwrap().bundle;
    assert_eq!(bundle.n_days, 42);
    assert_eq!(bundle.n_samp_frac, 0);
    assert_eq!(bundle.samp_frac_type, SampFracType::Fixed.engine_code());
}

#[test]
fn segmented_sampling_fraction() {
    let cases = CaseSeries::from_counts(&daily_cases(42)).unwrap();
    let mut inputs = FitInputs::single_stream(cases, 0.2, 0);
    inputs.options.samp_frac_type = SampFracType::Segmented;
    inputs.samp_frac_seg = Some((0..42).map(|d| if d < 21 { 1 } else { 2 }).collect());
    let bundle = assemble(&inputs).unwrap().bundle;
    assert_eq!(bundle.n_samp_frac, 2);
    assert_eq!(bundle.samp_frac_type, 4);
    assert_eq!(bundle.samp_frac_seg[41], 2);
    assert!(f64::abs(bundle.samp_frac_prior.mean() - 0.4) < 1e-10);
}

#[test]
fn random_walk_estimates_each_observed_day() {
    let cases = CaseSeries::from_counts(&daily_cases(30)).unwrap();
    let mut inputs = FitInputs::single_stream(cases, 0.2, 5);
    inputs.options.samp_frac_type = SampFracType::RandomWalk;
    let bundle = assemble(&inputs).unwrap().bundle;
    assert_eq!(bundle.n_samp_frac, 30);
    assert_eq!(bundle.n_days, 35);
}

#[test]
fn two_streams_need_per_stream_delays() {
    let bundle = assemble(&two_stream_inputs(42, 2)).unwrap().bundle;
    assert_eq!(bundle.n_streams, 2);
    assert_eq!(bundle.delay_shape.len(), 2);
    assert_eq!(bundle.samp_frac_fixed[0], vec![0.2, 0.05]);

    assert!(matches!(
        assemble(&two_stream_inputs(42, 1)),
        Err(FitError::Dimension(DimensionError::Length {
            name: "delay_shape",
            expected: 2,
            actual: 1
        }))
    ));
}

#[test]
fn sampling_fraction_rows_must_match() {
    let cases = CaseSeries::from_counts(&daily_cases(42)).unwrap();
    for rows in [41, 43] {
        let inputs = FitInputs::new(cases.clone(), DMatrix::from_element(rows, 1, 0.2));
        assert!(matches!(
            assemble(&inputs),
            Err(FitError::Dimension(DimensionError::Rows { .. }))
        ));
    }
    let inputs = FitInputs::new(cases, DMatrix::from_element(42, 2, 0.2));
    assert!(matches!(
        assemble(&inputs),
        Err(FitError::Dimension(DimensionError::Columns { .. }))
    ));
}

#[test]
fn reordered_pars_rejected() {
    let cases = CaseSeries::from_counts(&daily_cases(10)).unwrap();
    let mut inputs = FitInputs::single_stream(cases, 0.2, 0);
    inputs.options.pars = NamedValues::new()
        .with("D", 5.0)
        .with("k2", 1.0)
        .with("k1", 0.2)
        .with("q", 0.05)
        .with("ud", 0.1)
        .with("ur", 0.02)
        .with("f0", 1.0);
    let err = assemble(&inputs).unwrap_err();
    assert!(matches!(err, FitError::Schema(_)));
    assert!(err.to_string().contains("outdated"));
}

#[test]
fn sentinel_in_raw_data_rejected() {
    let mut counts: Vec<Option<f64>> = daily_cases(10).into_iter().map(Some).collect();
    counts[3] = None;
    counts[6] = Some(MISSING_SENTINEL as f64);
    let inputs = FitInputs::single_stream(CaseSeries::from_vector(&counts).unwrap(), 0.2, 0);
    let engine = RecordingEngine::default();
    assert!(matches!(
        fit_seir(&inputs, &engine),
        Err(FitError::SentinelCollision { day: 6, .. })
    ));
    assert!(engine.requests.borrow().is_empty());
}

#[test]
fn assembly_is_deterministic() {
    let inputs = two_stream_inputs(42, 2);
    let engine = RecordingEngine::default();
    let first = fit_seir(&inputs, &engine).unwrap();
    let second = fit_seir(&inputs, &engine).unwrap();
    assert_eq!(first.bundle, second.bundle);
    assert_eq!(first.init, second.init);
    assert_eq!(first.fingerprint, second.fingerprint);
    let requests = engine.requests.borrow();
    assert_eq!(
        serde_json::to_string(&requests[0]).unwrap(),
        serde_json::to_string(&requests[1]).unwrap()
    );
}

#[test]
fn fit_packages_draws_and_context() {
    let cases = CaseSeries::from_counts(&daily_cases(42)).unwrap();
    let mut inputs = FitInputs::single_stream(cases, 0.2, 7);
    inputs.options.chains = 3;
    inputs.options.save_state_predictions = true;
    inputs
        .options
        .engine_args
        .insert("adapt_delta".to_string(), json!(0.95));

    let engine = RecordingEngine::default();
    let fit = fit_seir(&inputs, &engine).unwrap();
    assert_eq!(fit.draws.n_draws(), 6);
    assert_eq!(fit.init.len(), 3);
    assert_eq!(fit.last_day_obs, 42);
    assert_eq!(fit.days.len(), 49);
    assert!(f64::abs(fit.posterior_mean("R0").unwrap() - 2.25) < 1e-12);
    assert!(fit.engine.ends_with("RecordingEngine"));
    assert_eq!(fit.seed, 42);

    let requests = engine.requests.borrow();
    let input = &requests[0]["input"];
    assert_eq!(input["chains"], json!(3));
    assert_eq!(input["seed"], json!(42));
    assert_eq!(input["engine_args"]["adapt_delta"], json!(0.95));
    assert!(input.get("adapt_delta").is_none());
    assert!(
        input["pars"]
            .as_array()
            .unwrap()
            .contains(&json!("y_hat"))
    );
    assert_eq!(input["data"]["x_r"].as_array().unwrap().len(), 10);
}

#[test]
fn engine_failure_passed_through() {
    let cases = CaseSeries::from_counts(&daily_cases(10)).unwrap();
    let inputs = FitInputs::single_stream(cases, 0.2, 0);
    let err = fit_seir(&inputs, &FailingEngine).unwrap_err();
    assert!(matches!(err, FitError::Engine(EngineError::Failed { .. })));
    assert!(err.to_string().contains("did not converge"));
}

#[test]
fn inputs_from_run_document() {
    let doc = json!({
        "input": {
            "seed": 11,
            "daily_cases": [[1, 0], [4, null], [6, 1]],
            "samp_frac_fixed": [[0.2, 0.1], [0.2, 0.1], [0.2, 0.1]],
            "samp_frac_type": "estimated",
            "delay_shape": [1.7, 2.0],
            "delay_scale": [9.0, 12.0],
            "obs_model": "Poisson",
            "f_prior": [0.5, 0.1],
            "pars": {"D": 5, "k1": 0.2, "k2": 1, "q": 0.05, "ud": 0.1, "ur": 0.02, "f0": 1}
        }
    });
    let env = Environment::from_json(doc)
        .with_input_type::<FitInputs>()
        .unwrap();
    assert_eq!(env.seed, Some(11));
    let inputs = env.input.unwrap();
    let bundle = assemble(&inputs).unwrap().bundle;
    assert_eq!(bundle.n_streams, 2);
    assert_eq!(bundle.contains_nas, 1);
    assert_eq!(bundle.daily_cases[1], vec![4, MISSING_SENTINEL]);
    assert_eq!(bundle.obs_model, 0);
    assert_eq!(bundle.est_phi, 0);
    assert_eq!(bundle.n_samp_frac, 1);
    assert!(f64::abs(bundle.f_prior.mean() - 0.5) < 1e-10);
}
