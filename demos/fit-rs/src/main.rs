use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use seirfit::{
    CommandEngine, Environment, FitInputs, FitOptions, HttpEngine, InferenceEngine, fit_seir,
};

fn main() -> anyhow::Result<()> {
    let ctx = Environment::from_stdin()?.with_input_type::<FitInputs>()?;
    let Some(mut inputs) = ctx.input.clone() else {
        bail!("run document has no input");
    };

    // An options file replaces every option given inline
    if let Some(path) = ctx.file("options") {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading options file {}", path.display()))?;
        inputs.options = FitOptions::from_toml_str(&raw)?;
    }
    if let Some(seed) = ctx.seed {
        inputs.options.seed = seed;
    }

    let engine: Box<dyn InferenceEngine> = match (
        ctx.file("engine"),
        ctx.input_json().get("engine_url").and_then(|v| v.as_str()),
    ) {
        (Some(program), _) => {
            let work_dir = ctx
                .output_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("engine");
            Box::new(CommandEngine::new(program, work_dir))
        }
        (None, Some(url)) => Box::new(HttpEngine::new(url)),
        (None, None) => bail!("no inference engine: set model.files.engine or input.engine_url"),
    };

    let result = fit_seir(&inputs, engine.as_ref())?;
    result.write_to(&ctx)?;

    // Posterior summary per draw column
    let rows: Vec<Vec<String>> = result
        .draws
        .names()
        .iter()
        .filter_map(|name| {
            result
                .posterior_mean(name)
                .map(|mean| vec![name.clone(), mean.to_string()])
        })
        .collect();

    ctx.write_csv("summary.csv", &["quantity", "mean"], &rows)?;
    Ok(())
}
