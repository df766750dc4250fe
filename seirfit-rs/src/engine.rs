use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::bundle::ConfigBundle;
use crate::draws::RawDraws;
use crate::inits::InitialValues;
use crate::options::FitType;
use crate::protocol::run_document;

pub const DRAWS_FILE: &str = "draws.csv";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch inference engine `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inference engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("inference engine request failed: {0}")]
    Transport(String),

    #[error("inference engine returned malformed draws: {0}")]
    MalformedDraws(String),

    #[error("inference engine wrote no draws to {0}")]
    MissingDraws(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub fn retained_quantities(save_state_predictions: bool) -> Vec<String> {
    let mut pars = vec![
        "R0",
        "i0",
        "f_s",
        "phi",
        "lambda_d",
        "y_rep",
        "ur",
        "start_decline",
        "end_decline",
        "samp_frac",
    ];
    if save_state_predictions {
        pars.extend(["y_hat", "y"]);
    }
    pars.into_iter().map(str::to_owned).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineRequest<'a> {
    pub data: &'a ConfigBundle,
    pub init: &'a [InitialValues],
    pub iter: u32,
    pub chains: u32,
    pub seed: u64,
    pub pars: Vec<String>,
    pub fit_type: FitType,
    /// Forwarded untouched, under its own key.
    pub engine_args: &'a serde_json::Map<String, Value>,
}

impl EngineRequest<'_> {
    pub fn to_document(&self, output_dir: Option<&Path>) -> Result<Value, EngineError> {
        Ok(run_document(serde_json::to_value(self)?, self.seed, output_dir))
    }
}

/// The external sampler. One call runs every chain to completion or fails
/// as a whole.
pub trait InferenceEngine {
    fn sample(&self, request: &EngineRequest) -> Result<RawDraws, EngineError>;

    /// Recorded with the fit so its draws can be traced to an engine.
    fn identifier(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
}

/// Engine run as a child process. It reads the run document on stdin and
/// writes [`DRAWS_FILE`] into the output directory the document names.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl InferenceEngine for CommandEngine {
    fn sample(&self, request: &EngineRequest) -> Result<RawDraws, EngineError> {
        fs::create_dir_all(&self.work_dir)?;
        // fresh per call, removed once the draws are read
        let output_dir = tempfile::Builder::new()
            .prefix(&format!("engine-{}-", request.seed))
            .tempdir_in(&self.work_dir)?;
        let document = serde_json::to_vec(&request.to_document(Some(output_dir.path()))?)?;

        log::debug!(
            "launching {} with output in {}",
            self.program.display(),
            output_dir.path().display()
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        // stdin is fed from its own thread while stderr drains here
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&document)?;
            }
            Ok(())
        });
        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
        if !output.status.success() {
            return Err(EngineError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        written?;

        let draws_path = output_dir.path().join(DRAWS_FILE);
        let file = match fs::File::open(&draws_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::MissingDraws(draws_path));
            }
            Err(e) => return Err(e.into()),
        };
        RawDraws::from_csv_reader(file)
    }

    fn identifier(&self) -> String {
        let mut id = self.program.display().to_string();
        for arg in &self.args {
            id.push(' ');
            id.push_str(arg);
        }
        id
    }
}

/// Engine served over HTTP. The run document is POSTed as JSON and the
/// response body is `{"draws": {"<column>": [...], ...}}`.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    url: String,
}

#[derive(serde::Deserialize)]
struct HttpDraws {
    draws: serde_json::Map<String, Value>,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl InferenceEngine for HttpEngine {
    fn sample(&self, request: &EngineRequest) -> Result<RawDraws, EngineError> {
        let body = serde_json::to_vec(&request.to_document(None)?)?;
        log::debug!("posting {} byte request to {}", body.len(), self.url);
        let mut response = ureq::post(&self.url)
            .header("Content-Type", "application/json")
            .send(&body[..])
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let raw = response
            .body_mut()
            .read_to_string()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let parsed: HttpDraws = serde_json::from_str(&raw)?;
        parse_draw_columns(parsed.draws)
    }

    fn identifier(&self) -> String {
        self.url.clone()
    }
}

fn parse_draw_columns(draws: serde_json::Map<String, Value>) -> Result<RawDraws, EngineError> {
    let columns = draws
        .into_iter()
        .map(|(name, values)| {
            serde_json::from_value::<Vec<f64>>(values)
                .map(|column| (name.clone(), column))
                .map_err(|e| EngineError::MalformedDraws(format!("{name}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    RawDraws::from_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{FitInputs, assemble};
    use crate::data::CaseSeries;
    use crate::inits::sample_initial_values;
    use serde_json::json;

    fn request<'a>(
        bundle: &'a ConfigBundle,
        engine_args: &'a serde_json::Map<String, Value>,
    ) -> EngineRequest<'a> {
        EngineRequest {
            data: bundle,
            init: &[],
            iter: 10,
            chains: 1,
            seed: 1,
            pars: retained_quantities(false),
            fit_type: FitType::Nuts,
            engine_args,
        }
    }

    #[test]
    fn test_retained_quantities() {
        let base = retained_quantities(false);
        assert!(base.contains(&"R0".to_string()));
        assert!(!base.contains(&"y_hat".to_string()));
        let full = retained_quantities(true);
        assert_eq!(full.len(), base.len() + 2);
        assert!(full.contains(&"y_hat".to_string()));
    }

    #[test]
    fn test_request_document() {
        let cases = CaseSeries::from_counts(&[1.0, 2.0, 3.0]).unwrap();
        let inputs = FitInputs::single_stream(cases, 0.2, 0);
        let assembled = assemble(&inputs).unwrap();
        let inits = sample_initial_values(&inputs.options.priors, 1, 0.1, 2, 7).unwrap();
        let mut engine_args = serde_json::Map::new();
        engine_args.insert("adapt_delta".into(), json!(0.99));
        let request = EngineRequest {
            data: &assembled.bundle,
            init: &inits,
            iter: 100,
            chains: 2,
            seed: 7,
            pars: retained_quantities(false),
            fit_type: FitType::Nuts,
            engine_args: &engine_args,
        };
        let doc = request.to_document(Some(Path::new("/tmp/engine"))).unwrap();
        assert_eq!(doc["input"]["seed"], json!(7));
        assert_eq!(doc["input"]["engine_args"]["adapt_delta"], json!(0.99));
        assert_eq!(doc["input"]["fit_type"], json!("NUTS"));
        assert_eq!(doc["input"]["data"]["N"], json!(3));
        assert_eq!(doc["input"]["data"]["daily_cases"], json!([[1], [2], [3]]));
        assert_eq!(doc["input"]["init"].as_array().unwrap().len(), 2);
        assert_eq!(doc["output"]["dir"], json!("/tmp/engine"));
        assert_eq!(
            HttpEngine::new("http://localhost:8080/fit").identifier(),
            "http://localhost:8080/fit"
        );
    }

    #[test]
    fn test_engine_args_cannot_shadow_request() {
        let cases = CaseSeries::from_counts(&[1.0, 2.0, 3.0]).unwrap();
        let assembled = assemble(&FitInputs::single_stream(cases, 0.2, 0)).unwrap();
        let mut engine_args = serde_json::Map::new();
        engine_args.insert("data".into(), json!({"N": 1}));
        engine_args.insert("chains".into(), json!(0));
        let doc = request(&assembled.bundle, &engine_args)
            .to_document(None)
            .unwrap();
        assert_eq!(doc["input"]["data"]["N"], json!(3));
        assert_eq!(doc["input"]["chains"], json!(1));
        assert_eq!(doc["input"]["engine_args"]["data"], json!({"N": 1}));
        assert_eq!(doc["input"]["engine_args"]["chains"], json!(0));
    }

    #[test]
    fn test_parse_draw_columns() {
        let draws = json!({"R0": [2.5, 2.6], "f_s.1": [0.3, 0.4]});
        let Value::Object(map) = draws else {
            unreachable!()
        };
        let parsed = parse_draw_columns(map).unwrap();
        assert_eq!(parsed.n_draws(), 2);
        assert_eq!(parsed.names(), &["R0".to_string(), "f_s.1".to_string()]);

        let bad = json!({"R0": ["x"]});
        let Value::Object(map) = bad else {
            unreachable!()
        };
        assert!(matches!(
            parse_draw_columns(map),
            Err(EngineError::MalformedDraws(_))
        ));
    }

    #[test]
    fn test_command_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(dir.path().join("no-such-engine"), dir.path());
        let cases = CaseSeries::from_counts(&[1.0, 2.0]).unwrap();
        let assembled = assemble(&FitInputs::single_stream(cases, 0.2, 0)).unwrap();
        let engine_args = serde_json::Map::new();
        assert!(matches!(
            engine.sample(&request(&assembled.bundle, &engine_args)),
            Err(EngineError::Launch { .. })
        ));
    }

    // reads the output dir out of the run document and writes two draws there
    #[cfg(unix)]
    const WRITE_DRAWS: &str = r#"dir=$(sed -n 's/.*"dir":"\([^"]*\)".*/\1/p'); printf 'R0,i0\n2.5,8\n' > "$dir/draws.csv""#;

    #[cfg(unix)]
    #[test]
    fn test_command_reads_draws() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new("sh", dir.path())
            .arg("-c")
            .arg(WRITE_DRAWS);
        let cases = CaseSeries::from_counts(&[1.0, 2.0]).unwrap();
        let assembled = assemble(&FitInputs::single_stream(cases, 0.2, 0)).unwrap();
        let engine_args = serde_json::Map::new();
        let draws = engine
            .sample(&request(&assembled.bundle, &engine_args))
            .unwrap();
        assert_eq!(draws.column("R0"), Some(&[2.5][..]));
        assert_eq!(draws.column("i0"), Some(&[8.0][..]));
        // output dirs do not outlive the call
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(engine.identifier().starts_with("sh -c"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_draws_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        for stale in ["engine-1", "engine-1-"] {
            std::fs::create_dir_all(dir.path().join(stale)).unwrap();
            std::fs::write(dir.path().join(stale).join(DRAWS_FILE), "R0\n9\n").unwrap();
        }
        let engine = CommandEngine::new("sh", dir.path())
            .arg("-c")
            .arg("cat > /dev/null");
        let cases = CaseSeries::from_counts(&[1.0, 2.0]).unwrap();
        let assembled = assemble(&FitInputs::single_stream(cases, 0.2, 0)).unwrap();
        let engine_args = serde_json::Map::new();
        assert!(matches!(
            engine.sample(&request(&assembled.bundle, &engine_args)),
            Err(EngineError::MissingDraws(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_engine_with_large_request() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("head -c 300000 /dev/zero | tr '\\0' x >&2; {WRITE_DRAWS}");
        let engine = CommandEngine::new("sh", dir.path()).arg("-c").arg(script);
        let counts: Vec<f64> = (0..2000).map(|d| f64::from(d % 50)).collect();
        let cases = CaseSeries::from_counts(&counts).unwrap();
        let mut inputs = FitInputs::single_stream(cases, 0.2, 0);
        inputs.options.time_increment = 0.1;
        let assembled = assemble(&inputs).unwrap();
        let engine_args = serde_json::Map::new();
        let request = request(&assembled.bundle, &engine_args);
        let size = serde_json::to_vec(&request.to_document(None).unwrap())
            .unwrap()
            .len();
        assert!(size > 65_536);
        let draws = engine.sample(&request).unwrap();
        assert_eq!(draws.n_draws(), 1);
    }
}
