use thiserror::Error;

use crate::engine::EngineError;
use crate::protocol::ProtocolError;

pub type Result<T, E = FitError> = std::result::Result<T, E>;

/// Error returned from [crate::fit_seir] and the steps it is made of.
///
/// Every variant is fatal for the fitting call: nothing is retried and no
/// partial result is produced.
#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Dimension(#[from] DimensionError),

    #[error(transparent)]
    Prior(#[from] PriorError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(
        "case data contains the reserved missing-value marker {sentinel} at day {day}, stream {stream}"
    )]
    SentinelCollision {
        day: usize,
        stream: usize,
        sentinel: i64,
    },

    #[error("case count {value} at day {day}, stream {stream} is not a non-negative whole number")]
    InvalidCount { day: usize, stream: usize, value: f64 },

    #[error(
        "sampling fraction {value} at day {day} of stream {stream} must be a fixed value in [0, 1]"
    )]
    SampleFraction { stream: usize, day: usize, value: f64 },

    #[error("option `{name}` {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A named parameter vector does not match its reference layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error(
        "{schema} uses an outdated input schema: field {position} is {found:?}, expected {expected:?} (full layout: {layout:?})"
    )]
    Incompatible {
        schema: &'static str,
        position: usize,
        expected: Option<&'static str>,
        found: Option<String>,
        layout: &'static [&'static str],
    },

    #[error("{schema} field {name:?} is not finite")]
    NonFinite { schema: &'static str, name: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("case data must contain at least one day and one stream")]
    EmptyCases,

    #[error("row {row} has {actual} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{name} has {actual} rows, expected {expected} (observed days + forecast days)")]
    Rows {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name} has {actual} columns, expected {expected} (one per data stream)")]
    Columns {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name} has length {actual}, expected {expected}")]
    Length {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriorError {
    #[error("{name} prior: {source}")]
    Beta {
        name: &'static str,
        #[source]
        source: BetaError,
    },

    #[error("{name} prior spread {sd} must be positive and finite")]
    NonPositiveSpread { name: &'static str, sd: f64 },

    #[error("{name} prior location {location} is not finite")]
    NonFiniteLocation { name: &'static str, location: f64 },

    #[error("cannot draw initial value for {name}: {reason}")]
    Sampling { name: &'static str, reason: String },
}

/// Error returned from [crate::beta::BetaParams::from_mean_sd]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BetaError {
    #[error("mean {mean} must lie strictly between 0 and 1")]
    MeanOutOfRange { mean: f64 },

    #[error("standard deviation {sd} must be positive and finite")]
    NonPositiveSd { sd: f64 },

    #[error(
        "mean {mean} and sd {sd} give shape parameters alpha = {alpha}, beta = {beta}; both must be positive"
    )]
    Improper {
        mean: f64,
        sd: f64,
        alpha: f64,
        beta: f64,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("{name} must start at segment {expected}, found {found}")]
    Origin {
        name: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("{name} uses segment {found} at day {day}; ids start at {minimum}")]
    BelowMinimum {
        name: &'static str,
        day: usize,
        found: u32,
        minimum: u32,
    },
}
