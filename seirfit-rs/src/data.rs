use nalgebra::{DMatrix, Scalar};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{DimensionError, FitError};

/// Value marking a missing observation inside the engine's case array.
pub const MISSING_SENTINEL: i64 = 9_999_999;

/// A flat sequence (one stream) or a list of rows (one column per stream).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VectorOrMatrix<T> {
    Vector(Vec<T>),
    Matrix(Vec<Vec<T>>),
}

impl<T: Scalar> VectorOrMatrix<T> {
    /// Flat sequences become a single column.
    pub fn into_matrix(self) -> Result<DMatrix<T>, DimensionError> {
        match self {
            Self::Vector(values) => Ok(DMatrix::from_vec(values.len(), 1, values)),
            Self::Matrix(rows) => {
                let ncols = rows.first().map_or(0, Vec::len);
                if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
                    return Err(DimensionError::Ragged {
                        row,
                        expected: ncols,
                        actual: r.len(),
                    });
                }
                let nrows = rows.len();
                Ok(DMatrix::from_row_iterator(
                    nrows,
                    ncols,
                    rows.into_iter().flatten(),
                ))
            }
        }
    }
}

/// Daily counts, one row per observed day and one column per data stream.
///
/// Missing observations are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSeries {
    counts: DMatrix<Option<f64>>,
}

impl CaseSeries {
    pub fn new(counts: DMatrix<Option<f64>>) -> Result<Self, DimensionError> {
        if counts.nrows() == 0 || counts.ncols() == 0 {
            return Err(DimensionError::EmptyCases);
        }
        Ok(Self { counts })
    }

    /// Single-stream series.
    pub fn from_vector(values: &[Option<f64>]) -> Result<Self, DimensionError> {
        Self::new(DMatrix::from_column_slice(values.len(), 1, values))
    }

    /// Single-stream series without missing values.
    pub fn from_counts(values: &[f64]) -> Result<Self, DimensionError> {
        Self::new(DMatrix::from_iterator(
            values.len(),
            1,
            values.iter().copied().map(Some),
        ))
    }

    pub fn from_rows(rows: Vec<Vec<Option<f64>>>) -> Result<Self, DimensionError> {
        Self::new(VectorOrMatrix::Matrix(rows).into_matrix()?)
    }

    pub fn n_days(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_streams(&self) -> usize {
        self.counts.ncols()
    }

    pub fn get(&self, day: usize, stream: usize) -> Option<f64> {
        self.counts.get((day, stream)).copied().flatten()
    }

    pub fn missing_count(&self) -> usize {
        self.counts.iter().filter(|v| v.is_none()).count()
    }

    pub fn has_missing(&self) -> bool {
        self.counts.iter().any(Option::is_none)
    }

    pub fn rows(&self) -> Vec<Vec<Option<f64>>> {
        self.counts
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect()
    }

    /// Integer rows for the engine, missing values replaced by
    /// [`MISSING_SENTINEL`].
    ///
    /// Fails if an observed value already equals the sentinel, or is not a
    /// non-negative whole number.
    pub fn to_engine_rows(&self) -> Result<Vec<Vec<i64>>, FitError> {
        for (day, row) in self.counts.row_iter().enumerate() {
            for (stream, value) in row.iter().enumerate() {
                if *value == Some(MISSING_SENTINEL as f64) {
                    return Err(FitError::SentinelCollision {
                        day,
                        stream,
                        sentinel: MISSING_SENTINEL,
                    });
                }
            }
        }
        self.counts
            .row_iter()
            .enumerate()
            .map(|(day, row)| {
                row.iter()
                    .enumerate()
                    .map(|(stream, value)| match *value {
                        None => Ok(MISSING_SENTINEL),
                        Some(v) if v >= 0.0 && v.fract() == 0.0 && v < i64::MAX as f64 => {
                            Ok(v as i64)
                        }
                        Some(v) => Err(FitError::InvalidCount {
                            day,
                            stream,
                            value: v,
                        }),
                    })
                    .collect::<Result<Vec<i64>, FitError>>()
            })
            .collect()
    }
}

impl Serialize for CaseSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rows().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CaseSeries {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = VectorOrMatrix::<Option<f64>>::deserialize(deserializer)?;
        raw.into_matrix()
            .and_then(Self::new)
            .map_err(serde::de::Error::custom)
    }
}

/// Row-major copy of a matrix, the layout the engine reads 2-D arrays in.
pub fn matrix_rows<T: Scalar>(matrix: &DMatrix<T>) -> Vec<Vec<T>> {
    matrix
        .row_iter()
        .map(|row| row.iter().cloned().collect())
        .collect()
}
