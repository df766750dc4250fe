use std::io::{Read, Write};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::engine::EngineError;

/// Posterior draws returned by the engine, one column per scalar quantity.
///
/// Columns keep the engine's order. Array-valued quantities are flattened
/// into `name.i` / `name.i.j` columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDraws {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl RawDraws {
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Vec<f64>)>,
    ) -> Result<Self, EngineError> {
        let (names, columns): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        if let Some(first) = columns.first()
            && let Some(i) = columns.iter().position(|c| c.len() != first.len())
        {
            return Err(EngineError::MalformedDraws(format!(
                "column {} has {} draws, expected {}",
                names[i],
                columns[i].len(),
                first.len()
            )));
        }
        Ok(Self { names, columns })
    }

    /// Read draws from CSV with a header row. Lines starting with `#` are
    /// skipped.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, EngineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);
        let names: Vec<String> = rdr
            .headers()
            .map_err(|e| EngineError::MalformedDraws(e.to_string()))?
            .iter()
            .map(str::to_owned)
            .collect();
        let mut columns = vec![Vec::new(); names.len()];
        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| EngineError::MalformedDraws(e.to_string()))?;
            for (column, field) in columns.iter_mut().zip(record.iter()) {
                let value = field.parse::<f64>().map_err(|e| {
                    EngineError::MalformedDraws(format!("draw {row}: `{field}`: {e}"))
                })?;
                column.push(value);
            }
        }
        Self::from_columns(names.into_iter().zip(columns))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.names)?;
        for row in 0..self.n_draws() {
            wtr.write_record(self.columns.iter().map(|c| c[row].to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn n_draws(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Every column of quantity `base`: `base` itself or `base.<index>`.
    pub fn quantity<'a>(&'a self, base: &'a str) -> impl Iterator<Item = (&'a str, &'a [f64])> {
        self.names
            .iter()
            .zip(&self.columns)
            .filter(move |(name, _)| {
                name.as_str() == base
                    || name
                        .strip_prefix(base)
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .map(|(name, column)| (name.as_str(), column.as_slice()))
    }
}

impl Serialize for RawDraws {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (name, column) in self.names.iter().zip(&self.columns) {
            map.serialize_entry(name, column)?;
        }
        map.end()
    }
}
