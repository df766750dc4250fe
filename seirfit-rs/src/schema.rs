use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SchemaError;

/// Ordered name/value list. Reads from a map or from `[name, value]` pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedValues(Vec<(String, f64)>);

impl NamedValues {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.push((name.into(), value));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().map(|&(_, value)| value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for NamedValues {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }
}

impl Serialize for NamedValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NamedValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NamedValuesVisitor;

        impl<'de> Visitor<'de> for NamedValuesVisitor {
            type Value = NamedValues;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of names to numbers or a list of [name, number] pairs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    entries.push((name, value));
                }
                Ok(NamedValues(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(pair) = access.next_element::<(String, f64)>()? {
                    entries.push(pair);
                }
                Ok(NamedValues(entries))
            }
        }

        deserializer.deserialize_any(NamedValuesVisitor)
    }
}

/// Reference layout: exact field names in exact order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

impl Schema {
    /// First position where the names differ, a missing or surplus field
    /// included.
    pub fn check(&self, values: &NamedValues) -> Result<(), SchemaError> {
        let width = usize::max(self.fields.len(), values.len());
        for position in 0..width {
            let expected = self.fields.get(position).copied();
            let found = values.0.get(position).map(|(name, _)| name.as_str());
            if expected != found {
                return Err(SchemaError::Incompatible {
                    schema: self.name,
                    position,
                    expected,
                    found: found.map(str::to_owned),
                    layout: self.fields,
                });
            }
        }
        if let Some((name, _)) = values.0.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SchemaError::NonFinite {
                schema: self.name,
                name: name.clone(),
            });
        }
        Ok(())
    }
}

pub const FIXED_PARAMS_SCHEMA: Schema = Schema {
    name: "pars",
    fields: &["D", "k1", "k2", "q", "ud", "ur", "f0"],
};

pub const INITIAL_STATE_SCHEMA: Schema = Schema {
    name: "state_0",
    fields: &[
        "E1_frac", "E2_frac", "I_frac", "Q_num", "R_num", "E1d_frac", "E2d_frac", "Id_frac",
        "Qd_num", "Rd_num",
    ],
};

/// Fixed epidemiological constants of the compartmental model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixedParams {
    /// Mean duration from infection to infectiousness.
    #[serde(rename = "D")]
    pub d: f64,
    pub k1: f64,
    pub k2: f64,
    /// Rate at which detected cases are quarantined.
    pub q: f64,
    pub ud: f64,
    pub ur: f64,
    /// Transmission multiplier without distancing.
    pub f0: f64,
}

impl Default for FixedParams {
    fn default() -> Self {
        Self {
            d: 5.0,
            k1: 1.0 / 5.0,
            k2: 1.0,
            q: 0.05,
            ud: 0.1,
            ur: 0.02,
            f0: 1.0,
        }
    }
}

impl FixedParams {
    pub fn from_named(values: &NamedValues) -> Result<Self, SchemaError> {
        FIXED_PARAMS_SCHEMA.check(values)?;
        let v: Vec<f64> = values.values().collect();
        Ok(Self {
            d: v[0],
            k1: v[1],
            k2: v[2],
            q: v[3],
            ud: v[4],
            ur: v[5],
            f0: v[6],
        })
    }

    pub fn to_named(&self) -> NamedValues {
        FIXED_PARAMS_SCHEMA
            .fields
            .iter()
            .copied()
            .zip(self.values())
            .collect()
    }

    pub fn values(&self) -> [f64; 7] {
        [self.d, self.k1, self.k2, self.q, self.ud, self.ur, self.f0]
    }
}

/// Compartment state at the start of integration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InitialState {
    #[serde(rename = "E1_frac")]
    pub e1_frac: f64,
    #[serde(rename = "E2_frac")]
    pub e2_frac: f64,
    #[serde(rename = "I_frac")]
    pub i_frac: f64,
    #[serde(rename = "Q_num")]
    pub q_num: f64,
    #[serde(rename = "R_num")]
    pub r_num: f64,
    #[serde(rename = "E1d_frac")]
    pub e1d_frac: f64,
    #[serde(rename = "E2d_frac")]
    pub e2d_frac: f64,
    #[serde(rename = "Id_frac")]
    pub id_frac: f64,
    #[serde(rename = "Qd_num")]
    pub qd_num: f64,
    #[serde(rename = "Rd_num")]
    pub rd_num: f64,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            e1_frac: 0.4,
            e2_frac: 0.1,
            i_frac: 0.5,
            q_num: 0.0,
            r_num: 0.0,
            e1d_frac: 0.4,
            e2d_frac: 0.1,
            id_frac: 0.5,
            qd_num: 0.0,
            rd_num: 0.0,
        }
    }
}

impl InitialState {
    pub fn from_named(values: &NamedValues) -> Result<Self, SchemaError> {
        INITIAL_STATE_SCHEMA.check(values)?;
        let v: Vec<f64> = values.values().collect();
        Ok(Self {
            e1_frac: v[0],
            e2_frac: v[1],
            i_frac: v[2],
            q_num: v[3],
            r_num: v[4],
            e1d_frac: v[5],
            e2d_frac: v[6],
            id_frac: v[7],
            qd_num: v[8],
            rd_num: v[9],
        })
    }

    pub fn to_named(&self) -> NamedValues {
        INITIAL_STATE_SCHEMA
            .fields
            .iter()
            .copied()
            .zip(self.values())
            .collect()
    }

    pub fn values(&self) -> [f64; 10] {
        [
            self.e1_frac,
            self.e2_frac,
            self.i_frac,
            self.q_num,
            self.r_num,
            self.e1d_frac,
            self.e2d_frac,
            self.id_frac,
            self.qd_num,
            self.rd_num,
        ]
    }
}
