//! Solver info records
//!
//! The metadata half of a cache entry: a small versioned JSON document of
//! diagnostic values a solver produced alongside its decoder matrix (rmse,
//! iteration counts, and similar). The record is opaque to the store.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Newest info format version this build reads and writes
pub const INFO_VERSION: u32 = 1;

// JSON has no number form for non-finite floats; these strings stand in
// for them on disk and are reserved in string values.
const NAN_REPR: &str = "NaN";
const INF_REPR: &str = "Infinity";
const NEG_INF_REPR: &str = "-Infinity";

/// A single value in a solver info record.
///
/// Values take their natural JSON forms, except non-finite floats: those
/// persist as the reserved strings `"NaN"`, `"Infinity"`, and
/// `"-Infinity"`, and read back as floats, never as text.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating-point number
    Float(f64),
    /// Text
    Str(String),
    /// Ordered list of values
    List(Vec<InfoValue>),
    /// Nested record
    Map(BTreeMap<String, InfoValue>),
}

impl Serialize for InfoValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            InfoValue::Bool(v) => serializer.serialize_bool(*v),
            InfoValue::Int(v) => serializer.serialize_i64(*v),
            InfoValue::Float(v) if v.is_nan() => serializer.serialize_str(NAN_REPR),
            InfoValue::Float(v) if *v == f64::INFINITY => serializer.serialize_str(INF_REPR),
            InfoValue::Float(v) if *v == f64::NEG_INFINITY => {
                serializer.serialize_str(NEG_INF_REPR)
            }
            InfoValue::Float(v) => serializer.serialize_f64(*v),
            InfoValue::Str(v) => serializer.serialize_str(v),
            InfoValue::List(v) => v.serialize(serializer),
            InfoValue::Map(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InfoValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = InfoValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a bool, number, string, list, or map")
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<InfoValue, E>
            where
                E: de::Error,
            {
                Ok(InfoValue::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<InfoValue, E>
            where
                E: de::Error,
            {
                Ok(InfoValue::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<InfoValue, E>
            where
                E: de::Error,
            {
                Ok(match i64::try_from(v) {
                    Ok(n) => InfoValue::Int(n),
                    Err(_) => InfoValue::Float(v as f64),
                })
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<InfoValue, E>
            where
                E: de::Error,
            {
                Ok(InfoValue::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<InfoValue, E>
            where
                E: de::Error,
            {
                Ok(match v {
                    NAN_REPR => InfoValue::Float(f64::NAN),
                    INF_REPR => InfoValue::Float(f64::INFINITY),
                    NEG_INF_REPR => InfoValue::Float(f64::NEG_INFINITY),
                    _ => InfoValue::Str(v.to_string()),
                })
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<InfoValue, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element()? {
                    values.push(value);
                }
                Ok(InfoValue::List(values))
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<InfoValue, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut values = BTreeMap::new();
                while let Some((key, value)) = map.next_entry()? {
                    values.insert(key, value);
                }
                Ok(InfoValue::Map(values))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<bool> for InfoValue {
    fn from(v: bool) -> Self {
        InfoValue::Bool(v)
    }
}

impl From<i64> for InfoValue {
    fn from(v: i64) -> Self {
        InfoValue::Int(v)
    }
}

impl From<f64> for InfoValue {
    fn from(v: f64) -> Self {
        InfoValue::Float(v)
    }
}

impl From<&str> for InfoValue {
    fn from(v: &str) -> Self {
        InfoValue::Str(v.to_string())
    }
}

impl From<String> for InfoValue {
    fn from(v: String) -> Self {
        InfoValue::Str(v)
    }
}

/// Structured diagnostic record stored alongside a decoder matrix.
///
/// An entry whose info file went missing reads back as an empty record, so
/// an empty `SolverInfo` is always a valid value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverInfo {
    version: u32,
    #[serde(default)]
    fields: BTreeMap<String, InfoValue>,
}

impl SolverInfo {
    /// New empty record at the current format version
    pub fn new() -> Self {
        SolverInfo {
            version: INFO_VERSION,
            fields: BTreeMap::new(),
        }
    }

    /// Format version the record was written with
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<InfoValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](SolverInfo::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<InfoValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.fields.get(key)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record holds no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize to the on-disk JSON form
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the on-disk JSON form
    ///
    /// # Arguments
    /// * `bytes` - Complete info file contents
    ///
    /// # Returns
    /// * `Result<SolverInfo>` - Decoded record, rejecting versions newer
    ///   than this build understands
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let info: SolverInfo = serde_json::from_slice(bytes)?;
        if info.version > INFO_VERSION {
            return Err(Error::Version {
                found: info.version,
                supported: INFO_VERSION,
            });
        }
        Ok(info)
    }
}

impl Default for SolverInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let mut inner = BTreeMap::new();
        inner.insert("reg".to_string(), InfoValue::Float(0.1));
        let info = SolverInfo::new()
            .with("rmses", InfoValue::List(vec![0.01.into(), 0.02.into()]))
            .with("iterations", 42i64)
            .with("converged", true)
            .with("method", "lstsq")
            .with("params", InfoValue::Map(inner));

        let bytes = info.to_json().unwrap();
        let decoded = SolverInfo::from_json(&bytes).unwrap();

        assert_eq!(decoded, info);
        assert_eq!(decoded.version(), INFO_VERSION);
    }

    #[test]
    fn test_empty_record() {
        let info = SolverInfo::new();
        assert!(info.is_empty());
        assert_eq!(info.len(), 0);
        assert!(info.get("anything").is_none());
    }

    #[test]
    fn test_set_replaces_value() {
        let mut info = SolverInfo::new();
        info.set("n", 1i64);
        info.set("n", 2i64);

        assert_eq!(info.len(), 1);
        assert_eq!(info.get("n"), Some(&InfoValue::Int(2)));
    }

    #[test]
    fn test_from_json_rejects_future_version() {
        let bytes = br#"{"version": 99, "fields": {}}"#;
        assert!(matches!(
            SolverInfo::from_json(bytes),
            Err(Error::Version { found: 99, supported: 1 })
        ));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(SolverInfo::from_json(b"not json").is_err());
    }

    #[test]
    fn test_scalar_decoding() {
        let bytes = br#"{"version": 1, "fields": {"a": 3, "b": 3.5, "c": true, "d": "x"}}"#;
        let info = SolverInfo::from_json(bytes).unwrap();

        assert_eq!(info.get("a"), Some(&InfoValue::Int(3)));
        assert_eq!(info.get("b"), Some(&InfoValue::Float(3.5)));
        assert_eq!(info.get("c"), Some(&InfoValue::Bool(true)));
        assert_eq!(info.get("d"), Some(&InfoValue::Str("x".to_string())));
    }

    #[test]
    fn test_missing_fields_defaults_empty() {
        let info = SolverInfo::from_json(br#"{"version": 1}"#).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn test_non_finite_floats_roundtrip() {
        let info = SolverInfo::new()
            .with("rmse", f64::NAN)
            .with("upper", f64::INFINITY)
            .with("lower", f64::NEG_INFINITY)
            .with("per_target", InfoValue::List(vec![0.5.into(), f64::NAN.into()]));

        let bytes = info.to_json().unwrap();
        let decoded = SolverInfo::from_json(&bytes).unwrap();

        assert!(matches!(decoded.get("rmse"), Some(InfoValue::Float(v)) if v.is_nan()));
        assert_eq!(decoded.get("upper"), Some(&InfoValue::Float(f64::INFINITY)));
        assert_eq!(decoded.get("lower"), Some(&InfoValue::Float(f64::NEG_INFINITY)));
        match decoded.get("per_target") {
            Some(InfoValue::List(items)) => {
                assert_eq!(items[0], InfoValue::Float(0.5));
                assert!(matches!(items[1], InfoValue::Float(v) if v.is_nan()));
            }
            other => panic!("expected a list, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_reprs_are_reserved_strings() {
        let bytes = br#"{"version": 1, "fields": {"a": "NaN", "b": "nan"}}"#;
        let info = SolverInfo::from_json(bytes).unwrap();

        assert!(matches!(info.get("a"), Some(InfoValue::Float(v)) if v.is_nan()));
        assert_eq!(info.get("b"), Some(&InfoValue::Str("nan".to_string())));
    }
}
