//! The consumer side of a collection cycle.
//!
//! A cycle hands every record to an [`Accumulator`]: one
//! `(measurement, fields, tags)` tuple per target, plus out-of-band error
//! reports. What happens to them afterwards (printing, exporting, storing)
//! is up to the implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Tag set of a record (`{"address": <target>}` for probe records).
pub type Tags = BTreeMap<String, String>;
/// Field set of a record.
pub type Fields = BTreeMap<String, FieldValue>;

/// A numeric field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Receives the output of a collection cycle.
pub trait Accumulator {
    /// Accept one metric record.
    fn add_fields(&mut self, measurement: &str, fields: Fields, tags: Tags);

    /// Accept a diagnostic error report. Never fatal.
    fn add_error(&mut self, error: ProbeError);
}

/// A stored metric record with its arrival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub measurement: String,
    pub tags: Tags,
    pub fields: Fields,
    pub timestamp_unix_ms: u64,
}

impl Record {
    pub fn new(measurement: &str, fields: Fields, tags: Tags) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags,
            fields,
            timestamp_unix_ms: unix_ms_now(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).copied()
    }
}

/// Flat, serializable view of a [`ProbeError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub address: String,
    pub kind: String,
    pub message: String,
}

impl From<&ProbeError> for ErrorEntry {
    fn from(err: &ProbeError) -> Self {
        Self {
            address: err.address().to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Accumulator that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryAccumulator {
    pub records: Vec<Record>,
    pub errors: Vec<ProbeError>,
}

impl MemoryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record tagged with `address`, if one arrived.
    pub fn record_for(&self, address: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.tag("address") == Some(address))
    }

    /// Errors reported for `address`.
    pub fn errors_for<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a ProbeError> {
        self.errors.iter().filter(move |e| e.address() == address)
    }

    pub fn error_entries(&self) -> Vec<ErrorEntry> {
        self.errors.iter().map(ErrorEntry::from).collect()
    }
}

impl Accumulator for MemoryAccumulator {
    fn add_fields(&mut self, measurement: &str, fields: Fields, tags: Tags) {
        self.records.push(Record::new(measurement, fields, tags));
    }

    fn add_error(&mut self, error: ProbeError) {
        self.errors.push(error);
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;

    #[test]
    fn test_field_values_serialize_untagged() {
        let mut fields = Fields::new();
        fields.insert("result_code".into(), FieldValue::Int(0));
        fields.insert("max_rtt".into(), FieldValue::Float(20.5));
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"max_rtt":20.5,"result_code":0}"#);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Int(2).to_string(), "2");
        assert_eq!(FieldValue::Float(5e6).to_string(), "5000000");
        assert_eq!(FieldValue::Float(0.25).to_string(), "0.25");
        assert_eq!(FieldValue::Int(2).as_f64(), 2.0);
    }

    #[test]
    fn test_memory_accumulator_collects_records_and_errors() {
        let mut acc = MemoryAccumulator::new();
        let mut tags = Tags::new();
        tags.insert("address".into(), "10.0.0.1".into());
        let mut fields = Fields::new();
        fields.insert("result_code".into(), FieldValue::Int(2));
        acc.add_fields("iperf", fields, tags);
        acc.add_error(ProbeError::Report {
            address: "10.0.0.1".into(),
            source: ReportError::MissingData("end".into()),
        });

        let r = acc.record_for("10.0.0.1").unwrap();
        assert_eq!(r.measurement, "iperf");
        assert_eq!(r.field("result_code"), Some(FieldValue::Int(2)));
        assert!(r.timestamp_unix_ms > 0);
        assert_eq!(acc.errors_for("10.0.0.1").count(), 1);
        assert_eq!(acc.errors_for("10.0.0.2").count(), 0);
        assert!(acc.record_for("10.0.0.2").is_none());

        let entries = acc.error_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "10.0.0.1");
        assert_eq!(entries[0].kind, "missing_data");
        assert_eq!(
            entries[0].message,
            "could not find 'end' in the report: 10.0.0.1"
        );
    }
}
