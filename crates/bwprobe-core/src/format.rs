//! Text renderings of [`Record`]s: JSON lines and InfluxDB line protocol.

use crate::sink::{FieldValue, Record};

/// One record as a single JSON line.
pub fn to_json_line(record: &Record) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}

/// One record in InfluxDB line protocol, nanosecond timestamp.
///
/// ```
/// use bwprobe_core::{FieldValue, Record, format::to_line_protocol};
///
/// let mut r = Record::new(
///     "iperf",
///     [("result_code".to_string(), FieldValue::Int(2))].into(),
///     [("address".to_string(), "10.0.0.1:5201".to_string())].into(),
/// );
/// r.timestamp_unix_ms = 1_700_000_000_000;
/// assert_eq!(
///     to_line_protocol(&r),
///     "iperf,address=10.0.0.1:5201 result_code=2i 1700000000000000000"
/// );
/// ```
pub fn to_line_protocol(record: &Record) -> String {
    let mut line = escape(&record.measurement, &[',', ' ']);
    for (key, value) in &record.tags {
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    let fields: Vec<String> = record
        .fields
        .iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Int(v) => format!("{v}i"),
                FieldValue::Float(v) => format!("{v}"),
            };
            format!("{}={}", escape(key, &[',', '=', ' ']), value)
        })
        .collect();
    line.push(' ');
    line.push_str(&fields.join(","));

    line.push(' ');
    line.push_str(&(u128::from(record.timestamp_unix_ms) * 1_000_000).to_string());
    line
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
