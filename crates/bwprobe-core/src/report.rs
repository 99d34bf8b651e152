//! Decoding the tool's JSON report into flat metrics.
//!
//! Only `end.streams[0].sender` is read. Reports from parallel runs (`-P`)
//! carry one entry per stream; the others are ignored.
//!
//! Decoding happens in two steps: the text must be a JSON object at all
//! (otherwise [`ReportError::Format`]), then the `end` section is decoded
//! into typed structs whose fields are all optional, so that an absent
//! section or key becomes [`ReportError::MissingData`] while a key of the
//! wrong type stays a format error.

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Metric keys in emission order.
pub const METRIC_KEYS: [&str; 7] = [
    "bytes_sent",
    "retransmits",
    "bits_per_second",
    "max_snd_cwnd",
    "max_rtt",
    "min_rtt",
    "mean_rtt",
];

/// Metrics read from the sender side of one measurement.
///
/// RTT values are in milliseconds; the report carries microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SenderMetrics {
    pub bytes_sent: f64,
    pub retransmits: f64,
    pub bits_per_second: f64,
    pub max_snd_cwnd: f64,
    pub max_rtt: f64,
    pub min_rtt: f64,
    pub mean_rtt: f64,
}

impl SenderMetrics {
    /// `(key, value)` pairs in [`METRIC_KEYS`] order.
    pub fn to_pairs(&self) -> [(&'static str, f64); 7] {
        [
            ("bytes_sent", self.bytes_sent),
            ("retransmits", self.retransmits),
            ("bits_per_second", self.bits_per_second),
            ("max_snd_cwnd", self.max_snd_cwnd),
            ("max_rtt", self.max_rtt),
            ("min_rtt", self.min_rtt),
            ("mean_rtt", self.mean_rtt),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct EndSection {
    streams: Option<Vec<StreamSection>>,
}

#[derive(Debug, Deserialize)]
struct StreamSection {
    sender: Option<SenderSection>,
}

#[derive(Debug, Deserialize)]
struct SenderSection {
    bytes: Option<f64>,
    retransmits: Option<f64>,
    bits_per_second: Option<f64>,
    max_snd_cwnd: Option<f64>,
    max_rtt: Option<f64>,
    min_rtt: Option<f64>,
    mean_rtt: Option<f64>,
}

const USEC_PER_MSEC: f64 = 1000.0;

/// Parse a captured report.
pub fn parse_report(text: &str) -> Result<SenderMetrics, ReportError> {
    let doc: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| ReportError::Format(e.to_string()))?;
    let root = doc
        .as_object()
        .ok_or_else(|| ReportError::Format("report is not a JSON object".to_string()))?;

    let end = match root.get("end") {
        None | Some(serde_json::Value::Null) => {
            return Err(ReportError::MissingData("end".to_string()));
        }
        Some(v) => v,
    };
    let end: EndSection = EndSection::deserialize(end)
        .map_err(|e| ReportError::Format(format!("end: {e}")))?;

    let stream = end
        .streams
        .and_then(|s| s.into_iter().next())
        .ok_or_else(|| ReportError::MissingData("end.streams[0]".to_string()))?;
    let sender = stream
        .sender
        .ok_or_else(|| ReportError::MissingData("end.streams[0].sender".to_string()))?;

    let field = |value: Option<f64>, key: &str| {
        value.ok_or_else(|| ReportError::MissingData(format!("end.streams[0].sender.{key}")))
    };

    Ok(SenderMetrics {
        bytes_sent: field(sender.bytes, "bytes")?,
        retransmits: field(sender.retransmits, "retransmits")?,
        bits_per_second: field(sender.bits_per_second, "bits_per_second")?,
        max_snd_cwnd: field(sender.max_snd_cwnd, "max_snd_cwnd")?,
        max_rtt: field(sender.max_rtt, "max_rtt")? / USEC_PER_MSEC,
        min_rtt: field(sender.min_rtt, "min_rtt")? / USEC_PER_MSEC,
        mean_rtt: field(sender.mean_rtt, "mean_rtt")? / USEC_PER_MSEC,
    })
}
