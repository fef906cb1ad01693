//! Remote-write data model.
//!
//! These types mirror the Prometheus remote-write protobuf schema field-for-field, so a decoded write request body can
//! be handed to the writer as-is.

/// Label carrying the metric name of a series.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A batch of time series, as sent in a single remote-write request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

impl WriteRequest {
    /// Creates a new `WriteRequest` from the given series.
    pub fn new(timeseries: Vec<TimeSeries>) -> Self {
        Self { timeseries }
    }
}

/// A single series: its labels, and the samples observed for it.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,

    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Creates a new `TimeSeries` from the given labels and samples.
    pub fn new(labels: Vec<Label>, samples: Vec<Sample>) -> Self {
        Self { labels, samples }
    }

    /// Returns the metric name of this series.
    ///
    /// If the series has no `__name__` label, an empty string is returned.
    pub fn metric_name(&self) -> &str {
        self.labels
            .iter()
            .find(|label| label.name == METRIC_NAME_LABEL)
            .map(|label| label.value.as_str())
            .unwrap_or_default()
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub value: String,
}

impl Label {
    /// Creates a new `Label`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single observation of a series.
///
/// A value of NaN is how Prometheus signals missing data, and such samples are never forwarded.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,

    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

impl Sample {
    /// Creates a new `Sample`.
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use prost::Message as _;

    use super::*;

    #[test]
    fn metric_name_from_labels() {
        let series = TimeSeries::new(
            vec![Label::new("job", "node"), Label::new("__name__", "up")],
            vec![Sample::new(1.0, 1000)],
        );
        assert_eq!(series.metric_name(), "up");

        let unnamed = TimeSeries::new(vec![Label::new("job", "node")], vec![]);
        assert_eq!(unnamed.metric_name(), "");
    }

    #[test]
    fn decodes_remote_write_wire_format() {
        // One series, label {__name__="up"}, sample (1.0, 1000), encoded by hand.
        let payload: &[u8] = &[
            0x0a, 0x1e, // timeseries, length 30
            0x0a, 0x0e, // labels, length 14
            0x0a, 0x08, b'_', b'_', b'n', b'a', b'm', b'e', b'_', b'_', // name
            0x12, 0x02, b'u', b'p', // value
            0x12, 0x0c, // samples, length 12
            0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, // value = 1.0
            0x10, 0xe8, 0x07, // timestamp = 1000
        ];

        let request = WriteRequest::decode(payload).unwrap();
        assert_eq!(request.timeseries.len(), 1);

        let series = &request.timeseries[0];
        assert_eq!(series.metric_name(), "up");
        assert_eq!(series.samples, vec![Sample::new(1.0, 1000)]);
    }
}
