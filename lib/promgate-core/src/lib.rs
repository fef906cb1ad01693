//! Translation of Prometheus remote-write requests into metric points.
//!
//! A [`MetricWriter`] takes decoded [`WriteRequest`]s and submits one point per non-NaN sample to a [`PointSink`],
//! which wraps whatever client actually delivers points to the backend.

pub mod health;
pub mod model;
pub mod sink;
pub mod writer;

#[cfg(any(test, feature = "test"))]
pub mod test_util;

/// A generic error.
pub type GenericError = anyhow::Error;

pub use self::health::{health_check, HealthStatus};
pub use self::model::{Label, Sample, TimeSeries, WriteRequest};
pub use self::sink::{MetricPoint, PointSink, TagMap};
pub use self::writer::{MetricWriter, WriteSummary, WriterConfiguration};
