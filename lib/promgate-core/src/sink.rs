use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::GenericError;

/// Tags attached to an outgoing point.
pub type TagMap = BTreeMap<String, String>;

/// A fully-formed point, ready to be delivered to the backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricPoint<'a> {
    /// Metric name.
    pub name: &'a str,

    /// Metric value. Never NaN when produced by the writer.
    pub value: f64,

    /// Timestamp, forwarded as-is from the originating sample.
    pub timestamp: i64,

    /// Source identifier. Empty when the series had no `instance` label.
    pub source: &'a str,

    /// Tags.
    pub tags: &'a TagMap,
}

/// A destination for metric points.
///
/// This is the only boundary the writer talks to. Implementations typically wrap a backend client (proxy or direct
/// ingestion), and are expected to handle their own timeouts and connection management. The writer never retries a
/// failed send.
///
/// A single sink may be shared by many concurrent writes, so implementations must be safe to call concurrently.
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Sends a single point.
    ///
    /// # Errors
    ///
    /// If the point could not be delivered, an error is returned describing why.
    async fn send_metric(&self, point: MetricPoint<'_>) -> Result<(), GenericError>;
}

#[async_trait]
impl<T> PointSink for Arc<T>
where
    T: PointSink + ?Sized,
{
    async fn send_metric(&self, point: MetricPoint<'_>) -> Result<(), GenericError> {
        (**self).send_metric(point).await
    }
}

#[async_trait]
impl<T> PointSink for Box<T>
where
    T: PointSink + ?Sized,
{
    async fn send_metric(&self, point: MetricPoint<'_>) -> Result<(), GenericError> {
        (**self).send_metric(point).await
    }
}
