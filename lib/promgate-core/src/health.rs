//! Sink health probing.

use chrono::Utc;
use http::StatusCode;

use crate::sink::{MetricPoint, PointSink, TagMap};

/// Metric name of the synthetic point sent by [`health_check`].
pub const HEALTH_CHECK_METRIC: &str = "prom.gateway.healthcheck";

const HEALTHY_MESSAGE: &str = "OK";

/// Health of a point sink, as observed by a probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HealthStatus {
    /// The sink accepted the probe point.
    Healthy,

    /// The sink rejected the probe point.
    Unhealthy {
        /// Description of the failure reported by the sink.
        reason: String,
    },
}

impl HealthStatus {
    /// Returns `true` if the sink is healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Returns the HTTP status code representing this status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the message describing this status.
    pub fn message(&self) -> &str {
        match self {
            HealthStatus::Healthy => HEALTHY_MESSAGE,
            HealthStatus::Unhealthy { reason } => reason.as_str(),
        }
    }

    /// Consumes the status, returning the status code and message.
    pub fn into_parts(self) -> (StatusCode, String) {
        let status = self.status_code();
        match self {
            HealthStatus::Healthy => (status, HEALTHY_MESSAGE.to_string()),
            HealthStatus::Unhealthy { reason } => (status, reason),
        }
    }
}

/// Probes the sink by sending a single synthetic point.
///
/// The point is named [`HEALTH_CHECK_METRIC`], has a value of zero, the current time (in seconds), no source, and a
/// single `test:test` tag. Any failure from the sink is returned as [`HealthStatus::Unhealthy`].
pub async fn health_check<S>(sink: &S) -> HealthStatus
where
    S: PointSink + ?Sized,
{
    let tags = TagMap::from([("test".to_string(), "test".to_string())]);
    let point = MetricPoint {
        name: HEALTH_CHECK_METRIC,
        value: 0.0,
        timestamp: Utc::now().timestamp(),
        source: "",
        tags: &tags,
    };

    match sink.send_metric(point).await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => HealthStatus::Unhealthy {
            reason: format!("{:#}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FailingSink, RecordingSink};

    #[tokio::test]
    async fn healthy_sink() {
        let sink = RecordingSink::new();

        let status = health_check(&sink).await;
        assert!(status.is_healthy());
        assert_eq!(status.clone().into_parts(), (StatusCode::OK, "OK".to_string()));

        let points = sink.points();
        assert_eq!(points.len(), 1);

        let point = &points[0];
        assert_eq!(point.name, HEALTH_CHECK_METRIC);
        assert_eq!(point.value, 0.0);
        assert_eq!(point.source, "");
        assert_eq!(point.tags, TagMap::from([("test".to_string(), "test".to_string())]));
        assert!(point.timestamp > 0);
    }

    #[tokio::test]
    async fn unhealthy_sink() {
        let sink = FailingSink::new("proxy connection refused");

        let status = health_check(&sink).await;
        assert_eq!(status.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status.message(), "proxy connection refused");
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn probe_through_trait_object() {
        let sink: Box<dyn PointSink> = Box::new(FailingSink::new("down"));

        let (status, message) = health_check(&*sink).await.into_parts();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message, "down");
    }
}
