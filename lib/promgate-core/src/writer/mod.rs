//! Translation of remote-write series into metric points.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument::WithSubscriber as _, warn, Dispatch};

use crate::{
    health::{health_check, HealthStatus},
    model::{TimeSeries, WriteRequest, METRIC_NAME_LABEL},
    sink::{MetricPoint, PointSink, TagMap},
};

mod config;
pub use self::config::WriterConfiguration;

mod telemetry;
use self::telemetry::Telemetry;

/// Label whose value becomes the source of a point.
const SOURCE_LABEL: &str = "instance";

/// Outcome of writing a single request.
///
/// Samples skipped for being NaN are not counted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WriteSummary {
    /// Number of points the sink accepted.
    pub points_sent: usize,

    /// Number of points the sink failed to accept.
    pub points_failed: usize,
}

/// Writes remote-write requests to a point sink.
///
/// Every non-NaN sample of every series becomes one call to the sink. The metric name is built from the series'
/// `__name__` label, the remaining labels become tags, and the `instance` label, if present, becomes the source of the
/// point. Static tags from the configuration are applied last, and win over same-named tags derived from labels.
///
/// Failures from the sink are logged and never abort the rest of the request.
///
/// The writer holds no mutable state, so a single instance can serve any number of concurrent writes.
pub struct MetricWriter<S> {
    sink: S,
    prefix: String,
    static_tags: TagMap,
    convert_paths: bool,
    dispatch: Option<Dispatch>,
    telemetry: Telemetry,
}

impl<S> MetricWriter<S>
where
    S: PointSink,
{
    /// Creates a new `MetricWriter` that sends points to the given sink.
    ///
    /// Log events go to whichever subscriber is current for the calling task.
    pub fn new(sink: S, config: WriterConfiguration) -> Self {
        Self::build(sink, config, None)
    }

    /// Creates a new `MetricWriter` whose log events, including those emitted while it is built, all go to
    /// `dispatch`.
    pub fn with_dispatch(sink: S, config: WriterConfiguration, dispatch: Dispatch) -> Self {
        tracing::dispatcher::with_default(&dispatch, || Self::build(sink, config, Some(dispatch.clone())))
    }

    /// Static tags with an empty value, or named `instance`, can never appear on a point and are discarded here.
    fn build(sink: S, config: WriterConfiguration, dispatch: Option<Dispatch>) -> Self {
        let WriterConfiguration {
            prefix,
            tags,
            convert_paths,
        } = config;

        let static_tags = tags
            .into_iter()
            .filter(|(name, value)| {
                if value.is_empty() {
                    warn!(tag = %name, "Ignoring static tag with empty value.");
                    false
                } else if name == SOURCE_LABEL {
                    warn!(tag = %name, "Ignoring static tag reserved for the point source.");
                    false
                } else {
                    true
                }
            })
            .collect();

        Self {
            sink,
            prefix,
            static_tags,
            convert_paths,
            dispatch,
            telemetry: Telemetry::new(),
        }
    }

    /// Returns a reference to the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Writes every series in the request.
    pub async fn write(&self, request: &WriteRequest) -> WriteSummary {
        self.dispatched(self.write_series(request, None)).await
    }

    /// Writes every series in the request, stopping early if `token` is cancelled.
    ///
    /// Cancellation is only observed between series: once a series has started, all of its samples are written.
    pub async fn write_until_cancelled(&self, request: &WriteRequest, token: &CancellationToken) -> WriteSummary {
        self.dispatched(self.write_series(request, Some(token))).await
    }

    /// Checks that the sink is able to accept points.
    pub async fn health_check(&self) -> HealthStatus {
        self.dispatched(health_check(&self.sink)).await
    }

    async fn dispatched<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        match &self.dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }

    async fn write_series(&self, request: &WriteRequest, token: Option<&CancellationToken>) -> WriteSummary {
        let mut summary = WriteSummary::default();

        for series in &request.timeseries {
            if token.is_some_and(CancellationToken::is_cancelled) {
                debug!(
                    points_sent = summary.points_sent,
                    points_failed = summary.points_failed,
                    "Write cancelled. Skipping remaining series."
                );
                break;
            }

            self.write_single_series(series, &mut summary).await;
        }

        summary
    }

    async fn write_single_series(&self, series: &TimeSeries, summary: &mut WriteSummary) {
        let (metric_name, source, tags) = self.build_point_context(series);

        for sample in &series.samples {
            // Prometheus sends NaN to signal missing data.
            if sample.value.is_nan() {
                continue;
            }

            let point = MetricPoint {
                name: &metric_name,
                value: sample.value,
                timestamp: sample.timestamp,
                source: &source,
                tags: &tags,
            };

            match self.sink.send_metric(point).await {
                Ok(()) => {
                    summary.points_sent += 1;
                    self.telemetry.record_sent();
                }
                Err(e) => {
                    summary.points_failed += 1;
                    self.telemetry.record_error();
                    warn!(%metric_name, error = %e, "Cannot send metric. Skipping to next.");
                }
            }
        }
    }

    /// Builds the metric name, source, and final tag set shared by every sample of the series.
    fn build_point_context(&self, series: &TimeSeries) -> (String, String, TagMap) {
        let mut base_name = "";
        let mut tags = TagMap::new();

        for label in &series.labels {
            if label.name == METRIC_NAME_LABEL {
                base_name = &label.value;
            } else {
                tags.insert(self.build_tag_name(&label.name), label.value.clone());
            }
        }

        let metric_name = self.build_metric_name(base_name);

        tags.retain(|name, value| {
            if value.is_empty() {
                debug!(tag = %name, metric_name = %metric_name, "Dropping empty tag.");
                false
            } else {
                true
            }
        });

        let source = tags
            .remove(SOURCE_LABEL)
            .map(|source| escape_source(&source))
            .unwrap_or_default();

        tags.extend(self.static_tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        (metric_name, source, tags)
    }

    fn build_metric_name(&self, base_name: &str) -> String {
        let name = if self.prefix.is_empty() {
            base_name.to_string()
        } else {
            format!("{}_{}", self.prefix, base_name)
        };

        if self.convert_paths {
            name.replace('_', ".")
        } else {
            name
        }
    }

    fn build_tag_name(&self, name: &str) -> String {
        if self.convert_paths {
            name.replace('_', ".")
        } else {
            name.to_string()
        }
    }
}

/// Escapes characters the backend does not accept in source identifiers.
fn escape_source(source: &str) -> String {
    let mut escaped = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '*' => escaped.push('-'),
            c => escaped.push(c),
        }
    }
    escaped
}
