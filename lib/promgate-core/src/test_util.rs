//! Testing-related helpers.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering::SeqCst},
        Mutex,
    },
};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::{
    sink::{MetricPoint, PointSink, TagMap},
    GenericError,
};

/// An owned copy of a point received by a test sink.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPoint {
    pub name: String,
    pub value: f64,
    pub timestamp: i64,
    pub source: String,
    pub tags: TagMap,
}

impl From<MetricPoint<'_>> for RecordedPoint {
    fn from(point: MetricPoint<'_>) -> Self {
        Self {
            name: point.name.to_string(),
            value: point.value,
            timestamp: point.timestamp,
            source: point.source.to_string(),
            tags: point.tags.clone(),
        }
    }
}

/// A sink that stores every point it accepts in memory.
///
/// Points whose metric name was registered via [`failing_for`][Self::failing_for] are rejected instead, which allows
/// exercising partial failures within a single request.
#[derive(Default)]
pub struct RecordingSink {
    points: Mutex<Vec<RecordedPoint>>,
    attempts: AtomicUsize,
    failing_names: HashSet<String>,
}

impl RecordingSink {
    /// Creates a sink that accepts every point.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects points with any of the given metric names.
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            failing_names: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Returns the points accepted so far, in the order they were sent.
    pub fn points(&self) -> Vec<RecordedPoint> {
        self.points.lock().unwrap().clone()
    }

    /// Returns the number of sends attempted so far, whether they succeeded or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(SeqCst)
    }
}

#[async_trait]
impl PointSink for RecordingSink {
    async fn send_metric(&self, point: MetricPoint<'_>) -> Result<(), GenericError> {
        self.attempts.fetch_add(1, SeqCst);

        if self.failing_names.contains(point.name) {
            return Err(anyhow!("point rejected: {}", point.name));
        }

        self.points.lock().unwrap().push(point.into());
        Ok(())
    }
}

/// A sink that rejects every point with the same error.
pub struct FailingSink {
    reason: String,
}

impl FailingSink {
    /// Creates a sink that always fails with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl PointSink for FailingSink {
    async fn send_metric(&self, _: MetricPoint<'_>) -> Result<(), GenericError> {
        Err(anyhow!("{}", self.reason))
    }
}
