use metrics::{counter, Counter};

const POINTS_SENT: &str = "promgate_writer_points_sent_total";
const SEND_ERRORS: &str = "promgate_writer_send_errors_total";

/// Counters tracking the outcome of point submissions.
///
/// Handles are registered once, against whichever recorder is installed when the writer is built.
#[derive(Clone)]
pub(crate) struct Telemetry {
    points_sent: Counter,
    send_errors: Counter,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            points_sent: counter!(POINTS_SENT),
            send_errors: counter!(SEND_ERRORS),
        }
    }

    #[cfg(test)]
    pub fn points_sent_name() -> &'static str {
        POINTS_SENT
    }

    #[cfg(test)]
    pub fn send_errors_name() -> &'static str {
        SEND_ERRORS
    }

    pub fn record_sent(&self) {
        self.points_sent.increment(1);
    }

    pub fn record_error(&self) {
        self.send_errors.increment(1);
    }
}
