//! Replication delay probe.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::metrics::{MetricsSink, Stat};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_msec() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Computes and publishes the end-to-end replication delay for a record
/// stamped with `start_time_msec` on the active server.
///
/// Non-positive start times occur for some commit records; those samples
/// are skipped without surfacing an error.
pub(crate) fn calculate_replication_delay(
    sink: &dyn MetricsSink,
    trace: bool,
    start_time_msec: i64,
) {
    if start_time_msec <= 0 {
        debug!(
            start_time_msec,
            "replication delay probe skipped: non-positive start time"
        );
        return;
    }

    let delay_msec = (now_msec() - start_time_msec).max(0);
    sink.set_stat(Stat::RedoReplDelay, delay_msec);

    if trace {
        debug!(delay_msec, "replication delay");
    }
}
