use std::time::Duration;

utils::configurable_constants! {
    /// How often the non-interactive writer scans its trackers.
    ///
    /// Use the environment variable `XFER_PROGRESS_POLL_INTERVAL` to set this value (debug builds only).
    ref PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
}
