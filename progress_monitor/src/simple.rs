use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::constants::PROGRESS_POLL_INTERVAL;
use crate::error::{ProgressMonitorError, Result};
use crate::output::{default_formatter, LineFormatter, OutputSink, Summary, UnitsFormatter};
use crate::registry::{TrackerRegistry, Transition};
use crate::{ProgressWriter, WorkItem};

/// Lifecycle of the writer.  Transitions only move forward; `Idle -> Stopped` is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    Rendering,
    Stopped,
}

/// Everything guarded by the single monitor lock.  Registry, aggregates and lifecycle
/// change together under it, so a transition and its counters are updated atomically.
struct MonitorState {
    lifecycle: LifecycleState,
    registry: TrackerRegistry,
    overall_start: Option<Instant>,
    completed: u64,
    total_bytes: u64,
    expected: usize,
    lines: LineFormatter,
    sink: OutputSink,
}

struct Shared {
    state: Mutex<MonitorState>,
    // Signalled by `stop` so the poller does not sleep out its interval.
    wakeup: Condvar,
}

impl Shared {
    /// One scan-and-report pass.  Lines are written while the lock is held; emission is a
    /// local buffered write, so registration waits at most one scan plus its lines.
    fn tick(&self, state: &mut MonitorState) {
        for transition in state.registry.scan(Instant::now()) {
            let line = match transition {
                Transition::Done { label, total, elapsed } => {
                    state.completed += 1;
                    state.total_bytes += total;
                    state.lines.success_line(&label, total, elapsed)
                },
                Transition::Errored { label, elapsed } => state.lines.failure_line(&label, elapsed),
            };
            state.sink.write_line(&line);
        }
    }

    fn poll_loop(&self, interval: Duration) {
        let mut state = self.state.lock();

        while state.lifecycle != LifecycleState::Stopped {
            self.tick(&mut state);

            // The wait releases the lock until the deadline or until `stop` notifies.
            let deadline = Instant::now() + interval;
            while state.lifecycle != LifecycleState::Stopped {
                if self.wakeup.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
        }

        debug!("Progress poller exiting.");
    }
}

/// Non-interactive progress writer: reports each transfer once when it finishes or fails
/// and prints a summary when stopped, instead of redrawing bars.
///
/// ```no_run
/// use progress_monitor::{ProgressWriter, SimpleProgressWriter, Tracker};
///
/// # fn main() -> progress_monitor::Result<()> {
/// let writer = SimpleProgressWriter::default();
/// let tracker = Tracker::new(1024);
/// writer.append_tracker(tracker.clone(), 1024, "model.safetensors");
/// writer.start()?;
/// tracker.increment(1024);
/// writer.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct SimpleProgressWriter {
    shared: Arc<Shared>,
    poller: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl Default for SimpleProgressWriter {
    fn default() -> Self {
        Self::new(default_formatter())
    }
}

impl SimpleProgressWriter {
    /// Writes to standard output, with coloured glyphs and the configured poll interval.
    pub fn new(formatter: UnitsFormatter) -> Self {
        let state = MonitorState {
            lifecycle: LifecycleState::Idle,
            registry: TrackerRegistry::default(),
            overall_start: None,
            completed: 0,
            total_bytes: 0,
            expected: 0,
            lines: LineFormatter::new(formatter, true),
            sink: OutputSink::stdout(),
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                wakeup: Condvar::new(),
            }),
            poller: Mutex::new(None),
            poll_interval: *PROGRESS_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Turns the glyph colouring on or off.
    pub fn with_decoration(self, decorate: bool) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.lines = LineFormatter::new(state.lines.units(), decorate);
        }
        self
    }

    pub fn with_output_writer(self, writer: Box<dyn Write + Send>) -> Self {
        self.set_output_writer(writer);
        self
    }

    #[cfg(test)]
    fn poll_once(&self) {
        let mut state = self.shared.state.lock();
        self.shared.tick(&mut state);
    }
}

impl ProgressWriter for SimpleProgressWriter {
    fn append_tracker(&self, handle: Arc<dyn WorkItem>, total: u64, label: &str) {
        self.shared.state.lock().registry.register(handle, total, label.into());
    }

    fn length(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    fn length_active(&self) -> usize {
        self.shared.state.lock().registry.len_active()
    }

    fn length_done(&self) -> usize {
        self.shared.state.lock().registry.len_done()
    }

    fn length_in_queue(&self) -> usize {
        self.shared.state.lock().registry.len_in_queue()
    }

    fn is_render_in_progress(&self) -> bool {
        self.shared.state.lock().lifecycle == LifecycleState::Rendering
    }

    fn log(&self, message: &str) {
        self.shared.state.lock().sink.write_line(message);
    }

    fn start(&self) -> Result<()> {
        let mut poller = self.poller.lock();

        {
            let mut state = self.shared.state.lock();
            if state.lifecycle != LifecycleState::Idle {
                warn!("Progress writer start requested while {:?}; ignoring.", state.lifecycle);
                return Ok(());
            }
            state.lifecycle = LifecycleState::Rendering;
            state.overall_start = Some(Instant::now());
        }

        let shared = self.shared.clone();
        let poll_interval = self.poll_interval;
        let spawned = std::thread::Builder::new()
            .name("progress-poller".to_owned())
            .spawn(move || shared.poll_loop(poll_interval));

        match spawned {
            Ok(handle) => {
                debug!("Progress poller started with interval {poll_interval:?}.");
                *poller = Some(handle);
                Ok(())
            },
            Err(e) => {
                let mut state = self.shared.state.lock();
                state.lifecycle = LifecycleState::Idle;
                state.overall_start = None;
                Err(ProgressMonitorError::from(e))
            },
        }
    }

    fn stop(&self) -> Result<()> {
        let mut poller = self.poller.lock();

        let was_rendering = {
            let mut state = self.shared.state.lock();
            let previous = state.lifecycle;
            if previous == LifecycleState::Stopped {
                return Ok(());
            }
            state.lifecycle = LifecycleState::Stopped;
            previous == LifecycleState::Rendering
        };
        self.shared.wakeup.notify_all();

        // The poller must be gone before failures are counted, or a failure it marks
        // concurrently could be missed by the summary.
        let joined = match poller.take() {
            Some(handle) => handle.join().map_err(|_| ProgressMonitorError::PollerPanic),
            None => Ok(()),
        };

        if was_rendering {
            let mut state = self.shared.state.lock();

            // Pick up anything that finished after the poller's last tick.
            self.shared.tick(&mut state);

            let summary = Summary {
                completed: state.completed,
                failed: state.registry.len_errored() as u64,
                total_bytes: state.total_bytes,
                elapsed: state.overall_start.map(|t| t.elapsed()).unwrap_or_default(),
            };
            debug!(?summary, expected = state.expected, "Progress writer stopped.");

            if let Some(line) = state.lines.summary_line(&summary) {
                state.sink.write_line(&line);
            }
        }

        joined
    }

    fn set_num_trackers_expected(&self, n_trackers: usize) {
        let mut state = self.shared.state.lock();
        state.expected = n_trackers;
        if n_trackers > 0 {
            let line = state.lines.expected_line(n_trackers);
            state.sink.write_line(&line);
        }
    }

    fn set_output_writer(&self, writer: Box<dyn Write + Send>) {
        self.shared.state.lock().sink = OutputSink::new(writer);
    }
}

impl Drop for SimpleProgressWriter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::options::{SortBy, Style, TrackerPosition};
    use crate::{LineBuffer, Tracker};

    // Long enough that only explicit `poll_once` calls and the final scan in `stop` run.
    const QUIET: Duration = Duration::from_secs(3600);

    fn writer(buffer: &LineBuffer) -> SimpleProgressWriter {
        SimpleProgressWriter::default()
            .with_poll_interval(QUIET)
            .with_decoration(false)
            .with_output_writer(Box::new(buffer.clone()))
    }

    fn count_prefixed(lines: &[String], prefix: &str) -> usize {
        lines.iter().filter(|l| l.starts_with(prefix)).count()
    }

    #[test]
    fn test_transition_lines_emitted_once() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        let a = Tracker::new(100);
        let b = Tracker::new(0);
        w.append_tracker(a.clone(), 100, "a");
        w.append_tracker(b.clone(), 0, "b");
        w.start().unwrap();

        a.increment(100);
        b.mark_as_errored();
        w.poll_once();
        w.poll_once();
        w.poll_once();

        let lines = buffer.lines();
        assert_eq!(count_prefixed(&lines, "✓ a (100 B in "), 1);
        assert_eq!(count_prefixed(&lines, "✗ b (failed after "), 1);
        assert_eq!(w.length_done(), 1);
        assert_eq!(w.length_active(), 0);

        w.stop().unwrap();
        assert_eq!(count_prefixed(&buffer.lines(), "✓ a"), 1);
    }

    #[test]
    fn test_stop_reports_transitions_missed_by_last_tick() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        let trackers: Vec<_> = (0..5).map(|_| Tracker::new(10)).collect();
        for (i, t) in trackers.iter().enumerate() {
            w.append_tracker(t.clone(), 10, &format!("file{i}"));
        }
        w.start().unwrap();

        for t in &trackers[..3] {
            t.increment(10);
        }
        for t in &trackers[3..] {
            t.mark_as_errored();
        }
        w.stop().unwrap();

        let lines = buffer.lines();
        assert_eq!(count_prefixed(&lines, "✓ "), 3);
        assert_eq!(count_prefixed(&lines, "✗ "), 2);
        let summary = lines.iter().find(|l| l.starts_with("Download complete")).unwrap();
        assert!(summary.starts_with("Download complete: 3 succeeded, 2 failed in "), "{summary}");
        assert!(summary.contains("(30 B total, "), "{summary}");
        // The summary is preceded by a blank line and comes last.
        assert_eq!(lines[lines.len() - 2], "");
        assert!(lines.last().unwrap().starts_with("Download complete"));
    }

    #[test]
    fn test_double_stop_emits_one_summary() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        let a = Tracker::new(1);
        w.append_tracker(a.clone(), 1, "a");
        w.start().unwrap();
        a.increment(1);

        w.stop().unwrap();
        w.stop().unwrap();
        drop(w);

        assert_eq!(count_prefixed(&buffer.lines(), "Download complete"), 1);
    }

    #[test]
    fn test_pending_items_are_not_reported() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        let a = Tracker::new(100);
        let c = Tracker::new(0);
        w.append_tracker(a.clone(), 100, "a");
        w.append_tracker(c.clone(), 0, "c");
        w.start().unwrap();
        a.increment(100);
        c.set_value(7);
        w.stop().unwrap();

        let lines = buffer.lines();
        assert!(!lines.iter().any(|l| l.contains(" c ")));
        let summary = lines.last().unwrap();
        assert!(summary.starts_with("Download complete: 1 succeeded in "), "{summary}");
        assert!(!summary.contains("failed"));
    }

    #[test]
    fn test_no_summary_without_terminal_items() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        w.start().unwrap();
        w.stop().unwrap();
        assert!(buffer.lines().is_empty());

        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        w.append_tracker(Tracker::new(5), 5, "never");
        w.start().unwrap();
        w.stop().unwrap();
        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn test_stop_before_start() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        let a = Tracker::new(1);
        w.append_tracker(a.clone(), 1, "a");
        a.increment(1);

        w.stop().unwrap();
        assert!(buffer.lines().is_empty());
        assert!(!w.is_render_in_progress());

        // A stopped writer never starts again.
        w.start().unwrap();
        assert!(!w.is_render_in_progress());
        assert_eq!(w.length_done(), 0);
    }

    #[test]
    fn test_second_start_is_ignored() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        w.start().unwrap();
        let first_start = w.shared.state.lock().overall_start;
        std::thread::sleep(Duration::from_millis(5));
        w.start().unwrap();
        assert_eq!(w.shared.state.lock().overall_start, first_start);
        assert!(w.is_render_in_progress());
        w.stop().unwrap();
        assert!(!w.is_render_in_progress());
    }

    #[test]
    fn test_poller_reports_without_explicit_polls() {
        let buffer = LineBuffer::default();
        let w = SimpleProgressWriter::default()
            .with_poll_interval(Duration::from_millis(5))
            .with_decoration(false)
            .with_output_writer(Box::new(buffer.clone()));
        let a = Tracker::new(8);
        w.append_tracker(a.clone(), 8, "a");
        w.start().unwrap();
        a.increment(8);

        let deadline = Instant::now() + Duration::from_secs(5);
        while w.length_done() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(w.length_done(), 1);
        assert_eq!(count_prefixed(&buffer.lines(), "✓ a"), 1);
        w.stop().unwrap();
    }

    #[test]
    fn test_stop_wakes_sleeping_poller() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        w.start().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let begin = Instant::now();
        w.stop().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_expected_count_and_log_lines() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        w.set_num_trackers_expected(0);
        w.set_num_trackers_expected(3);
        w.log("resolving peers");
        assert_eq!(w.shared.state.lock().expected, 3);
        assert_eq!(buffer.lines(), vec!["Starting download of 3 file(s)...", "resolving peers"]);
    }

    #[test]
    fn test_in_queue_counts() {
        let buffer = LineBuffer::default();
        let w = writer(&buffer);
        let a = Tracker::new(10);
        let b = Tracker::new(10);
        w.append_trackers(vec![
            (a.clone() as Arc<dyn WorkItem>, 10, "a".to_owned()),
            (b.clone() as Arc<dyn WorkItem>, 10, "b".to_owned()),
        ]);
        assert_eq!(w.length(), 2);
        assert_eq!(w.length_in_queue(), 2);
        a.increment(1);
        assert_eq!(w.length_in_queue(), 1);
        assert_eq!(w.length_active(), 2);
    }

    #[test]
    fn test_display_knobs_do_not_change_output() {
        let run = |configure: bool| {
            let buffer = LineBuffer::default();
            let w = SimpleProgressWriter::new(Arc::new(|n: u64| format!("{n}b")))
                .with_poll_interval(QUIET)
                .with_decoration(false)
                .with_output_writer(Box::new(buffer.clone()));
            if configure {
                w.set_auto_stop(true);
                w.set_message_length(5);
                w.set_message_width(5);
                w.set_pinned_messages(&["pinned".to_owned()]);
                w.set_sort_by(SortBy::PercentDsc);
                w.set_style(Style {
                    name: "blocks".to_owned(),
                    ..Default::default()
                });
                w.set_tracker_length(3);
                w.set_tracker_position(TrackerPosition::Left);
                w.set_update_frequency(Duration::from_millis(1));
                w.show_eta(true);
                w.show_overall(true);
                w.show_overall_tracker(true);
                w.show_percentage(true);
                w.show_pinned(true);
                w.show_time(true);
                w.show_tracker(true);
                w.show_value(true);
            }
            let a = Tracker::new(0);
            w.append_tracker(a.clone(), 0, "a-long-label");
            w.start().unwrap();
            a.mark_as_errored();
            w.stop().unwrap();
            assert_eq!(w.style(), Style::default());
            buffer
                .lines()
                .into_iter()
                .map(|l| l.split(" (failed after").next().unwrap().to_owned())
                .map(|l| l.split(" in ").next().unwrap().to_owned())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(false), run(true));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_poller_survives_failing_output() {
        let buffer = LineBuffer::default();
        let w = SimpleProgressWriter::default()
            .with_poll_interval(Duration::from_millis(5))
            .with_decoration(false)
            .with_output_writer(Box::new(ClosedPipe));
        let a = Tracker::new(4);
        let b = Tracker::new(4);
        w.append_tracker(a.clone(), 4, "a");
        w.append_tracker(b.clone(), 4, "b");
        w.start().unwrap();

        let wait_for_done = |n: usize| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while w.length_done() < n && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            assert_eq!(w.length_done(), n);
        };

        // The line for `a` is lost, but the transition is still recorded.
        a.increment(4);
        wait_for_done(1);
        assert!(w.is_render_in_progress());

        w.set_output_writer(Box::new(buffer.clone()));
        b.increment(4);
        wait_for_done(2);
        w.stop().unwrap();

        let lines = buffer.lines();
        assert_eq!(count_prefixed(&lines, "✓ a"), 0);
        assert_eq!(count_prefixed(&lines, "✓ b (4 B in "), 1);
        let summary = lines.last().unwrap();
        assert!(summary.starts_with("Download complete: 2 succeeded in "), "{summary}");
    }

    #[test]
    fn test_output_writer_can_be_swapped() {
        let first = LineBuffer::default();
        let second = LineBuffer::default();
        let w = writer(&first);
        w.log("one");
        w.set_output_writer(Box::new(second.clone()));
        w.log("two");
        assert_eq!(first.lines(), vec!["one"]);
        assert_eq!(second.lines(), vec!["two"]);
    }
}
