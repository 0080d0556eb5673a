use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use parking_lot::Mutex;
use tracing::warn;

/// Turns a byte count into a short display string.  Must be pure; it is called while the
/// monitor lock is held.
pub type UnitsFormatter = Arc<dyn Fn(u64) -> String + Send + Sync>;

/// Binary-prefixed units (`KiB`, `MiB`, ...).
pub fn default_formatter() -> UnitsFormatter {
    Arc::new(utils::output_bytes)
}

const SUCCESS_GLYPH: &str = "✓";
const FAILURE_GLYPH: &str = "✗";

/// The line destination.  Write errors are never propagated: the first one is logged,
/// later ones are dropped silently until a new writer is installed.
pub(crate) struct OutputSink {
    writer: Box<dyn Write + Send>,
    write_failed: bool,
}

impl OutputSink {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            write_failed: false,
        }
    }

    pub fn write_line(&mut self, line: &str) {
        let result = writeln!(self.writer, "{line}").and_then(|_| self.writer.flush());

        if let Err(e) = result {
            if !self.write_failed {
                self.write_failed = true;
                warn!("Progress output write failed ({e}); further write errors will not be reported.");
            }
        }
    }
}

/// An in-memory line destination.  Clones share the same buffer, so one clone can be
/// handed to a writer and the other kept to read what was written.
#[derive(Clone, Debug, Default)]
pub struct LineBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LineBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for LineBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Everything needed to render the final summary line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub completed: u64,
    pub failed: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

/// Builds the text of each emitted line.
#[derive(Clone)]
pub(crate) struct LineFormatter {
    units: UnitsFormatter,
    decorate: bool,
}

impl LineFormatter {
    pub fn new(units: UnitsFormatter, decorate: bool) -> Self {
        Self { units, decorate }
    }

    pub fn units(&self) -> UnitsFormatter {
        self.units.clone()
    }

    pub fn success_line(&self, label: &str, total: u64, elapsed: Duration) -> String {
        let speed = match throughput(total, elapsed) {
            Some(rate) => format!(" at {}/s", (self.units)(rate)),
            None => String::new(),
        };

        format!(
            "{} {label} ({} in {}{speed})",
            self.glyph(SUCCESS_GLYPH, true),
            (self.units)(total),
            format_duration(round_to(elapsed, Duration::from_millis(1))),
        )
    }

    pub fn failure_line(&self, label: &str, elapsed: Duration) -> String {
        format!(
            "{} {label} (failed after {})",
            self.glyph(FAILURE_GLYPH, false),
            format_duration(round_to(elapsed, Duration::from_millis(1))),
        )
    }

    /// `None` when nothing reached a terminal state.
    pub fn summary_line(&self, summary: &Summary) -> Option<String> {
        if summary.completed == 0 && summary.failed == 0 {
            return None;
        }

        let mut line = format!("\nDownload complete: {} succeeded", summary.completed);
        if summary.failed > 0 {
            line.push_str(&format!(", {} failed", summary.failed));
        }
        line.push_str(&format!(" in {}", format_duration(round_to(summary.elapsed, Duration::from_secs(1)))));

        if summary.completed > 0 && summary.total_bytes > 0 {
            match throughput(summary.total_bytes, summary.elapsed) {
                Some(rate) => line.push_str(&format!(
                    " ({} total, {}/s avg)",
                    (self.units)(summary.total_bytes),
                    (self.units)(rate)
                )),
                None => line.push_str(&format!(" ({} total)", (self.units)(summary.total_bytes))),
            }
        }

        Some(line)
    }

    pub fn expected_line(&self, n_trackers: usize) -> String {
        format!("Starting download of {n_trackers} file(s)...")
    }

    fn glyph(&self, glyph: &str, success: bool) -> String {
        match (self.decorate, success) {
            (false, _) => glyph.to_owned(),
            (true, true) => glyph.green().to_string(),
            (true, false) => glyph.red().to_string(),
        }
    }
}

/// Bytes per second, or `None` if either input is zero.
pub(crate) fn throughput(n_bytes: u64, elapsed: Duration) -> Option<u64> {
    if n_bytes == 0 || elapsed.is_zero() {
        return None;
    }
    Some((n_bytes as f64 / elapsed.as_secs_f64()) as u64)
}

/// Rounds half away from zero to a multiple of `unit`.
pub(crate) fn round_to(d: Duration, unit: Duration) -> Duration {
    let unit = unit.as_nanos().max(1);
    let rounded = (d.as_nanos() + unit / 2) / unit * unit;
    u64::try_from(rounded).map(Duration::from_nanos).unwrap_or(Duration::MAX)
}

/// Compact duration text: `0s`, `850µs`, `50ms`, `1.5s`, `2m3s`, `1h0m12s`.
pub(crate) fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();

    if nanos == 0 {
        return "0s".to_owned();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", with_fraction(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", with_fraction(nanos, 1_000_000));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = format!("{}s", with_fraction(nanos % 60_000_000_000, 1_000_000_000));

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}")
    } else {
        seconds
    }
}

fn with_fraction(nanos: u128, unit: u128) -> String {
    let whole = nanos / unit;
    let frac = nanos % unit;
    if frac == 0 {
        return whole.to_string();
    }

    let digits = unit.ilog10() as usize;
    let frac = format!("{frac:0digits$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use std::io;

    use tracing_test::traced_test;

    use super::*;

    fn plain() -> LineFormatter {
        LineFormatter::new(default_formatter(), false)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(12)), "12ns");
        assert_eq!(format_duration(Duration::from_micros(850)), "850µs");
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.234s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_duration(Duration::from_secs(123)), "2m3s");
        assert_eq!(format_duration(Duration::from_secs(3612)), "1h0m12s");
    }

    #[test]
    fn test_round_to() {
        let ms = Duration::from_millis(1);
        assert_eq!(round_to(Duration::from_micros(50_400), ms), Duration::from_millis(50));
        assert_eq!(round_to(Duration::from_micros(50_500), ms), Duration::from_millis(51));
        assert_eq!(round_to(Duration::from_millis(499), Duration::from_secs(1)), Duration::ZERO);
        assert_eq!(round_to(Duration::from_millis(1500), Duration::from_secs(1)), Duration::from_secs(2));
    }

    #[test]
    fn test_throughput_guards_zero() {
        assert_eq!(throughput(0, Duration::from_secs(1)), None);
        assert_eq!(throughput(100, Duration::ZERO), None);
        assert_eq!(throughput(2048, Duration::from_secs(2)), Some(1024));
    }

    #[test]
    fn test_success_line() {
        let line = plain().success_line("a", 100, Duration::from_millis(500));
        assert_eq!(line, "✓ a (100 B in 500ms at 200 B/s)");

        let line = plain().success_line("empty", 0, Duration::from_millis(20));
        assert_eq!(line, "✓ empty (0 B in 20ms)");
    }

    #[test]
    fn test_failure_line() {
        let line = plain().failure_line("b", Duration::from_micros(30_200));
        assert_eq!(line, "✗ b (failed after 30ms)");
    }

    #[test]
    fn test_summary_line() {
        let f = plain();
        assert_eq!(f.summary_line(&Summary::default()), None);

        let s = Summary {
            completed: 1,
            failed: 1,
            total_bytes: 100,
            elapsed: Duration::from_millis(250),
        };
        assert_eq!(
            f.summary_line(&s).as_deref(),
            Some("\nDownload complete: 1 succeeded, 1 failed in 0s (100 B total, 400 B/s avg)")
        );

        let s = Summary {
            completed: 0,
            failed: 2,
            total_bytes: 0,
            elapsed: Duration::from_secs(3),
        };
        assert_eq!(f.summary_line(&s).as_deref(), Some("\nDownload complete: 0 succeeded, 2 failed in 3s"));

        let s = Summary {
            completed: 3,
            failed: 0,
            total_bytes: 4096,
            elapsed: Duration::ZERO,
        };
        assert_eq!(f.summary_line(&s).as_deref(), Some("\nDownload complete: 3 succeeded in 0s (4.00 KiB total)"));
    }

    #[test]
    fn test_custom_formatter_is_used() {
        let f = LineFormatter::new(Arc::new(|n: u64| format!("<{n}>")), false);
        let line = f.success_line("x", 10, Duration::from_secs(1));
        assert_eq!(line, "✓ x (<10> in 1s at <10>/s)");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn test_sink_failure_is_logged_once() {
        let mut sink = OutputSink::new(Box::new(BrokenPipe));
        sink.write_line("one");
        sink.write_line("two");
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Progress output write failed")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, saw {n}")),
            }
        });
    }
}
