use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::options::{SortBy, Style, TrackerPosition};
use crate::WorkItem;

/// The capability shared by every progress renderer.
///
/// The display knobs at the bottom exist so that an interactive renderer and the
/// non-interactive one can be swapped without touching callers.  Renderers that do not
/// draw bars accept them and must not let them change their output.
pub trait ProgressWriter: Send + Sync {
    /// Starts observing `handle`.  `total` may be zero when the size is unknown; `label`
    /// is captured now and never refreshed.
    fn append_tracker(&self, handle: Arc<dyn WorkItem>, total: u64, label: &str);

    fn append_trackers(&self, trackers: Vec<(Arc<dyn WorkItem>, u64, String)>) {
        for (handle, total, label) in trackers {
            self.append_tracker(handle, total, &label);
        }
    }

    /// Number of registered trackers.
    fn length(&self) -> usize;

    /// Trackers neither done nor errored.
    fn length_active(&self) -> usize;

    fn length_done(&self) -> usize;

    /// Active trackers that have not reported any progress yet.
    fn length_in_queue(&self) -> usize;

    fn is_render_in_progress(&self) -> bool;

    /// Writes a free-form line to the output.
    fn log(&self, message: &str);

    fn start(&self) -> Result<()>;

    /// Stops rendering and emits the summary.  Calling it again does nothing.
    fn stop(&self) -> Result<()>;

    fn set_num_trackers_expected(&self, n_trackers: usize);

    fn set_output_writer(&self, writer: Box<dyn Write + Send>);

    // Display-only knobs.

    fn set_auto_stop(&self, _auto_stop: bool) {}

    fn set_message_length(&self, _length: usize) {}

    fn set_message_width(&self, _width: usize) {}

    fn set_pinned_messages(&self, _messages: &[String]) {}

    fn set_sort_by(&self, _sort_by: SortBy) {}

    fn set_style(&self, _style: Style) {}

    fn set_tracker_length(&self, _length: usize) {}

    fn set_tracker_position(&self, _position: TrackerPosition) {}

    fn set_update_frequency(&self, _frequency: Duration) {}

    fn show_eta(&self, _show: bool) {}

    fn show_overall(&self, _show: bool) {}

    fn show_overall_tracker(&self, _show: bool) {}

    fn show_percentage(&self, _show: bool) {}

    fn show_pinned(&self, _show: bool) {}

    fn show_time(&self, _show: bool) {}

    fn show_tracker(&self, _show: bool) {}

    fn show_value(&self, _show: bool) {}

    fn style(&self) -> Style {
        Style::default()
    }
}
