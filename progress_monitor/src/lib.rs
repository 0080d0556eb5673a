//! Non-interactive progress reporting for concurrent transfers.
//!
//! Transfers are tracked through [`WorkItem`] handles.  [`SimpleProgressWriter`] polls
//! them in the background and writes one line when each finishes or fails, then a
//! summary when stopped, which keeps the output readable in logs, CI and pipes.

mod constants;
mod error;
mod no_op;
pub mod options;
mod output;
mod registry;
mod renderer;
mod simple;
mod work_item;
mod writer;

pub use constants::PROGRESS_POLL_INTERVAL;
pub use error::{ProgressMonitorError, Result};
pub use no_op::NoOpProgressWriter;
pub use output::{default_formatter, LineBuffer, UnitsFormatter};
pub use renderer::{ProgressRenderer, RenderMode};
pub use simple::SimpleProgressWriter;
pub use work_item::{Tracker, WorkItem};
pub use writer::ProgressWriter;
