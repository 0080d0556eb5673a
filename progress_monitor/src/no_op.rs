use std::io::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::{ProgressWriter, WorkItem};

/// Accepts every call and writes nothing.  Used when progress output is turned off.
#[derive(Debug, Default)]
pub struct NoOpProgressWriter;

impl ProgressWriter for NoOpProgressWriter {
    fn append_tracker(&self, _handle: Arc<dyn WorkItem>, _total: u64, _label: &str) {}

    fn length(&self) -> usize {
        0
    }

    fn length_active(&self) -> usize {
        0
    }

    fn length_done(&self) -> usize {
        0
    }

    fn length_in_queue(&self) -> usize {
        0
    }

    fn is_render_in_progress(&self) -> bool {
        false
    }

    fn log(&self, _message: &str) {}

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn set_num_trackers_expected(&self, _n_trackers: usize) {}

    fn set_output_writer(&self, _writer: Box<dyn Write + Send>) {}
}
