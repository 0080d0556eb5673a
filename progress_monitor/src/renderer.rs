use std::io::IsTerminal;
use std::ops::Deref;

use crate::output::UnitsFormatter;
use crate::{NoOpProgressWriter, ProgressWriter, SimpleProgressWriter};

/// Which renderer to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// One line per finished or failed transfer plus a summary.
    NonInteractive,
    /// No progress output at all.
    Disabled,
}

impl RenderMode {
    pub fn select(no_progress: bool) -> Self {
        if no_progress {
            RenderMode::Disabled
        } else {
            RenderMode::NonInteractive
        }
    }
}

/// The closed set of renderers, picked once at construction.  Derefs to the shared
/// `ProgressWriter` capability.
pub enum ProgressRenderer {
    NonInteractive(SimpleProgressWriter),
    Disabled(NoOpProgressWriter),
}

impl ProgressRenderer {
    /// Glyph colouring follows whether standard output is a terminal.
    pub fn new(mode: RenderMode, formatter: UnitsFormatter) -> Self {
        match mode {
            RenderMode::NonInteractive => {
                let decorate = std::io::stdout().is_terminal();
                ProgressRenderer::NonInteractive(SimpleProgressWriter::new(formatter).with_decoration(decorate))
            },
            RenderMode::Disabled => ProgressRenderer::Disabled(NoOpProgressWriter),
        }
    }

    pub fn mode(&self) -> RenderMode {
        match self {
            ProgressRenderer::NonInteractive(_) => RenderMode::NonInteractive,
            ProgressRenderer::Disabled(_) => RenderMode::Disabled,
        }
    }
}

impl Deref for ProgressRenderer {
    type Target = dyn ProgressWriter;

    fn deref(&self) -> &Self::Target {
        match self {
            ProgressRenderer::NonInteractive(w) => w as &dyn ProgressWriter,
            ProgressRenderer::Disabled(w) => w as &dyn ProgressWriter,
        }
    }
}
