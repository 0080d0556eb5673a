use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressMonitorError {
    #[error("Failed to spawn progress poller thread: {0}")]
    PollerSpawn(#[from] std::io::Error),

    #[error("Progress poller thread panicked")]
    PollerPanic,
}

pub type Result<T> = std::result::Result<T, ProgressMonitorError>;
