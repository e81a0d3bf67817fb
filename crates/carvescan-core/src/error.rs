/// Error type shared across the scan coordinators.
use crate::model::FileId;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the orchestration core.
///
/// Cancellation is deliberately not represented here: a cancelled run
/// completes with a `cancelled` flag on its completion event, never an
/// error. `Busy` is the fail-fast answer to starting a scan while one is
/// already in flight.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    Busy,

    #[error("file {0:?} is not part of the project")]
    UnknownFile(FileId),

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The detection capability failed on a unit of work. Aborts the
    /// current batch; the payload is opaque to the core.
    #[error("detector failed on {unit}")]
    Detector {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    /// A scan task panicked. The panic is contained on the worker thread
    /// so the completion event is still delivered.
    #[error("scan task panicked: {0}")]
    Panicked(String),
}
