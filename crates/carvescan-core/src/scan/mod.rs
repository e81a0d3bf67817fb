/// Scan coordinators — sequential, cancellable drives of the detection
/// capability over a project.
///
/// Two tiers, each single-threaded on its own worker:
/// - [`files::FileScanCoordinator`] — a batch of input file paths,
///   detection per file, byte-weighted overall progress.
/// - [`streams::StreamScanCoordinator`] — one already-detected file,
///   walking data blocks then codec streams, one result per scanned
///   unit.
///
/// Both report through bounded crossbeam channels the host drains; the
/// event enums are lightweight, the actual structure lands in the shared
/// [`LiveProject`](crate::model::LiveProject).
pub mod files;
pub mod progress;
pub mod streams;

pub use files::{CurrentFile, FileScanCoordinator, FileScanEvent};
pub use streams::{
    FileScanResult, ScanPosition, StreamScanConfig, StreamScanCoordinator, StreamScanEvent,
    Verdict, WalkObserver,
};

/// Capacity of each coordinator's event channel.
///
/// A host draining once per UI frame has tens of seconds of headroom at
/// the coordinators' emission rates; if it falls behind, the worker
/// blocks on `send` briefly rather than queueing unbounded events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;
