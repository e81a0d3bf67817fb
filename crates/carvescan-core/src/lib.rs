/// CarveScan Core — scan orchestration for a media-carving forensics
/// tool.
///
/// The binary format detection itself (container recognition, block
/// boundary discovery, frame parsing) is supplied by implementors of the
/// [`detect`] traits; this crate coordinates it: asynchronous,
/// cancellable, progress-reporting scans over many files, blocks, and
/// codec streams, feeding a shared live project any frontend can render.
///
/// # Modules
///
/// - [`model`] — Project, input files, data blocks, codec streams, and
///   the parsed-result tree.
/// - [`detect`] — Capability traits the detection framework implements.
/// - [`worker`] — Single-task background worker with cooperative
///   cancellation and backoff-based stopping.
/// - [`scan`] — The batch file scan and the per-file block/stream scan.
/// - [`overview`] — Sequential cross-file drive building the keyframe
///   thumbnail overview.
/// - [`report`] — JSON export of the discovered structure.
pub mod detect;
pub mod error;
pub mod model;
pub mod overview;
pub mod report;
pub mod scan;
pub mod worker;

pub use error::ScanError;
