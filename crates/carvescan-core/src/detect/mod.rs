/// Capability seam between the orchestration core and the detection
/// framework.
///
/// The genuinely hard work — recognizing container formats, finding data
/// block boundaries, parsing codec streams into result trees — is not
/// part of this crate. Implementors supply it behind two traits:
///
/// - [`FileScanner`]: one detection pass over one input file, reporting
///   byte progress and registering data blocks through a
///   [`DetectionContext`].
/// - [`UnitScanner`]: one result-producing scan of a single fragment
///   (a data block, or one codec stream within it).
use crate::error::ScanError;
use crate::model::{
    BlockId, CodecStream, DataBlock, DataBlockSpec, FileId, FragmentRef, InputFile, LiveProject,
    ResultNode,
};
use crate::worker::CancelToken;
use std::path::Path;

/// Runs the container/codec detectors over one input file.
///
/// Implementations may keep a cache shared across detectors;
/// [`FileScanner::clear_cache`] is called before each file's pass so
/// state never leaks between files.
pub trait FileScanner: Send + Sync {
    /// Sweep `path`, reporting raw byte positions through
    /// [`DetectionContext::report_bytes`] and registering every detected
    /// data block with [`DetectionContext::add_data_block`].
    ///
    /// A missing file should surface as an [`ScanError::Io`] with
    /// `NotFound`; the batch coordinator skips it and moves on. Any other
    /// error aborts the batch.
    fn detect(&self, path: &Path, ctx: &mut DetectionContext<'_>) -> Result<(), ScanError>;

    /// Drop state shared between files. Called once before each file.
    fn clear_cache(&self) {}
}

/// Per-file context handed to [`FileScanner::detect`]: the data-block
/// sink, the byte-progress reporter, and the cancellation flag.
pub struct DetectionContext<'a> {
    project: &'a LiveProject,
    file: FileId,
    file_length: u64,
    cancel: &'a CancelToken,
    on_bytes: &'a mut dyn FnMut(u64),
}

impl<'a> DetectionContext<'a> {
    pub(crate) fn new(
        project: &'a LiveProject,
        file: FileId,
        file_length: u64,
        cancel: &'a CancelToken,
        on_bytes: &'a mut dyn FnMut(u64),
    ) -> Self {
        Self {
            project,
            file,
            file_length,
            cancel,
            on_bytes,
        }
    }

    /// The input file this pass is scanning.
    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    /// Long-running detectors should poll this and return early (with
    /// `Ok`) when set; the coordinator records the run as cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Report how many bytes of the current file have been swept so far.
    /// Feeds the batch's byte-weighted overall progress.
    pub fn report_bytes(&mut self, bytes_scanned: u64) {
        (self.on_bytes)(bytes_scanned)
    }

    /// Register a detected data block (and its codec streams) under the
    /// current file. Takes a short write lock on the shared project.
    pub fn add_data_block(&mut self, spec: DataBlockSpec) -> BlockId {
        self.project.write().add_data_block(self.file, spec)
    }
}

/// The fragment a single-unit scan targets: a data block, or one codec
/// stream within it. Owned clones so no project lock is held across the
/// potentially long-running scan.
#[derive(Clone, Debug)]
pub struct ScanTarget {
    pub file: InputFile,
    pub block: DataBlock,
    pub stream: Option<CodecStream>,
}

impl ScanTarget {
    pub fn fragment(&self) -> FragmentRef {
        match &self.stream {
            Some(stream) => FragmentRef::Stream(stream.id),
            None => FragmentRef::Block(self.block.id),
        }
    }

    /// Short human-readable description, used in error reports.
    pub fn describe(&self) -> String {
        match &self.stream {
            Some(stream) => format!(
                "stream '{}' of block {:?} in {}",
                stream.name,
                self.block.id,
                self.file.path.display()
            ),
            None => format!("block {:?} in {}", self.block.id, self.file.path.display()),
        }
    }
}

/// Produces a [`ResultNode`] tree for a single fragment.
pub trait UnitScanner: Send + Sync {
    /// Scan one fragment, reporting 0–100 progress through `progress`.
    /// Implementations should poll `cancel` and return early when set.
    fn scan_unit(
        &self,
        target: &ScanTarget,
        progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> Result<ResultNode, ScanError>;
}
