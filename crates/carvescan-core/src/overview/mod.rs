/// Keyframe overview — one summary row per input file that yields a
/// keyframe-bearing result, built for a thumbnail grid.
///
/// Drives the block/stream walk across every file of the project
/// sequentially, in name order, with the overview configuration (one
/// stream per block, advance on rejection, first fragments only). A
/// result without keyframes is rejected so the walk tries the next
/// stream; the first qualifying result per file produces the row and
/// contributes up to [`KEYFRAMES_PER_ROW`] keyframes.
///
/// Rows live in a shared `Arc<RwLock<Vec<OverviewRow>>>` the host reads
/// each frame, mirroring how the project itself is shared. At most one
/// overview scan runs per driver; starting a second fails fast.
use crate::detect::UnitScanner;
use crate::error::ScanError;
use crate::model::{BlockId, FileId, InputFile, Keyframe, LiveProject, StreamId};
use crate::scan::progress::{normalize_nested, MonotonicPercent};
use crate::scan::streams::{walk_file, FileScanResult, StreamScanConfig, Verdict, WalkObserver};
use crate::scan::EVENT_CHANNEL_CAPACITY;
use crate::worker::{CancelToken, CancellableWorker, DEFAULT_STOP_WAIT};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keyframes enqueued for thumbnail rendering per overview row.
pub const KEYFRAMES_PER_ROW: usize = 5;

/// One summary row: the file, the fragment that produced the qualifying
/// result, and its first keyframes.
#[derive(Clone, Debug, Serialize)]
pub struct OverviewRow {
    pub file: FileId,
    pub path: PathBuf,
    pub block: BlockId,
    /// The codec stream the qualifying result came from; `None` when the
    /// block itself was the scanned unit.
    pub stream: Option<StreamId>,
    pub keyframes: Vec<Keyframe>,
}

/// Shared, concurrently-readable overview rows.
pub type LiveRows = Arc<RwLock<Vec<OverviewRow>>>;

/// Events sent from the overview thread to the host.
#[derive(Debug)]
pub enum OverviewEvent {
    /// The walk moved on to the next file.
    FileStarted { file: FileId, path: PathBuf },
    /// A row was appended to the shared row list.
    RowAdded { file: FileId },
    /// Normalized progress across the whole project, non-decreasing.
    Progress { percent: u8 },
    /// A stop was requested; the in-flight unit finishes first.
    Cancelling,
    Completed {
        rows_built: usize,
        cancelled: bool,
        error: Option<String>,
    },
}

/// See the module docs.
pub struct KeyframeOverviewDriver {
    project: LiveProject,
    scanner: Arc<dyn UnitScanner>,
    worker: CancellableWorker,
    rows: LiveRows,
    events_tx: Sender<OverviewEvent>,
    /// Receiver for overview events; the host drains this.
    pub events: Receiver<OverviewEvent>,
}

impl KeyframeOverviewDriver {
    pub fn new(project: LiveProject, scanner: Arc<dyn UnitScanner>) -> Self {
        let (events_tx, events) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            project,
            scanner,
            worker: CancellableWorker::new("carvescan-overview"),
            rows: Arc::new(RwLock::new(Vec::new())),
            events_tx,
            events,
        }
    }

    /// Handle to the shared row list. The host read-locks it to render;
    /// the driver appends rows as files qualify.
    pub fn rows(&self) -> LiveRows {
        Arc::clone(&self.rows)
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }

    /// Start (or resume) the overview scan on the background worker.
    ///
    /// The file list is snapshotted sorted by name when the worker
    /// starts; files that already have a row are skipped, so a restart
    /// after a deletion never duplicates rows. Fails fast with
    /// [`ScanError::Busy`] while a scan is in flight.
    pub fn start(&mut self) -> Result<(), ScanError> {
        let project = Arc::clone(&self.project);
        let scanner = Arc::clone(&self.scanner);
        let rows = Arc::clone(&self.rows);
        let tx = self.events_tx.clone();

        let rows_done = Arc::clone(&self.rows);
        let tx_done = self.events_tx.clone();

        self.worker.run(
            move |cancel| run_overview(&project, scanner.as_ref(), &rows, &tx, cancel),
            move |completion| {
                let _ = tx_done.send(OverviewEvent::Completed {
                    rows_built: rows_done.read().len(),
                    cancelled: completion.cancelled,
                    error: completion.error.as_ref().map(ToString::to_string),
                });
            },
        )
    }

    /// Cancel the in-flight scan and wait for it to drain. Safe when
    /// idle.
    pub fn stop(&mut self) -> bool {
        if self.worker.is_busy() {
            let _ = self.events_tx.send(OverviewEvent::Cancelling);
        }
        self.worker.stop(DEFAULT_STOP_WAIT)
    }

    /// Host notification: `file` was deleted from the project.
    ///
    /// Stops the scan if one is running, removes the rows referencing
    /// the file, and restarts scanning over the updated file list.
    pub fn file_deleted(&mut self, file: FileId) {
        let was_running = self.worker.is_busy();
        if was_running && !self.stop() {
            warn!("overview scan did not stop; rows for {file:?} removed anyway");
        }
        self.rows.write().retain(|row| row.file != file);
        debug!("removed overview rows for deleted file {file:?}");
        if was_running {
            if let Err(err) = self.start() {
                warn!("failed to restart overview scan: {err}");
            }
        }
    }

    /// Host notification: the project was closed. Stops the scan and
    /// clears every row.
    pub fn project_closed(&mut self) {
        self.stop();
        self.rows.write().clear();
    }
}

/// The overview loop, running on the worker thread: one file after
/// another, chained sequentially.
fn run_overview(
    project: &LiveProject,
    scanner: &dyn UnitScanner,
    rows: &LiveRows,
    tx: &Sender<OverviewEvent>,
    cancel: &CancelToken,
) -> Result<(), ScanError> {
    let mut files: Vec<InputFile> = project.read().input_files().to_vec();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    let file_count = files.len();
    if file_count == 0 {
        return Ok(());
    }
    info!("building keyframe overview over {file_count} files");

    let config = StreamScanConfig::keyframe_overview();
    let mut monotonic = MonotonicPercent::default();

    for (file_index, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        // Restarts after a deletion skip files that already have a row.
        if rows.read().iter().any(|row| row.file == file.id) {
            continue;
        }
        // The file may have been deleted since the snapshot was taken.
        if project.read().file(file.id).is_none() {
            continue;
        }
        let _ = tx.send(OverviewEvent::FileStarted {
            file: file.id,
            path: file.path.clone(),
        });

        let mut observer = RowBuilder {
            rows,
            tx,
            monotonic: &mut monotonic,
            file_index,
            file_count,
            file,
            row_added: false,
        };
        walk_file(project, file.id, scanner, &config, cancel, &mut observer)?;
    }
    Ok(())
}

/// Walk observer that turns the first keyframe-bearing result per file
/// into an overview row and rejects everything without keyframes.
struct RowBuilder<'a> {
    rows: &'a LiveRows,
    tx: &'a Sender<OverviewEvent>,
    monotonic: &'a mut MonotonicPercent,
    file_index: usize,
    file_count: usize,
    file: &'a InputFile,
    row_added: bool,
}

impl WalkObserver for RowBuilder<'_> {
    fn progress(&mut self, percent: u8) {
        let overall = normalize_nested(self.file_index, self.file_count, percent);
        let percent = self.monotonic.clamp(overall);
        let _ = self.tx.send(OverviewEvent::Progress { percent });
    }

    fn result(&mut self, result: FileScanResult) -> Verdict {
        if !result.result.has_keyframes() {
            // No keyframes here; let the walk try the next stream.
            return Verdict::RejectAndAdvance;
        }
        if !self.row_added {
            let row = OverviewRow {
                file: self.file.id,
                path: self.file.path.clone(),
                block: result.block,
                stream: result.stream,
                keyframes: result.result.collect_keyframes(KEYFRAMES_PER_ROW),
            };
            self.rows.write().push(row);
            self.row_added = true;
            let _ = self.tx.send(OverviewEvent::RowAdded { file: self.file.id });
        }
        Verdict::Accept
    }
}
