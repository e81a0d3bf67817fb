/// Batch file scanning — registers each path with the project and runs
/// the detection capability over it.
///
/// Progress is byte-weighted: the batch's total size is computed up
/// front and each file's detection pass reports into its own
/// [`ByteWindow`], so a 4 GiB file moves the bar accordingly more than a
/// 4 MiB one.
///
/// Failure handling is per-file for missing files only: a path that no
/// longer exists is skipped and the batch proceeds. Every other error
/// aborts the remaining batch and lands in the completion event.
use crate::detect::{DetectionContext, FileScanner};
use crate::error::ScanError;
use crate::model::{FileId, LiveProject};
use crate::scan::progress::{ByteWindow, MonotonicPercent};
use crate::scan::EVENT_CHANNEL_CAPACITY;
use crate::worker::{CancelToken, CancellableWorker, DEFAULT_STOP_WAIT};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The file currently under detection, for "scanning X" display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentFile {
    pub id: FileId,
    pub path: PathBuf,
}

/// Events sent from the scan thread to the host.
#[derive(Debug)]
pub enum FileScanEvent {
    /// The current file changed; `None` once the batch completes or is
    /// cancelled.
    CurrentFile(Option<CurrentFile>),
    /// Byte-weighted overall progress, non-decreasing across the batch.
    Progress { percent: u8, path: PathBuf },
    /// A missing input file was skipped; the batch continues.
    FileSkipped { path: PathBuf, message: String },
    /// A stop was requested; the in-flight file finishes first.
    Cancelling,
    /// The batch ended. `error` is set when an unexpected failure aborted
    /// it; cancellation is not an error.
    Completed {
        files_scanned: usize,
        duration: Duration,
        cancelled: bool,
        error: Option<String>,
    },
}

#[derive(Default)]
struct BatchStats {
    files_scanned: usize,
}

/// Drives one batch of input file paths through detection. One scan in
/// flight at a time; starting another while busy fails fast.
pub struct FileScanCoordinator {
    project: LiveProject,
    scanner: Arc<dyn FileScanner>,
    worker: CancellableWorker,
    current: Arc<Mutex<Option<CurrentFile>>>,
    events_tx: Sender<FileScanEvent>,
    /// Receiver for scan events; the host drains this.
    pub events: Receiver<FileScanEvent>,
}

impl FileScanCoordinator {
    pub fn new(project: LiveProject, scanner: Arc<dyn FileScanner>) -> Self {
        let (events_tx, events) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            project,
            scanner,
            worker: CancellableWorker::new("carvescan-files"),
            current: Arc::new(Mutex::new(None)),
            events_tx,
            events,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }

    /// The file currently being scanned, if any. Changes on every file
    /// boundary and clears when the batch ends.
    pub fn current_file(&self) -> Option<CurrentFile> {
        self.current.lock().clone()
    }

    /// Start scanning `paths` in order on the background worker.
    ///
    /// Fails fast with [`ScanError::Busy`] if a batch is already in
    /// flight. The call itself is fire-and-forget; all outcomes arrive
    /// on [`FileScanCoordinator::events`].
    pub fn scan_files(&mut self, paths: Vec<PathBuf>) -> Result<(), ScanError> {
        let project = Arc::clone(&self.project);
        let scanner = Arc::clone(&self.scanner);
        let current = Arc::clone(&self.current);
        let stats = Arc::new(Mutex::new(BatchStats::default()));
        let tx = self.events_tx.clone();

        let stats_done = Arc::clone(&stats);
        let current_done = Arc::clone(&self.current);
        let tx_done = self.events_tx.clone();
        let started = Instant::now();

        self.worker.run(
            move |cancel| scan_batch(&project, scanner.as_ref(), &current, &stats, &tx, paths, cancel),
            move |completion| {
                *current_done.lock() = None;
                let _ = tx_done.send(FileScanEvent::CurrentFile(None));
                let _ = tx_done.send(FileScanEvent::Completed {
                    files_scanned: stats_done.lock().files_scanned,
                    duration: started.elapsed(),
                    cancelled: completion.cancelled,
                    error: completion.error.as_ref().map(ToString::to_string),
                });
            },
        )
    }

    /// Request cancellation and wait for the in-flight file to finish,
    /// with doubling backoff; `keep_waiting` decides whether to keep
    /// waiting past each elapsed round. `true` once idle.
    pub fn stop_with<K>(&mut self, keep_waiting: K) -> bool
    where
        K: FnMut(Duration) -> bool,
    {
        if self.worker.is_busy() {
            let _ = self.events_tx.send(FileScanEvent::Cancelling);
        }
        self.worker.stop_with(DEFAULT_STOP_WAIT, keep_waiting)
    }

    /// [`FileScanCoordinator::stop_with`] that gives up after the first
    /// wait. Idempotent on an idle coordinator.
    pub fn stop(&mut self) -> bool {
        self.stop_with(|_| false)
    }
}

/// The batch loop, running on the worker thread.
fn scan_batch(
    project: &LiveProject,
    scanner: &dyn FileScanner,
    current: &Mutex<Option<CurrentFile>>,
    stats: &Mutex<BatchStats>,
    tx: &Sender<FileScanEvent>,
    paths: Vec<PathBuf>,
    cancel: &CancelToken,
) -> Result<(), ScanError> {
    // Total size up front so progress is byte-weighted. A file missing
    // here contributes nothing; whether it is skipped is decided per
    // file below.
    let total_bytes: u64 = paths
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();
    let total = total_bytes.max(1);
    info!(
        "starting batch scan: {} files, {} bytes",
        paths.len(),
        total_bytes
    );

    let mut bytes_done: u64 = 0;
    let mut monotonic = MonotonicPercent::default();

    for path in paths {
        // Cancellation is honored at file boundaries only; a file already
        // under detection finishes first.
        if cancel.is_cancelled() {
            debug!("batch scan cancelled before {}", path.display());
            break;
        }

        let length = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("skipping missing input file {}", path.display());
                let _ = tx.send(FileScanEvent::FileSkipped {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
            Err(source) => return Err(ScanError::Io { path, source }),
        };

        // Shared detector state must not leak between files.
        scanner.clear_cache();

        let file_id = project.write().add_file(path.clone(), length);
        let current_file = CurrentFile {
            id: file_id,
            path: path.clone(),
        };
        *current.lock() = Some(current_file.clone());
        let _ = tx.send(FileScanEvent::CurrentFile(Some(current_file)));
        debug!("detecting {} ({} bytes)", path.display(), length);

        let window = ByteWindow::new(bytes_done, length, total);
        let file_started = Instant::now();
        let detected = {
            let mut on_bytes = |bytes_scanned: u64| {
                let percent = monotonic.clamp(window.percent(bytes_scanned));
                let _ = tx.send(FileScanEvent::Progress {
                    percent,
                    path: path.clone(),
                });
            };
            let mut ctx = DetectionContext::new(project, file_id, length, cancel, &mut on_bytes);
            scanner.detect(&path, &mut ctx)
        };
        match detected {
            Ok(()) => {}
            // The file can also vanish between the metadata check above
            // and the detection pass; that is still a per-file skip.
            Err(ScanError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!("input file {} vanished during detection", path.display());
                project.write().delete_file(file_id);
                *current.lock() = None;
                let _ = tx.send(FileScanEvent::CurrentFile(None));
                let _ = tx.send(FileScanEvent::FileSkipped {
                    path,
                    message: source.to_string(),
                });
                bytes_done += length;
                continue;
            }
            Err(err) => return Err(err),
        }
        project
            .write()
            .set_scan_duration(file_id, file_started.elapsed());

        bytes_done += length;
        stats.lock().files_scanned += 1;
        let percent = monotonic.clamp(window.percent(length));
        let _ = tx.send(FileScanEvent::Progress { percent, path });
    }

    Ok(())
}
