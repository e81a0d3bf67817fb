/// Block/stream walking — the per-file result scan.
///
/// Given one input file whose data blocks are already known, the walk
/// visits blocks in detection order and, within each, the codec streams
/// worth scanning, invoking the single-unit scan on each and emitting one
/// [`FileScanResult`] per unit. The result consumer answers with a
/// [`Verdict`]; rejecting a result can force the walk onto the next
/// stream of the same block past the configured limit.
use crate::detect::{ScanTarget, UnitScanner};
use crate::error::ScanError;
use crate::model::{
    BlockId, CodecStream, DataBlock, FileId, FragmentRef, LiveProject, ResultNode, StreamId,
};
use crate::scan::progress::{normalize_nested, MonotonicPercent};
use crate::scan::EVENT_CHANNEL_CAPACITY;
use crate::worker::{CancelToken, CancellableWorker, DEFAULT_STOP_WAIT};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Recognized walk options.
#[derive(Clone, Debug)]
pub struct StreamScanConfig {
    /// Cap on scanned codec streams per data block; `None` is unlimited.
    pub max_codec_streams_per_block: Option<usize>,
    /// When a consumer rejects a result, proceed to the next codec stream
    /// of the same block even past the configured cap.
    pub rescan_next_stream_on_invalidation: bool,
    /// Skip data blocks with a non-zero fragment index entirely; used
    /// when only representative frames are needed.
    pub scan_only_first_fragment: bool,
}

impl Default for StreamScanConfig {
    fn default() -> Self {
        Self {
            max_codec_streams_per_block: None,
            rescan_next_stream_on_invalidation: false,
            scan_only_first_fragment: false,
        }
    }
}

impl StreamScanConfig {
    /// The configuration the keyframe overview drives with: one stream
    /// per block, advance on rejection, first fragments only.
    pub fn keyframe_overview() -> Self {
        Self {
            max_codec_streams_per_block: Some(1),
            rescan_next_stream_on_invalidation: true,
            scan_only_first_fragment: true,
        }
    }
}

/// The consumer's answer to one emitted [`FileScanResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// The result is unusable; skip ahead per the invalidation policy.
    RejectAndAdvance,
}

/// One scanned unit: the fragment, its result tree, the owning block,
/// the codec stream used (`None` for a block-level scan), and how many
/// scannable streams that block offered.
#[derive(Debug)]
pub struct FileScanResult {
    pub fragment: FragmentRef,
    pub block: BlockId,
    pub stream: Option<StreamId>,
    pub available_streams: usize,
    pub result: ResultNode,
}

/// Where the walk currently is within the file's block list; `None`
/// between scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanPosition {
    pub block_index: usize,
    /// Index into the block's scannable streams; `None` while the block
    /// itself is the scanned unit.
    pub stream_index: Option<usize>,
}

/// Receives everything the walk produces, in scan order.
pub trait WalkObserver {
    /// Cursor update; `None` once the walk ends.
    fn position(&mut self, _position: Option<ScanPosition>) {}
    /// Normalized 0–100 progress across the whole file.
    fn progress(&mut self, _percent: u8) {}
    /// One scanned unit; the verdict steers advancement.
    fn result(&mut self, result: FileScanResult) -> Verdict;
}

/// Walk `file`'s data blocks and streams, scanning one unit at a time.
///
/// Visits blocks in detection order. Per block: skip non-first fragments
/// when configured; scan the codec streams with a known format, up to
/// the configured cap unless rejection forces further advancement; a
/// block with a known format and no streams at all is itself the
/// scanned unit. Returns the number of units scanned. Cancellation is
/// checked before each block and each stream.
pub fn walk_file(
    project: &LiveProject,
    file: FileId,
    scanner: &dyn UnitScanner,
    config: &StreamScanConfig,
    cancel: &CancelToken,
    observer: &mut dyn WalkObserver,
) -> Result<usize, ScanError> {
    let input_file = project
        .read()
        .file(file)
        .cloned()
        .ok_or(ScanError::UnknownFile(file))?;
    let blocks: Vec<DataBlock> = project.read().data_blocks(file).cloned().collect();
    let block_count = blocks.len();
    debug!(
        "walking {}: {} data blocks",
        input_file.path.display(),
        block_count
    );

    let mut units_scanned = 0usize;

    for (block_index, block) in blocks.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        if config.scan_only_first_fragment && block.fragment_index != 0 {
            debug!(
                "skipping block {:?} (fragment index {})",
                block.id, block.fragment_index
            );
            continue;
        }

        let all_streams: Vec<CodecStream> =
            project.read().codec_streams(block.id).cloned().collect();
        let scannable: Vec<CodecStream> = all_streams
            .iter()
            .filter(|stream| stream.format.is_known())
            .cloned()
            .collect();

        if scannable.is_empty() {
            // A stream-less block with a recognized container format is
            // itself the scannable unit. A block whose streams all have
            // an unknown codec is not worth scanning at all.
            if block.format.is_known() && all_streams.is_empty() {
                observer.position(Some(ScanPosition {
                    block_index,
                    stream_index: None,
                }));
                let target = ScanTarget {
                    file: input_file.clone(),
                    block: block.clone(),
                    stream: None,
                };
                let result =
                    scan_one(scanner, &target, block_index, block_count, 0, 1, cancel, observer)?;
                units_scanned += 1;
                // A rejected block-level result has no next stream to
                // force; the walk advances to the next block either way.
                let _ = observer.result(FileScanResult {
                    fragment: target.fragment(),
                    block: block.id,
                    stream: None,
                    available_streams: 0,
                    result,
                });
            }
            continue;
        }

        let stream_count = scannable.len();
        let mut stream_index = 0usize;
        let mut forced = false;
        while stream_index < stream_count {
            if cancel.is_cancelled() {
                break;
            }
            let within_cap = config
                .max_codec_streams_per_block
                .is_none_or(|cap| stream_index < cap);
            if !within_cap && !forced {
                break;
            }
            forced = false;

            observer.position(Some(ScanPosition {
                block_index,
                stream_index: Some(stream_index),
            }));
            let stream = &scannable[stream_index];
            let target = ScanTarget {
                file: input_file.clone(),
                block: block.clone(),
                stream: Some(stream.clone()),
            };
            let result = scan_one(
                scanner,
                &target,
                block_index,
                block_count,
                stream_index,
                stream_count,
                cancel,
                observer,
            )?;
            units_scanned += 1;
            let verdict = observer.result(FileScanResult {
                fragment: target.fragment(),
                block: block.id,
                stream: Some(stream.id),
                available_streams: stream_count,
                result,
            });
            if verdict == Verdict::RejectAndAdvance && config.rescan_next_stream_on_invalidation {
                forced = true;
            }
            stream_index += 1;
        }
    }

    observer.position(None);
    Ok(units_scanned)
}

/// Scan one unit, forwarding its 0–100 progress normalized against the
/// stream position within the block and the block position within the
/// file.
#[allow(clippy::too_many_arguments)]
fn scan_one(
    scanner: &dyn UnitScanner,
    target: &ScanTarget,
    block_index: usize,
    block_count: usize,
    unit_index: usize,
    unit_count: usize,
    cancel: &CancelToken,
    observer: &mut dyn WalkObserver,
) -> Result<ResultNode, ScanError> {
    let mut on_percent = |percent: u8| {
        let inner = normalize_nested(unit_index, unit_count, percent.min(100));
        observer.progress(normalize_nested(block_index, block_count, inner));
    };
    scanner.scan_unit(target, &mut on_percent, cancel)
}

/// Events sent from the stream-scan thread to the host. Results do not
/// travel here — they go to the consumer callback, which must answer
/// with a verdict synchronously.
#[derive(Debug)]
pub enum StreamScanEvent {
    /// Normalized progress across the whole file, non-decreasing.
    Progress { percent: u8 },
    /// A stop was requested; the in-flight unit finishes first.
    Cancelling,
    Completed {
        units_scanned: usize,
        cancelled: bool,
        error: Option<String>,
    },
}

/// Runs [`walk_file`] for one input file on a background worker. One
/// scan in flight at a time.
pub struct StreamScanCoordinator {
    project: LiveProject,
    scanner: Arc<dyn UnitScanner>,
    config: StreamScanConfig,
    worker: CancellableWorker,
    position: Arc<Mutex<Option<ScanPosition>>>,
    events_tx: Sender<StreamScanEvent>,
    /// Receiver for scan events; the host drains this.
    pub events: Receiver<StreamScanEvent>,
}

/// Bridges the walk onto the coordinator's channel and shared cursor.
struct ChannelObserver<C> {
    tx: Sender<StreamScanEvent>,
    position: Arc<Mutex<Option<ScanPosition>>>,
    monotonic: MonotonicPercent,
    consumer: C,
}

impl<C> WalkObserver for ChannelObserver<C>
where
    C: FnMut(FileScanResult) -> Verdict,
{
    fn position(&mut self, position: Option<ScanPosition>) {
        *self.position.lock() = position;
    }

    fn progress(&mut self, percent: u8) {
        let percent = self.monotonic.clamp(percent);
        let _ = self.tx.send(StreamScanEvent::Progress { percent });
    }

    fn result(&mut self, result: FileScanResult) -> Verdict {
        (self.consumer)(result)
    }
}

impl StreamScanCoordinator {
    pub fn new(
        project: LiveProject,
        scanner: Arc<dyn UnitScanner>,
        config: StreamScanConfig,
    ) -> Self {
        let (events_tx, events) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            project,
            scanner,
            config,
            worker: CancellableWorker::new("carvescan-streams"),
            position: Arc::new(Mutex::new(None)),
            events_tx,
            events,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }

    /// The walk's current cursor, for display; `None` between scans.
    pub fn position(&self) -> Option<ScanPosition> {
        *self.position.lock()
    }

    /// Start walking `file` on the background worker, handing each
    /// result to `consumer` in scan order.
    ///
    /// Fails fast with [`ScanError::Busy`] while a scan is in flight and
    /// with [`ScanError::UnknownFile`] when `file` is not part of the
    /// project.
    pub fn start_scan<C>(&mut self, file: FileId, consumer: C) -> Result<(), ScanError>
    where
        C: FnMut(FileScanResult) -> Verdict + Send + 'static,
    {
        if self.worker.is_busy() {
            return Err(ScanError::Busy);
        }
        if self.project.read().file(file).is_none() {
            return Err(ScanError::UnknownFile(file));
        }
        info!("starting stream scan of file {file:?}");

        let project = Arc::clone(&self.project);
        let scanner = Arc::clone(&self.scanner);
        let config = self.config.clone();
        let units = Arc::new(Mutex::new(0usize));

        let mut observer = ChannelObserver {
            tx: self.events_tx.clone(),
            position: Arc::clone(&self.position),
            monotonic: MonotonicPercent::default(),
            consumer,
        };

        let units_done = Arc::clone(&units);
        let position_done = Arc::clone(&self.position);
        let tx_done = self.events_tx.clone();

        self.worker.run(
            move |cancel| {
                let scanned =
                    walk_file(&project, file, scanner.as_ref(), &config, cancel, &mut observer)?;
                *units.lock() = scanned;
                Ok(())
            },
            move |completion| {
                *position_done.lock() = None;
                let _ = tx_done.send(StreamScanEvent::Completed {
                    units_scanned: *units_done.lock(),
                    cancelled: completion.cancelled,
                    error: completion.error.as_ref().map(ToString::to_string),
                });
            },
        )
    }

    /// Cancel the in-flight unit scan and reset the cursor. Safe to call
    /// when idle (`true` immediately).
    pub fn stop_scan(&mut self) -> bool {
        self.stop_scan_with(|_| false)
    }

    /// [`StreamScanCoordinator::stop_scan`] with a keep-waiting query for
    /// the doubling backoff.
    pub fn stop_scan_with<K>(&mut self, keep_waiting: K) -> bool
    where
        K: FnMut(Duration) -> bool,
    {
        if self.worker.is_busy() {
            let _ = self.events_tx.send(StreamScanEvent::Cancelling);
        }
        let stopped = self.worker.stop_with(DEFAULT_STOP_WAIT, keep_waiting);
        if stopped {
            *self.position.lock() = None;
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ScanTarget;
    use crate::model::{CodecStreamSpec, DataBlockSpec, DataFormat, Project};

    /// Unit scanner that reports two progress ticks and never finds
    /// keyframes; the tests only care about which units it visits.
    struct RecordingScanner;

    impl UnitScanner for RecordingScanner {
        fn scan_unit(
            &self,
            target: &ScanTarget,
            progress: &mut dyn FnMut(u8),
            _cancel: &CancelToken,
        ) -> Result<ResultNode, ScanError> {
            progress(50);
            progress(100);
            Ok(ResultNode::new(target.describe(), target.block.offset, 1))
        }
    }

    /// Observer that records visited units and answers with scripted
    /// verdicts (default `Accept`).
    #[derive(Default)]
    struct Script {
        verdicts: Vec<Verdict>,
        visited: Vec<(BlockId, Option<StreamId>)>,
        progress: Vec<u8>,
    }

    impl WalkObserver for Script {
        fn progress(&mut self, percent: u8) {
            self.progress.push(percent);
        }

        fn result(&mut self, result: FileScanResult) -> Verdict {
            self.visited.push((result.block, result.stream));
            if self.visited.len() <= self.verdicts.len() {
                self.verdicts[self.visited.len() - 1]
            } else {
                Verdict::Accept
            }
        }
    }

    fn stream(name: &str, format: DataFormat) -> CodecStreamSpec {
        CodecStreamSpec {
            name: name.into(),
            format,
            length: 10,
        }
    }

    fn block(
        format: DataFormat,
        fragment_index: u32,
        streams: Vec<CodecStreamSpec>,
    ) -> DataBlockSpec {
        DataBlockSpec {
            offset: 0,
            length: 100,
            format,
            fragment_index,
            streams,
        }
    }

    fn walk(
        project: &LiveProject,
        file: FileId,
        config: &StreamScanConfig,
        script: &mut Script,
    ) -> usize {
        let token = idle_token();
        walk_file(project, file, &RecordingScanner, config, &token, script).unwrap()
    }

    fn idle_token() -> CancelToken {
        // A worker that never runs leaves its token unset.
        CancellableWorker::new("token-source").cancel_token()
    }

    #[test]
    fn first_fragment_filter_skips_continuation_blocks() {
        let project = Project::live();
        let file = project.write().add_file("a.bin".into(), 400);
        let expected: Vec<BlockId> = [0u32, 1, 0, 2]
            .iter()
            .map(|&index| {
                project.write().add_data_block(
                    file,
                    block(DataFormat::Avi, index, vec![stream("v", DataFormat::H264)]),
                )
            })
            .collect();

        let config = StreamScanConfig {
            scan_only_first_fragment: true,
            ..StreamScanConfig::default()
        };
        let mut script = Script::default();
        let scanned = walk(&project, file, &config, &mut script);

        assert_eq!(scanned, 2);
        let blocks: Vec<BlockId> = script.visited.iter().map(|(b, _)| *b).collect();
        assert_eq!(blocks, vec![expected[0], expected[2]]);
    }

    #[test]
    fn rejection_forces_past_the_stream_cap() {
        let project = Project::live();
        let file = project.write().add_file("a.bin".into(), 400);
        project.write().add_data_block(
            file,
            block(
                DataFormat::Avi,
                0,
                vec![
                    stream("s0", DataFormat::H264),
                    stream("s1", DataFormat::Mpeg4Video),
                    stream("s2", DataFormat::Mpeg2Video),
                ],
            ),
        );

        let config = StreamScanConfig {
            max_codec_streams_per_block: Some(1),
            rescan_next_stream_on_invalidation: true,
            ..StreamScanConfig::default()
        };
        let mut script = Script {
            verdicts: vec![Verdict::RejectAndAdvance, Verdict::Accept],
            ..Script::default()
        };
        let scanned = walk(&project, file, &config, &mut script);

        // Stream 0 rejected, stream 1 scanned past the cap and accepted,
        // stream 2 never reached.
        assert_eq!(scanned, 2);
        let streams: Vec<Option<StreamId>> = script.visited.iter().map(|(_, s)| *s).collect();
        assert_eq!(streams.len(), 2);
        assert_ne!(streams[0], streams[1]);
    }

    #[test]
    fn cap_holds_without_the_invalidation_policy() {
        let project = Project::live();
        let file = project.write().add_file("a.bin".into(), 400);
        project.write().add_data_block(
            file,
            block(
                DataFormat::Avi,
                0,
                vec![
                    stream("s0", DataFormat::H264),
                    stream("s1", DataFormat::Mpeg4Video),
                    stream("s2", DataFormat::Mpeg2Video),
                ],
            ),
        );

        let config = StreamScanConfig {
            max_codec_streams_per_block: Some(2),
            ..StreamScanConfig::default()
        };
        let mut script = Script::default();
        assert_eq!(walk(&project, file, &config, &mut script), 2);

        // Rejection without the policy does not extend the cap either.
        let mut script = Script {
            verdicts: vec![Verdict::RejectAndAdvance; 3],
            ..Script::default()
        };
        assert_eq!(walk(&project, file, &config, &mut script), 2);
    }

    #[test]
    fn unknown_codec_streams_are_never_scanned() {
        let project = Project::live();
        let file = project.write().add_file("a.bin".into(), 400);
        project.write().add_data_block(
            file,
            block(
                DataFormat::Avi,
                0,
                vec![
                    stream("junk", DataFormat::Unknown),
                    stream("video", DataFormat::H264),
                ],
            ),
        );
        // All streams unknown: the block is skipped entirely, not
        // scanned at block level.
        project.write().add_data_block(
            file,
            block(DataFormat::Avi, 0, vec![stream("junk", DataFormat::Unknown)]),
        );

        let mut script = Script::default();
        let scanned = walk(&project, file, &StreamScanConfig::default(), &mut script);

        assert_eq!(scanned, 1);
        assert!(script.visited[0].1.is_some());
    }

    #[test]
    fn stream_less_known_block_is_scanned_directly() {
        let project = Project::live();
        let file = project.write().add_file("a.bin".into(), 400);
        let direct = project
            .write()
            .add_data_block(file, block(DataFormat::Mpeg2System, 0, vec![]));
        // Unknown format and no streams: nothing to scan.
        project
            .write()
            .add_data_block(file, block(DataFormat::Unknown, 0, vec![]));

        // Rejecting the block-level result advances to the next block
        // rather than erroring; there is no stream to force.
        let config = StreamScanConfig {
            rescan_next_stream_on_invalidation: true,
            ..StreamScanConfig::default()
        };
        let mut script = Script {
            verdicts: vec![Verdict::RejectAndAdvance],
            ..Script::default()
        };
        let scanned = walk(&project, file, &config, &mut script);

        assert_eq!(scanned, 1);
        assert_eq!(script.visited, vec![(direct, None)]);
    }

    #[test]
    fn progress_is_within_bounds_and_monotonic_under_a_clamp() {
        let project = Project::live();
        let file = project.write().add_file("a.bin".into(), 400);
        for _ in 0..3 {
            project.write().add_data_block(
                file,
                block(
                    DataFormat::Avi,
                    0,
                    vec![
                        stream("v", DataFormat::H264),
                        stream("a", DataFormat::Mpeg4Video),
                    ],
                ),
            );
        }

        let mut script = Script::default();
        walk(&project, file, &StreamScanConfig::default(), &mut script);

        assert!(!script.progress.is_empty());
        assert!(script.progress.iter().all(|&p| p <= 100));
        let mut monotonic = MonotonicPercent::default();
        let clamped: Vec<u8> = script.progress.iter().map(|&p| monotonic.clamp(p)).collect();
        assert!(clamped.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*clamped.last().unwrap(), 100);
    }

    #[test]
    fn walking_an_unknown_file_fails() {
        let project = Project::live();
        let token = idle_token();
        let mut script = Script::default();
        let result = walk_file(
            &project,
            FileId(7),
            &RecordingScanner,
            &StreamScanConfig::default(),
            &token,
            &mut script,
        );
        assert!(matches!(result, Err(ScanError::UnknownFile(FileId(7)))));
    }
}
