/// The mutable project state shared between scan workers and observers.
///
/// A `Project` owns the input files registered for scanning and the data
/// blocks / codec streams the detection capability discovered inside them.
/// Invariants: a data block belongs to exactly one input file; a codec
/// stream belongs to exactly one data block. Deleting a file removes its
/// blocks and their streams.
///
/// Workers mutate the project only through a shared [`LiveProject`]
/// (`Arc<RwLock<Project>>`): short write locks from the scan thread,
/// read locks from whichever single-threaded host renders it. This is the
/// explicit ownership boundary — the core never mutates the project
/// concurrently with an observer holding a read lock.
use super::fragment::{BlockId, DataFormat, FileId, StreamId};
use chrono::{DateTime, Local};
use compact_str::CompactString;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A shared, concurrently-readable project.
pub type LiveProject = Arc<RwLock<Project>>;

/// One file registered with the project; the unit of top-level scan
/// progress.
#[derive(Clone, Debug, Serialize)]
pub struct InputFile {
    pub id: FileId,
    /// Full path on disk.
    pub path: PathBuf,
    /// File length in bytes at registration time.
    pub length: u64,
    /// When the file was added to the project.
    pub added_at: DateTime<Local>,
    /// Wall-clock duration of the detection pass over this file, recorded
    /// once the pass finishes.
    pub scan_duration: Option<Duration>,
}

/// A contiguous byte range within an input file identified by a container
/// detector as holding one media container instance.
#[derive(Clone, Debug, Serialize)]
pub struct DataBlock {
    pub id: BlockId,
    /// Owning input file.
    pub file: FileId,
    /// Byte offset of the block within the file.
    pub offset: u64,
    /// Block length in bytes.
    pub length: u64,
    pub format: DataFormat,
    /// Position within a fragment sequence; `0` for the first (or only)
    /// fragment of a fragmented container.
    pub fragment_index: u32,
}

/// An elementary audio/video sub-stream within a data block.
#[derive(Clone, Debug, Serialize)]
pub struct CodecStream {
    pub id: StreamId,
    /// Owning data block.
    pub block: BlockId,
    pub name: CompactString,
    pub format: DataFormat,
    /// Stream length in bytes.
    pub length: u64,
}

/// Value object handed to [`Project::add_data_block`] by the detection
/// capability, describing one detected block and its streams.
#[derive(Clone, Debug)]
pub struct DataBlockSpec {
    pub offset: u64,
    pub length: u64,
    pub format: DataFormat,
    pub fragment_index: u32,
    pub streams: Vec<CodecStreamSpec>,
}

/// One codec stream within a [`DataBlockSpec`].
#[derive(Clone, Debug)]
pub struct CodecStreamSpec {
    pub name: CompactString,
    pub format: DataFormat,
    pub length: u64,
}

/// In-memory project state. See the module docs for the sharing model.
#[derive(Debug, Default)]
pub struct Project {
    files: Vec<InputFile>,
    blocks: Vec<DataBlock>,
    streams: Vec<CodecStream>,
    next_file: u32,
    next_block: u32,
    next_stream: u32,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh project for sharing between a worker and observers.
    pub fn live() -> LiveProject {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Register an input file. Called by the file-scan worker before the
    /// detection pass over that file starts.
    pub fn add_file(&mut self, path: PathBuf, length: u64) -> FileId {
        let id = FileId(self.next_file);
        self.next_file += 1;
        self.files.push(InputFile {
            id,
            path,
            length,
            added_at: Local::now(),
            scan_duration: None,
        });
        id
    }

    /// Register a detected data block (and its codec streams) under `file`.
    ///
    /// Precondition: `file` is part of the project.
    pub fn add_data_block(&mut self, file: FileId, spec: DataBlockSpec) -> BlockId {
        debug_assert!(
            self.file(file).is_some(),
            "add_data_block for a file not in the project"
        );
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(DataBlock {
            id,
            file,
            offset: spec.offset,
            length: spec.length,
            format: spec.format,
            fragment_index: spec.fragment_index,
        });
        for stream in spec.streams {
            let stream_id = StreamId(self.next_stream);
            self.next_stream += 1;
            self.streams.push(CodecStream {
                id: stream_id,
                block: id,
                name: stream.name,
                format: stream.format,
                length: stream.length,
            });
        }
        id
    }

    /// Remove a file and everything discovered inside it.
    /// Returns `false` if the file was not part of the project.
    pub fn delete_file(&mut self, file: FileId) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.id != file);
        if self.files.len() == before {
            return false;
        }
        let removed: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|b| b.file == file)
            .map(|b| b.id)
            .collect();
        self.blocks.retain(|b| b.file != file);
        self.streams.retain(|s| !removed.contains(&s.block));
        true
    }

    /// Remove a data block and its codec streams.
    /// Returns `false` if the block was not part of the project.
    pub fn delete_data_block(&mut self, block: BlockId) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.id != block);
        if self.blocks.len() == before {
            return false;
        }
        self.streams.retain(|s| s.block != block);
        true
    }

    /// Record how long the detection pass over `file` took.
    /// Returns `false` if the file was not part of the project.
    pub fn set_scan_duration(&mut self, file: FileId, duration: Duration) -> bool {
        match self.files.iter_mut().find(|f| f.id == file) {
            Some(f) => {
                f.scan_duration = Some(duration);
                true
            }
            None => false,
        }
    }

    /// All input files, in registration order.
    pub fn input_files(&self) -> &[InputFile] {
        &self.files
    }

    pub fn file(&self, file: FileId) -> Option<&InputFile> {
        self.files.iter().find(|f| f.id == file)
    }

    pub fn block(&self, block: BlockId) -> Option<&DataBlock> {
        self.blocks.iter().find(|b| b.id == block)
    }

    /// Data blocks of `file`, in detection order.
    pub fn data_blocks(&self, file: FileId) -> impl Iterator<Item = &DataBlock> + '_ {
        self.blocks.iter().filter(move |b| b.file == file)
    }

    /// Codec streams of `block`, in detection order.
    pub fn codec_streams(&self, block: BlockId) -> impl Iterator<Item = &CodecStream> + '_ {
        self.streams.iter().filter(move |s| s.block == block)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Sum of all registered file lengths.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_spec(format: DataFormat, streams: Vec<CodecStreamSpec>) -> DataBlockSpec {
        DataBlockSpec {
            offset: 0,
            length: 1_000,
            format,
            fragment_index: 0,
            streams,
        }
    }

    fn stream_spec(name: &str, format: DataFormat) -> CodecStreamSpec {
        CodecStreamSpec {
            name: name.into(),
            format,
            length: 100,
        }
    }

    #[test]
    fn add_file_assigns_unique_ids() {
        let mut project = Project::new();
        let a = project.add_file("a.bin".into(), 10);
        let b = project.add_file("b.bin".into(), 20);
        assert_ne!(a, b);
        assert_eq!(project.file_count(), 2);
        assert_eq!(project.total_bytes(), 30);
    }

    #[test]
    fn blocks_and_streams_are_listed_in_detection_order() {
        let mut project = Project::new();
        let file = project.add_file("a.bin".into(), 10);
        let first = project.add_data_block(
            file,
            block_spec(
                DataFormat::Avi,
                vec![
                    stream_spec("video", DataFormat::Mpeg4Video),
                    stream_spec("audio", DataFormat::Unknown),
                ],
            ),
        );
        let second = project.add_data_block(file, block_spec(DataFormat::Mpeg2System, vec![]));

        let blocks: Vec<BlockId> = project.data_blocks(file).map(|b| b.id).collect();
        assert_eq!(blocks, vec![first, second]);

        let names: Vec<&str> = project
            .codec_streams(first)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["video", "audio"]);
    }

    #[test]
    fn delete_file_cascades_to_blocks_and_streams() {
        let mut project = Project::new();
        let keep = project.add_file("keep.bin".into(), 10);
        let gone = project.add_file("gone.bin".into(), 10);
        project.add_data_block(
            keep,
            block_spec(DataFormat::Avi, vec![stream_spec("v", DataFormat::H264)]),
        );
        project.add_data_block(
            gone,
            block_spec(DataFormat::Asf, vec![stream_spec("v", DataFormat::H263)]),
        );

        assert!(project.delete_file(gone));
        assert_eq!(project.file_count(), 1);
        assert_eq!(project.block_count(), 1);
        assert_eq!(project.stream_count(), 1);
        assert!(!project.delete_file(gone));
    }

    #[test]
    fn delete_data_block_removes_its_streams_only() {
        let mut project = Project::new();
        let file = project.add_file("a.bin".into(), 10);
        let doomed = project.add_data_block(
            file,
            block_spec(DataFormat::Avi, vec![stream_spec("v", DataFormat::H264)]),
        );
        let kept = project.add_data_block(
            file,
            block_spec(
                DataFormat::QuickTime,
                vec![stream_spec("v", DataFormat::Mpeg4Video)],
            ),
        );

        assert!(project.delete_data_block(doomed));
        assert_eq!(project.block_count(), 1);
        assert_eq!(project.stream_count(), 1);
        assert!(project.codec_streams(kept).next().is_some());
    }

    #[test]
    fn set_scan_duration_records_on_the_right_file() {
        let mut project = Project::new();
        let file = project.add_file("a.bin".into(), 10);
        assert!(project.set_scan_duration(file, Duration::from_millis(250)));
        assert_eq!(
            project.file(file).unwrap().scan_duration,
            Some(Duration::from_millis(250))
        );
        assert!(!project.set_scan_duration(FileId(999), Duration::ZERO));
    }
}
