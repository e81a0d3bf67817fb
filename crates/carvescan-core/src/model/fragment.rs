/// Identifiers and the closed fragment taxonomy.
///
/// Fragment nodes come in exactly three kinds — input file, data block,
/// codec stream — with different progress and identity semantics, so the
/// distinction is a sum type rather than runtime type tests.
use serde::Serialize;

/// Identifier of an [`InputFile`](super::InputFile) within its project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub u32);

/// Identifier of a [`DataBlock`](super::DataBlock) within its project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub u32);

/// Identifier of a [`CodecStream`](super::CodecStream) within its project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StreamId(pub u32);

/// Container or codec format assigned to a data block or codec stream by
/// the detection capability.
///
/// `Unknown` marks a fragment that no detector claimed; such fragments are
/// never worth a unit scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DataFormat {
    Unknown,
    Avi,
    Asf,
    QuickTime,
    Mpeg1System,
    Mpeg2System,
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4Video,
    H263,
    H264,
}

impl DataFormat {
    /// `true` for every format except [`DataFormat::Unknown`].
    #[inline]
    pub fn is_known(self) -> bool {
        self != DataFormat::Unknown
    }
}

/// Reference to any node of the fragment tree that can be the target of a
/// single-unit scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FragmentRef {
    File(FileId),
    Block(BlockId),
    Stream(StreamId),
}
