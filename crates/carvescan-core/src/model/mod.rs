/// Data model for a carving project.
///
/// Re-exports the project structure (input files, data blocks, codec
/// streams) and the parsed-result tree produced by unit scans.
pub mod fragment;
pub mod project;
pub mod result_node;

pub use fragment::{BlockId, DataFormat, FileId, FragmentRef, StreamId};
pub use project::{
    CodecStream, CodecStreamSpec, DataBlock, DataBlockSpec, InputFile, LiveProject, Project,
};
pub use result_node::{Keyframe, ResultNode};
