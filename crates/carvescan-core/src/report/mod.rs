/// JSON export of the discovered structure.
///
/// Flattens the project (files, data blocks, codec streams) and the
/// keyframe overview rows into serializable summaries a host can write
/// out or feed to another tool. This is an export of what was found, not
/// the forensic project persistence format.
use crate::model::{DataFormat, Project};
use crate::overview::OverviewRow;
use chrono::{DateTime, Local};
use compact_str::CompactString;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub files: Vec<FileSummary>,
    pub total_bytes: u64,
    pub block_count: usize,
    pub stream_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub length: u64,
    pub added_at: DateTime<Local>,
    pub scan_duration_ms: Option<u128>,
    pub data_blocks: Vec<BlockSummary>,
}

#[derive(Debug, Serialize)]
pub struct BlockSummary {
    pub offset: u64,
    pub length: u64,
    pub format: DataFormat,
    pub fragment_index: u32,
    pub codec_streams: Vec<StreamSummary>,
}

#[derive(Debug, Serialize)]
pub struct StreamSummary {
    pub name: CompactString,
    pub format: DataFormat,
    pub length: u64,
}

/// Flatten `project` into its summary form.
pub fn summarize(project: &Project) -> ProjectSummary {
    let files = project
        .input_files()
        .iter()
        .map(|file| FileSummary {
            path: file.path.clone(),
            length: file.length,
            added_at: file.added_at,
            scan_duration_ms: file.scan_duration.map(|d| d.as_millis()),
            data_blocks: project
                .data_blocks(file.id)
                .map(|block| BlockSummary {
                    offset: block.offset,
                    length: block.length,
                    format: block.format,
                    fragment_index: block.fragment_index,
                    codec_streams: project
                        .codec_streams(block.id)
                        .map(|stream| StreamSummary {
                            name: stream.name.clone(),
                            format: stream.format,
                            length: stream.length,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    ProjectSummary {
        files,
        total_bytes: project.total_bytes(),
        block_count: project.block_count(),
        stream_count: project.stream_count(),
    }
}

/// Pretty-printed JSON of the project summary.
pub fn project_to_json(project: &Project) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&summarize(project))
}

/// Pretty-printed JSON of the keyframe overview rows.
pub fn overview_to_json(rows: &[OverviewRow]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CodecStreamSpec, DataBlockSpec};
    use std::time::Duration;

    #[test]
    fn project_summary_round_trips_through_json() {
        let mut project = Project::new();
        let file = project.add_file("evidence/a.bin".into(), 4_096);
        project.add_data_block(
            file,
            DataBlockSpec {
                offset: 512,
                length: 2_048,
                format: DataFormat::Avi,
                fragment_index: 0,
                streams: vec![CodecStreamSpec {
                    name: "video 0".into(),
                    format: DataFormat::Mpeg4Video,
                    length: 1_024,
                }],
            },
        );
        project.set_scan_duration(file, Duration::from_millis(42));

        let json = project_to_json(&project).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["total_bytes"], 4_096);
        assert_eq!(value["block_count"], 1);
        assert_eq!(value["files"][0]["scan_duration_ms"], 42);
        assert_eq!(
            value["files"][0]["data_blocks"][0]["codec_streams"][0]["name"],
            "video 0"
        );
    }
}
