//! Finding video files under dropped paths and describing them with ffprobe.

use super::EngineError;
use crate::events::FileDiscovered;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions picked up from dropped directories (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".wmv", ".flv", ".webm"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Video files at or under `root`, in walk order.
///
/// A file root is returned as-is when it has a video extension. Hidden files
/// and directories below the root are skipped.
pub fn find_video_files(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let metadata = std::fs::metadata(root).map_err(|e| EngineError::Walk {
        path: root.to_path_buf(),
        message: e.to_string(),
    })?;

    if !metadata.is_dir() {
        return Ok(if is_video_file(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut videos = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = entry.map_err(|e| EngineError::Walk {
            path: e.path().unwrap_or(root).to_path_buf(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && is_video_file(entry.path()) {
            videos.push(entry.into_path());
        }
    }

    Ok(videos)
}

mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub format_name: Option<String>,
        pub duration: Option<String>,
        pub size: Option<String>,
    }
}

/// Arguments for `ffprobe` describing `path` as JSON.
pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// Turn ffprobe's JSON for `path` into a discovery report.
///
/// Missing duration or size read as 0. The container is the first name in
/// ffprobe's `format_name` list; the codec is the first video stream's, or
/// the first named stream's when there is no video.
pub fn parse_probe_output(path: &Path, json_str: &str) -> Result<FileDiscovered, EngineError> {
    let probe_error = |message: String| EngineError::Probe {
        path: path.to_path_buf(),
        message,
    };

    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| probe_error(e.to_string()))?;
    let format = ffprobe
        .format
        .ok_or_else(|| probe_error("missing format information".to_string()))?;
    let streams = ffprobe.streams.unwrap_or_default();

    let named = |s: &&ffprobe_json::Stream| s.codec_name.as_deref().is_some_and(|n| !n.is_empty());
    let codec = streams
        .iter()
        .filter(named)
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .or_else(|| streams.iter().find(named))
        .and_then(|s| s.codec_name.clone())
        .unwrap_or_default();

    let container_format = format
        .format_name
        .as_deref()
        .and_then(|names| names.split(',').next())
        .unwrap_or_default()
        .to_string();

    Ok(FileDiscovered {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size_bytes: format
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0),
        duration_seconds: format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0),
        container_format,
        codec,
        path: path.to_path_buf(),
    })
}
