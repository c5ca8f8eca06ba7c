//! The external encoding engine boundary.
//!
//! An engine answers three requests (discover, list codecs, batch encode)
//! and reports everything else through the [`crate::events::EventHub`] it
//! was built with.

pub mod codecs;
pub mod discovery;
pub mod ffmpeg;

pub use codecs::{codecs_from_encoder_list, cpu_codecs, GpuPresence};
pub use discovery::{find_video_files, is_video_file, parse_probe_output, VIDEO_EXTENSIONS};
pub use ffmpeg::{parse_progress_line, FfmpegEngine};

use crate::capability::CodecInfo;
use crate::options::{EncodingOptions, OptionsError};
use std::future::Future;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("could not read {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("ffprobe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("invalid encoding options: {0}")]
    InvalidOptions(#[from] OptionsError),

    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("output file already exists: {0}")]
    OutputExists(PathBuf),

    #[error("encoding {path} failed: {detail}")]
    EncodeFailed { path: PathBuf, detail: String },

    #[error("encoded file not found: {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the core consumes from an encoding backend.
///
/// `discover_files` and `start_batch_encode` report per-file outcomes only
/// through events; their own result says whether the call as a whole
/// succeeded.
pub trait EncodingEngine: Send + Sync + 'static {
    fn discover_files(
        &self,
        paths: Vec<PathBuf>,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn list_available_codecs(
        &self,
    ) -> impl Future<Output = Result<Vec<CodecInfo>, EngineError>> + Send;

    fn start_batch_encode(
        &self,
        paths: Vec<PathBuf>,
        options: EncodingOptions,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Fire-and-forget user notification.
    fn notify_user(&self, title: &str, body: &str);
}

/// Run a command to completion, capturing its output.
///
/// The child is killed if it outlives `timeout`.
pub(crate) async fn run_captured(
    mut cmd: Command,
    timeout: Duration,
) -> Result<Output, EngineError> {
    let program = cmd.as_std().get_program().to_string_lossy().to_string();
    cmd.kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(EngineError::Spawn { program, source }),
        Err(_) => Err(EngineError::Timeout {
            program,
            secs: timeout.as_secs(),
        }),
    }
}
