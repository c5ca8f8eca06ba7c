//! Engine backed by the `ffmpeg` and `ffprobe` binaries.

use super::codecs::detect_codecs;
use super::discovery::{find_video_files, parse_probe_output, probe_args};
use super::{run_captured, EncodingEngine, EngineError};
use crate::capability::CodecInfo;
use crate::config::EngineConfig;
use crate::events::{
    EncodingProgress, EngineEvent, EventHub, FileDiscovered, FileDiscoveryFailed, ProgressStatus,
};
use crate::options::EncodingOptions;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use uuid::Uuid;

/// Stderr lines kept to explain a failed encode.
const STDERR_TAIL_LINES: usize = 8;

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
    probe_timeout: Duration,
    codec_probe_timeout: Duration,
    hub: EventHub,
}

impl FfmpegEngine {
    pub fn new(config: &EngineConfig, hub: EventHub) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            codec_probe_timeout: Duration::from_secs(config.codec_probe_timeout_secs),
            hub,
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    async fn probe(&self, path: &Path) -> Result<FileDiscovered, EngineError> {
        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.args(probe_args(path)).stdin(Stdio::null());
        let output = run_captured(cmd, self.probe_timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Probe {
                path: path.to_path_buf(),
                message: format!("ffprobe exited with status {}: {}", output.status, stderr.trim()),
            });
        }
        parse_probe_output(path, &String::from_utf8_lossy(&output.stdout))
    }

    fn emit_failure(&self, path: &Path, error: &EngineError) {
        self.hub.emit(EngineEvent::DiscoveryFailed(FileDiscoveryFailed {
            path: Some(path.to_path_buf()),
            message: error.to_string(),
        }));
    }

    fn emit_status(&self, filename: &str, status: ProgressStatus) {
        self.hub
            .emit(EngineEvent::Progress(EncodingProgress::status_only(filename, status)));
    }

    async fn encode_file(&self, input: &Path, options: &EncodingOptions) -> Result<(), EngineError> {
        if !input.exists() {
            return Err(EngineError::MissingInput(input.to_path_buf()));
        }
        let filename = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let output = options.output_path(input);
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        if output.exists() {
            return Err(EngineError::OutputExists(output));
        }

        self.emit_status(&filename, ProgressStatus::Running);

        if options.is_two_pass() {
            let passlog = std::env::temp_dir().join(format!("ffmpeg2pass_{}", Uuid::new_v4()));
            let (first, second) = options.two_pass_args(input, &output, &passlog);
            log::info!("pass 1: {} {}", self.ffmpeg_bin.display(), first.join(" "));
            let result = match self.run_ffmpeg(&first, input, &filename).await {
                Ok(()) => {
                    log::info!("pass 2: {} {}", self.ffmpeg_bin.display(), second.join(" "));
                    self.run_ffmpeg(&second, input, &filename).await
                }
                Err(e) => Err(e),
            };
            remove_passlog(&passlog).await;
            result?;
        } else {
            let args = options.ffmpeg_args(input, &output);
            log::info!("encoding: {} {}", self.ffmpeg_bin.display(), args.join(" "));
            self.run_ffmpeg(&args, input, &filename).await?;
        }

        if !output.exists() {
            return Err(EngineError::MissingOutput(output));
        }

        self.emit_status(&filename, ProgressStatus::Completed);
        log::info!("encoded {} -> {}", input.display(), output.display());
        Ok(())
    }

    /// Run one ffmpeg invocation, emitting progress parsed from its stderr.
    async fn run_ffmpeg(&self, args: &[String], input: &Path, filename: &str) -> Result<(), EngineError> {
        let program = self.ffmpeg_bin.to_string_lossy().to_string();
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn { program, source })?;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(mut stderr) = child.stderr.take() {
            let mut splitter = LineSplitter::default();
            let mut buf = [0u8; 4096];
            loop {
                let n = stderr.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                for line in splitter.push(&buf[..n]) {
                    self.handle_stderr_line(&line, filename, &mut tail);
                }
            }
            if let Some(line) = splitter.finish() {
                self.handle_stderr_line(&line, filename, &mut tail);
            }
        }

        let status = child.wait().await?;
        if status.success() {
            return Ok(());
        }

        let detail = if tail.is_empty() {
            format!("ffmpeg exited with {}", status)
        } else {
            format!(
                "ffmpeg exited with {}\n{}",
                status,
                tail.into_iter().collect::<Vec<_>>().join("\n")
            )
        };
        Err(EngineError::EncodeFailed {
            path: input.to_path_buf(),
            detail,
        })
    }

    fn handle_stderr_line(&self, line: &str, filename: &str, tail: &mut VecDeque<String>) {
        if let Some(progress) = parse_progress_line(filename, line) {
            self.hub.emit(EngineEvent::Progress(progress));
            return;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }
}

async fn remove_passlog(passlog: &Path) {
    let base = passlog.to_string_lossy();
    for suffix in ["-0.log", "-0.log.mbtree"] {
        let path = PathBuf::from(format!("{}{}", base, suffix));
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::debug!("could not remove {}: {}", path.display(), e);
        }
    }
}

impl EncodingEngine for FfmpegEngine {
    async fn discover_files(&self, paths: Vec<PathBuf>) -> Result<(), EngineError> {
        for root in &paths {
            let files = match find_video_files(root) {
                Ok(files) => files,
                Err(e) => {
                    log::warn!("{}", e);
                    self.emit_failure(root, &e);
                    continue;
                }
            };

            for file in files {
                match self.probe(&file).await {
                    Ok(meta) => {
                        log::debug!("discovered {} ({:.1}s)", meta.name, meta.duration_seconds);
                        self.hub.emit(EngineEvent::Discovered(meta));
                    }
                    Err(e) => {
                        log::warn!("{}", e);
                        self.emit_failure(&file, &e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn list_available_codecs(&self) -> Result<Vec<CodecInfo>, EngineError> {
        Ok(detect_codecs(&self.ffmpeg_bin, self.codec_probe_timeout).await)
    }

    async fn start_batch_encode(
        &self,
        paths: Vec<PathBuf>,
        options: EncodingOptions,
    ) -> Result<(), EngineError> {
        let options = options.validate()?;
        for input in &paths {
            self.encode_file(input, &options).await?;
        }
        Ok(())
    }

    fn notify_user(&self, title: &str, body: &str) {
        log::info!("{}: {}", title, body);

        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(body),
                escape_applescript(title)
            );
            if let Err(e) = std::process::Command::new("osascript")
                .arg("-e")
                .arg(script)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                log::debug!("osascript notification failed: {}", e);
            }
        }
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Splits a byte stream on `\r` or `\n`, skipping blank lines.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\r' || b == b'\n' {
                self.flush_into(&mut lines);
            } else {
                self.pending.push(b);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if !line.is_empty() {
            lines.push(line);
        }
    }
}

/// Value following `key` (e.g. `"frame="`) on an ffmpeg status line.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut search = line;
    loop {
        let at = search.find(key)?;
        let boundary = at == 0 || search[..at].ends_with(char::is_whitespace);
        let rest = &search[at + key.len()..];
        if boundary {
            return rest.split_whitespace().next();
        }
        search = rest;
    }
}

fn number_with_suffix<T: std::str::FromStr>(value: Option<&str>, suffixes: &[&str]) -> Option<T> {
    let value = value?;
    let trimmed = suffixes
        .iter()
        .find_map(|s| value.strip_suffix(s))
        .unwrap_or(value);
    trimmed.parse().ok()
}

/// Parse one ffmpeg stderr status line into a running progress report.
///
/// Returns `None` for lines that carry neither a time stamp nor a frame
/// count.
pub fn parse_progress_line(filename: &str, line: &str) -> Option<EncodingProgress> {
    let frame: u64 = number_with_suffix(field(line, "frame="), &[]).unwrap_or(0);
    let time = field(line, "time=")
        .filter(|t| t.starts_with(|c: char| c.is_ascii_digit() || c == '-'))
        .unwrap_or_default()
        .to_string();

    if time.is_empty() && frame == 0 {
        return None;
    }

    let size_kb: u64 = number_with_suffix(field(line, "size="), &["KiB", "kB"]).unwrap_or(0);
    Some(EncodingProgress {
        filename: filename.to_string(),
        frame,
        fps: number_with_suffix(field(line, "fps="), &[]).unwrap_or(0.0),
        time,
        output_size_bytes: size_kb * 1024,
        bitrate_kbps: number_with_suffix(field(line, "bitrate="), &["kbits/s"]).unwrap_or(0.0),
        speed: number_with_suffix(field(line, "speed="), &["x"]).unwrap_or(0.0),
        progress_percent: 0.0,
        status: ProgressStatus::Running,
    })
}
