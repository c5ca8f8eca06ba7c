//! Job entity and its status machine.
//!
//! A job is created from a discovery event and is only ever mutated through
//! [`crate::registry::JobRegistry`]. Status moves along
//! `Pending -> Running -> {Completed, Failed}`; terminal jobs return to
//! `Pending` only when a batch re-submits them.

use crate::events::FileDiscovered;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be encoded.
    Pending,
    /// The engine is encoding the file.
    Running,
    /// The engine reported the output as finished.
    Completed,
    /// The engine or the batch call failed.
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    /// Whether a progress report may move a job from `self` to `next`.
    ///
    /// Re-submission (`* -> Pending`) is not a progress edge and is handled by
    /// the registry's batch reset.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Completed or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Encoder statistics from the most recent progress report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStats {
    pub frame: u64,
    pub fps: f64,
    /// Elapsed media time as reported by the engine.
    pub elapsed_time: String,
    pub output_size_bytes: u64,
    pub bitrate_kbps: f64,
    pub speed_factor: f64,
}

/// One file's encode work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier (UUID).
    pub id: String,
    /// Absolute path of the source file; unique within a registry.
    pub path: PathBuf,
    /// File name, used to route progress reports.
    pub name: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub container_format: String,
    pub source_codec: String,
    pub status: JobStatus,
    /// In `[0, 100]`; meaningful while running.
    pub progress_percent: f64,
    pub live_stats: Option<LiveStats>,
    /// Reason attached when a batch failure forced the job to `Failed`.
    pub error_reason: Option<String>,
    /// Unix timestamp (milliseconds) when the job was created.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of the last mutation.
    pub updated_at: i64,
}

impl Job {
    pub(crate) fn touch(&mut self) {
        self.updated_at = current_timestamp_ms();
    }

    pub(crate) fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.touch();
    }

    pub(crate) fn set_progress(&mut self, percent: f64) {
        self.progress_percent = clamp_percent(percent);
        self.touch();
    }

    /// Put the job back in the queue for a new batch.
    pub(crate) fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.progress_percent = 0.0;
        self.error_reason = None;
        self.touch();
    }

    pub(crate) fn fail(&mut self, reason: &str) {
        self.status = JobStatus::Failed;
        self.error_reason = Some(reason.to_string());
        self.touch();
    }

    /// Display label for the source, e.g. `"mov,mp4 (h264)"`.
    pub fn format_label(&self) -> String {
        format!("{} ({})", self.container_format, self.source_codec)
    }
}

/// Clamp a percentage into `[0, 100]`; NaN becomes 0.
pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Creates a pending job from a discovery report with a fresh UUID.
pub fn create_job(meta: &FileDiscovered) -> Job {
    let now = current_timestamp_ms();

    Job {
        id: Uuid::new_v4().to_string(),
        path: meta.path.clone(),
        name: meta.name.clone(),
        size_bytes: meta.size_bytes,
        duration_seconds: meta.duration_seconds,
        container_format: meta.container_format.clone(),
        source_codec: meta.codec.clone(),
        status: JobStatus::Pending,
        progress_percent: 0.0,
        live_stats: None,
        error_reason: None,
        created_at: now,
        updated_at: now,
    }
}
