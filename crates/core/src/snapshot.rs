//! Point-in-time view of the registry for reporting.

use crate::controller::ActivityFlags;
use crate::jobs::{Job, JobStatus};
use crate::registry::JobRegistry;
use crate::timefmt::{format_duration, format_size};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One row of the job table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRow {
    #[serde(flatten)]
    pub job: Job,
    pub selected: bool,
    /// `m:ss`
    pub duration_label: String,
    /// `X.XXMB` / `X.XXGB`
    pub size_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobRow>,
    pub selected_count: usize,
    pub overall_progress: f64,
    pub encoding: bool,
    pub analysing: bool,
    pub pending_jobs: usize,
    pub running_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
}

impl RegistrySnapshot {
    pub fn capture(registry: &JobRegistry, flags: &ActivityFlags) -> Self {
        let count = |status: JobStatus| {
            registry
                .jobs()
                .iter()
                .filter(|job| job.status == status)
                .count()
        };

        let jobs = registry
            .jobs()
            .iter()
            .map(|job| JobRow {
                selected: registry.selection().contains(&job.id),
                duration_label: format_duration(job.duration_seconds),
                size_label: format_size(job.size_bytes),
                job: job.clone(),
            })
            .collect();

        Self {
            timestamp_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
            jobs,
            selected_count: registry.selection().len(),
            overall_progress: registry.overall_progress(),
            encoding: flags.is_encoding(),
            analysing: flags.is_analysing(),
            pending_jobs: count(JobStatus::Pending),
            running_jobs: count(JobStatus::Running),
            completed_jobs: count(JobStatus::Completed),
            failed_jobs: count(JobStatus::Failed),
        }
    }
}
