//! Canonical job store.
//!
//! [`JobRegistry`] is the only writer of job membership, job status and the
//! selection set. Every engine event maps to exactly one registry call, and
//! overall progress is recomputed from the full job list after each one.

use crate::events::{EncodingProgress, FileDiscovered, ProgressStatus};
use crate::jobs::{create_job, Job, JobStatus, LiveStats};
use crate::progress::{overall_percent, percent_from_clock};
use crate::selection::SelectionSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry shared between the dispatcher task, the controller and the status server.
pub type SharedRegistry = Arc<RwLock<JobRegistry>>;

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<Job>,
    selection: SelectionSet,
    overall_progress: f64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Jobs in discovery order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn by_path(&self, path: &Path) -> Option<&Job> {
        self.jobs.iter().find(|job| job.path == path)
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn overall_progress(&self) -> f64 {
        self.overall_progress
    }

    /// Create a job for a newly described file and select it.
    ///
    /// Returns the id of the new job, or `None` when the path is already
    /// tracked (repeat discoveries are no-ops).
    pub fn upsert_from_discovery(&mut self, meta: &FileDiscovered) -> Option<String> {
        if self.by_path(&meta.path).is_some() {
            log::debug!("{} already tracked, ignoring discovery", meta.path.display());
            return None;
        }

        let job = create_job(meta);
        let id = job.id.clone();
        log::debug!("tracking {} as job {}", meta.path.display(), id);
        self.jobs.push(job);
        self.selection.add(&id);
        self.recompute_overall();
        Some(id)
    }

    /// Drop the given jobs and prune them from the selection.
    ///
    /// Unknown ids are ignored. Returns the number of jobs removed.
    pub fn remove_by_ids<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let before = self.jobs.len();
        for id in ids {
            let id = id.as_ref();
            self.jobs.retain(|job| job.id != id);
            self.selection.remove(id);
        }
        let removed = before - self.jobs.len();
        if removed > 0 {
            self.recompute_overall();
        }
        removed
    }

    /// Remove every selected job. Returns the number of jobs removed.
    pub fn remove_selected(&mut self) -> usize {
        let ids = self.selection.to_vec();
        let removed = self.remove_by_ids(&ids);
        self.selection.clear();
        removed
    }

    pub fn remove_all(&mut self) {
        self.jobs.clear();
        self.selection.clear();
        self.overall_progress = 0.0;
    }

    /// Select a tracked job. Returns false for unknown ids.
    pub fn select(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.selection.add(id);
        true
    }

    /// Returns whether the id was selected.
    pub fn deselect(&mut self, id: &str) -> bool {
        self.selection.remove(id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn select_all(&mut self) {
        for job in &self.jobs {
            self.selection.add(&job.id);
        }
    }

    /// Selected jobs in registry order.
    pub fn selected_jobs(&self) -> Vec<&Job> {
        self.jobs
            .iter()
            .filter(|job| self.selection.contains(&job.id))
            .collect()
    }

    /// Apply one progress report to the job named `event.filename`.
    ///
    /// Jobs from different directories can share a name. The report then goes
    /// to the running one, else the first pending job in the selection, else
    /// the first pending job, else the first match (where a terminal status
    /// makes it stale). Returns false when no job matched or the report was
    /// stale.
    pub fn apply_progress(&mut self, event: &EncodingProgress) -> bool {
        let Some(index) = self.progress_target(&event.filename) else {
            log::debug!("progress for {} matched no job, dropped", event.filename);
            return false;
        };

        let applied = apply_to_job(&mut self.jobs[index], event);
        if applied {
            self.recompute_overall();
        }
        applied
    }

    fn progress_target(&self, filename: &str) -> Option<usize> {
        let rank = |job: &Job| match job.status {
            JobStatus::Running => 0,
            JobStatus::Pending if self.selection.contains(&job.id) => 1,
            JobStatus::Pending => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        };
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.name == filename)
            .min_by_key(|(_, job)| rank(job))
            .map(|(index, _)| index)
    }

    /// Put the given jobs back to `Pending` at 0% for a new batch.
    pub fn reset_for_batch<S: AsRef<str>>(&mut self, ids: &[S]) {
        for job in self.jobs.iter_mut() {
            if ids.iter().any(|id| id.as_ref() == job.id) {
                job.reset();
            }
        }
        self.recompute_overall();
    }

    /// Fail every given job that is still running. Returns the number failed.
    pub fn mark_failed<S: AsRef<str>>(&mut self, ids: &[S], reason: &str) -> usize {
        let mut failed = 0;
        for job in self.jobs.iter_mut() {
            if job.status == JobStatus::Running && ids.iter().any(|id| id.as_ref() == job.id) {
                job.fail(reason);
                failed += 1;
            }
        }
        failed
    }

    pub fn recompute_overall(&mut self) {
        self.overall_progress = overall_percent(&self.jobs);
    }

    /// Override the overall percentage until the next recompute.
    pub fn set_overall(&mut self, percent: f64) {
        self.overall_progress = crate::jobs::clamp_percent(percent);
    }
}

fn apply_to_job(job: &mut Job, event: &EncodingProgress) -> bool {
    let next = JobStatus::from(event.status);

    if job.status == JobStatus::Pending && next.is_terminal() {
        // Reports that skip the start still go through Running.
        job.set_status(JobStatus::Running);
    }
    if !job.status.can_advance_to(next) {
        log::debug!(
            "ignoring stale {} report for {} ({})",
            next,
            job.name,
            job.status
        );
        return false;
    }

    job.set_status(next);
    match event.status {
        ProgressStatus::Completed => job.set_progress(100.0),
        ProgressStatus::Running | ProgressStatus::Failed => {
            if let Some(percent) = percent_from_clock(&event.time, job.duration_seconds) {
                job.set_progress(percent);
            }
        }
    }

    if !event.time.is_empty() || event.frame > 0 {
        job.live_stats = Some(LiveStats {
            frame: event.frame,
            fps: event.fps,
            elapsed_time: event.time.clone(),
            output_size_bytes: event.output_size_bytes,
            bitrate_kbps: event.bitrate_kbps,
            speed_factor: event.speed,
        });
    }
    true
}
