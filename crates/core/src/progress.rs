//! Per-job and overall progress math.

use crate::jobs::{clamp_percent, Job, JobStatus};
use crate::timefmt::parse_clock;

/// Percentage of `total_seconds` covered by `elapsed_seconds`, clamped to `[0, 100]`.
///
/// A zero, negative or non-finite total yields 0.
pub fn job_percent(elapsed_seconds: f64, total_seconds: f64) -> f64 {
    if !total_seconds.is_finite() || total_seconds <= 0.0 {
        return 0.0;
    }
    clamp_percent(elapsed_seconds / total_seconds * 100.0)
}

/// Percentage for an engine time stamp against a known duration.
///
/// The duration counts in whole seconds, as it is shown (`m:ss`). Returns
/// `None` when the stamp cannot be parsed, so callers can keep the previous
/// value.
pub fn percent_from_clock(time: &str, total_seconds: f64) -> Option<f64> {
    let elapsed = parse_clock(time).ok()?;
    Some(job_percent(elapsed, total_seconds.floor()))
}

/// Overall completion across every job.
///
/// Completed jobs count as 100, running jobs as their own percentage, pending
/// and failed jobs as 0; the sum is divided by the job count. Always a full
/// fold over `jobs` so out-of-order updates cannot drift the total.
pub fn overall_percent<'a, I>(jobs: I) -> f64
where
    I: IntoIterator<Item = &'a Job>,
{
    let (count, sum) = jobs.into_iter().fold((0usize, 0.0_f64), |(count, sum), job| {
        let contribution = match job.status {
            JobStatus::Completed => 100.0,
            JobStatus::Running => clamp_percent(job.progress_percent),
            JobStatus::Pending | JobStatus::Failed => 0.0,
        };
        (count + 1, sum + contribution)
    });

    if count == 0 {
        return 0.0;
    }
    clamp_percent(sum / count as f64)
}
