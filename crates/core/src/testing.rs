//! Test doubles shared by the unit tests.

use crate::capability::{CodecInfo, HardwareClass};
use crate::engine::{EncodingEngine, EngineError};
use crate::events::{EncodingProgress, EngineEvent, EventHub, FileDiscovered};
use crate::jobs::{create_job, Job, JobStatus};
use crate::options::EncodingOptions;
use std::path::PathBuf;
use std::sync::Mutex;

/// Discovery report for `/media/<name>`.
pub fn discovered(name: &str, duration_seconds: f64) -> FileDiscovered {
    FileDiscovered {
        name: name.to_string(),
        size_bytes: 52_428_800,
        duration_seconds,
        container_format: "mov".to_string(),
        codec: "h264".to_string(),
        path: PathBuf::from("/media").join(name),
    }
}

/// A job in an arbitrary state, bypassing the status machine.
pub fn job_with(name: &str, status: JobStatus, percent: f64) -> Job {
    let mut job = create_job(&discovered(name, 120.0));
    job.status = status;
    job.progress_percent = percent;
    job
}

#[derive(Debug, Default)]
struct Calls {
    discovery_requests: Vec<Vec<PathBuf>>,
    batches: Vec<(Vec<PathBuf>, EncodingOptions)>,
    notifications: Vec<(String, String)>,
}

/// In-memory engine that replays canned events on its hub.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    hub: EventHub,
    discovery_events: Vec<EngineEvent>,
    progress_events: Vec<EncodingProgress>,
    fail_batch: bool,
    calls: Mutex<Calls>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hub(mut self, hub: EventHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn on_discovery(mut self, events: Vec<EngineEvent>) -> Self {
        self.discovery_events = events;
        self
    }

    pub fn with_progress(mut self, events: Vec<EncodingProgress>) -> Self {
        self.progress_events = events;
        self
    }

    /// Replay `events`, then fail the batch call.
    pub fn fail_batch_after(mut self, events: Vec<EncodingProgress>) -> Self {
        self.progress_events = events;
        self.fail_batch = true;
        self
    }

    pub fn discovery_requests(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap().discovery_requests.clone()
    }

    pub fn batches(&self) -> Vec<(Vec<PathBuf>, EncodingOptions)> {
        self.calls.lock().unwrap().batches.clone()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().notifications.clone()
    }
}

impl EncodingEngine for ScriptedEngine {
    async fn discover_files(&self, paths: Vec<PathBuf>) -> Result<(), EngineError> {
        self.calls.lock().unwrap().discovery_requests.push(paths);
        for event in &self.discovery_events {
            self.hub.emit(event.clone());
        }
        Ok(())
    }

    async fn list_available_codecs(&self) -> Result<Vec<CodecInfo>, EngineError> {
        Ok(vec![
            CodecInfo::new("h264", "H.264 (CPU)", HardwareClass::Cpu, &["mp4"]),
            CodecInfo::new("hevc", "HEVC (CPU)", HardwareClass::Cpu, &["mp4"]),
            CodecInfo::new("vp8", "VP8", HardwareClass::Cpu, &["webm"]),
            CodecInfo::new("vp9", "VP9", HardwareClass::Cpu, &["webm"]),
        ])
    }

    async fn start_batch_encode(
        &self,
        paths: Vec<PathBuf>,
        options: EncodingOptions,
    ) -> Result<(), EngineError> {
        let first = paths.first().cloned().unwrap_or_default();
        self.calls.lock().unwrap().batches.push((paths, options));

        for event in &self.progress_events {
            self.hub.emit(EngineEvent::Progress(event.clone()));
        }

        if self.fail_batch {
            return Err(EngineError::EncodeFailed {
                path: first,
                detail: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn notify_user(&self, title: &str, body: &str) {
        self.calls
            .lock()
            .unwrap()
            .notifications
            .push((title.to_string(), body.to_string()));
    }
}
