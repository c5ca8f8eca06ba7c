//! Events pushed by the encoding engine and the hub that routes them.
//!
//! Each channel carries one fixed-schema payload; engines emit these types
//! directly, so nothing past this module inspects untyped payloads.

use crate::jobs::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

/// A file the engine managed to describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiscovered {
    pub name: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub container_format: String,
    pub codec: String,
    pub path: PathBuf,
}

/// A file (or directory) the engine could not describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiscoveryFailed {
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub message: String,
}

/// Status carried on a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[serde(alias = "processing")]
    Running,
    Completed,
    Failed,
}

impl From<ProgressStatus> for JobStatus {
    fn from(status: ProgressStatus) -> Self {
        match status {
            ProgressStatus::Running => JobStatus::Running,
            ProgressStatus::Completed => JobStatus::Completed,
            ProgressStatus::Failed => JobStatus::Failed,
        }
    }
}

/// One progress report for a file being encoded.
///
/// `progress_percent` is advisory; the registry recomputes the percentage
/// from `time` and the job's known duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingProgress {
    pub filename: String,
    #[serde(default)]
    pub frame: u64,
    #[serde(default)]
    pub fps: f64,
    /// Elapsed media time, `m:ss[.frac]` or `hh:mm:ss.ff`; may be empty.
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub output_size_bytes: u64,
    #[serde(default)]
    pub bitrate_kbps: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub progress_percent: f64,
    pub status: ProgressStatus,
}

impl EncodingProgress {
    /// A report carrying only a status, as sent at the start and end of a file.
    pub fn status_only(filename: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            filename: filename.into(),
            frame: 0,
            fps: 0.0,
            time: String::new(),
            output_size_bytes: 0,
            bitrate_kbps: 0.0,
            speed: 0.0,
            progress_percent: 0.0,
            status,
        }
    }
}

/// The three push channels an engine publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    Discovery,
    DiscoveryError,
    Progress,
}

impl EventChannel {
    pub const ALL: [EventChannel; 3] = [
        EventChannel::Discovery,
        EventChannel::DiscoveryError,
        EventChannel::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventChannel::Discovery => "file_discovered",
            EventChannel::DiscoveryError => "file_discovery_failed",
            EventChannel::Progress => "encoding_progress",
        }
    }
}

impl std::fmt::Display for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Discovered(FileDiscovered),
    DiscoveryFailed(FileDiscoveryFailed),
    Progress(EncodingProgress),
}

impl EngineEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            EngineEvent::Discovered(_) => EventChannel::Discovery,
            EngineEvent::DiscoveryFailed(_) => EventChannel::DiscoveryError,
            EngineEvent::Progress(_) => EventChannel::Progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("channel {0} already has a subscriber")]
    AlreadySubscribed(EventChannel),
}

/// Receivers for every channel, as returned by [`EventHub::subscribe_all`].
#[derive(Debug)]
pub struct Subscriptions {
    pub discovery: mpsc::UnboundedReceiver<EngineEvent>,
    pub discovery_errors: mpsc::UnboundedReceiver<EngineEvent>,
    pub progress: mpsc::UnboundedReceiver<EngineEvent>,
    /// Hub deliveries made before these subscriptions existed.
    pub delivered_before: u64,
}

type Subscribers = HashMap<EventChannel, mpsc::UnboundedSender<EngineEvent>>;

/// Fan-in point between an engine and the single consumer of its events.
///
/// Each channel has at most one subscriber. Events emitted on a channel with
/// no subscriber are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Subscribers>>,
    delivered: Arc<AtomicU64>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(
        &self,
        channel: EventChannel,
    ) -> Result<mpsc::UnboundedReceiver<EngineEvent>, HubError> {
        let mut subscribers = self.lock();
        if subscribers.contains_key(&channel) {
            return Err(HubError::AlreadySubscribed(channel));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        subscribers.insert(channel, tx);
        Ok(rx)
    }

    /// Subscribe to all three channels at once.
    ///
    /// Either every channel is taken or none is.
    pub fn subscribe_all(&self) -> Result<Subscriptions, HubError> {
        let mut subscribers = self.lock();
        if let Some(taken) = EventChannel::ALL
            .into_iter()
            .find(|channel| subscribers.contains_key(channel))
        {
            return Err(HubError::AlreadySubscribed(taken));
        }

        let mut open = |channel| {
            let (tx, rx) = mpsc::unbounded_channel();
            subscribers.insert(channel, tx);
            rx
        };
        let discovery = open(EventChannel::Discovery);
        let discovery_errors = open(EventChannel::DiscoveryError);
        let progress = open(EventChannel::Progress);

        Ok(Subscriptions {
            discovery,
            discovery_errors,
            progress,
            // Read under the lock: every later delivery goes to these receivers.
            delivered_before: self.delivered.load(Ordering::Acquire),
        })
    }

    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, channel: EventChannel) -> bool {
        self.lock().remove(&channel).is_some()
    }

    pub fn is_subscribed(&self, channel: EventChannel) -> bool {
        self.lock().contains_key(&channel)
    }

    /// Deliver an event to its channel's subscriber. Returns whether it was delivered.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let channel = event.channel();
        let mut subscribers = self.lock();
        let Some(tx) = subscribers.get(&channel) else {
            log::debug!("no subscriber on {}, dropping event", channel);
            return false;
        };
        if tx.send(event).is_err() {
            // Receiver went away without unsubscribing.
            subscribers.remove(&channel);
            log::debug!("subscriber on {} is gone, dropping event", channel);
            return false;
        }
        self.delivered.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Events handed to a subscriber since the hub was created, across all channels.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }
}
