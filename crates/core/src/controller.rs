//! Batch orchestration: discovery admission, batch start and failure handling.

use crate::capability::CodecInfo;
use crate::dispatcher::RoutingWatch;
use crate::engine::{EncodingEngine, EngineError};
use crate::options::OptionsDraft;
use crate::registry::SharedRegistry;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no files selected for encoding")]
    NoSelection,

    #[error("a batch is already being encoded")]
    BatchInProgress,

    #[error("files are still being analysed, try again when discovery finishes")]
    DiscoveryBusy,

    #[error("{message}: {detail}")]
    BatchEncode { message: String, detail: String },

    #[error("engine request failed: {0}")]
    Engine(#[from] EngineError),
}

/// UI-facing activity flags.
///
/// They gate entry points; they do not serialize the work itself.
#[derive(Debug, Default)]
pub struct ActivityFlags {
    encoding: AtomicBool,
    analysing: AtomicBool,
}

impl ActivityFlags {
    pub fn is_encoding(&self) -> bool {
        self.encoding.load(Ordering::Acquire)
    }

    pub fn is_analysing(&self) -> bool {
        self.analysing.load(Ordering::Acquire)
    }
}

/// Clears a flag when the guarded call finishes, including on early return.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlagGuard(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of a batch whose engine call resolved successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub submitted: usize,
}

pub struct EncodingController<E: EncodingEngine> {
    engine: Arc<E>,
    registry: SharedRegistry,
    flags: Arc<ActivityFlags>,
    routing: RoutingWatch,
}

impl<E: EncodingEngine> EncodingController<E> {
    /// `routing` must watch the dispatcher that feeds `registry` from the
    /// engine's hub.
    pub fn new(engine: Arc<E>, registry: SharedRegistry, routing: RoutingWatch) -> Self {
        Self {
            engine,
            registry,
            flags: Arc::new(ActivityFlags::default()),
            routing,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn flags(&self) -> Arc<ActivityFlags> {
        Arc::clone(&self.flags)
    }

    /// Ask the engine to describe dropped paths.
    ///
    /// Rejected while a previous discovery request is still running. Results
    /// arrive as events, not through the return value.
    pub async fn request_discovery(&self, paths: Vec<PathBuf>) -> Result<(), ControllerError> {
        let Some(_guard) = FlagGuard::acquire(&self.flags.analysing) else {
            log::warn!("discovery already running, ignoring {} new path(s)", paths.len());
            return Err(ControllerError::DiscoveryBusy);
        };

        log::info!("analysing {} path(s)", paths.len());
        self.engine.discover_files(paths).await?;
        Ok(())
    }

    pub async fn available_codecs(&self) -> Result<Vec<CodecInfo>, ControllerError> {
        Ok(self.engine.list_available_codecs().await?)
    }

    /// Encode every selected job with the options in `draft`.
    ///
    /// Per-job outcomes are observed through progress events. If the engine
    /// call itself fails, the events it emitted are routed first; then overall
    /// progress drops to 0 and every selected job still running is marked
    /// failed.
    pub async fn start_batch(&self, draft: &OptionsDraft) -> Result<BatchReport, ControllerError> {
        let (ids, paths) = {
            let registry = self.registry.read().await;
            let selected = registry.selected_jobs();
            if selected.is_empty() {
                log::warn!("start requested with an empty selection");
                return Err(ControllerError::NoSelection);
            }
            let ids: Vec<String> = selected.iter().map(|job| job.id.clone()).collect();
            let paths: Vec<PathBuf> = selected.iter().map(|job| job.path.clone()).collect();
            (ids, paths)
        };

        let Some(_guard) = FlagGuard::acquire(&self.flags.encoding) else {
            log::warn!("start requested while a batch is running");
            return Err(ControllerError::BatchInProgress);
        };

        {
            let mut registry = self.registry.write().await;
            registry.reset_for_batch(&ids);
            registry.set_overall(0.0);
        }

        let options = draft.build();
        log::info!(
            "starting batch of {} file(s): {} / {} ({} {})",
            paths.len(),
            options.video_format,
            options.video_codec,
            options.quality_mode,
            options.quality_value
        );

        match self.engine.start_batch_encode(paths, options).await {
            Ok(()) => {
                log::info!("batch of {} file(s) finished", ids.len());
                self.engine
                    .notify_user("Encoding complete", &format!("{} file(s) processed", ids.len()));
                Ok(BatchReport {
                    submitted: ids.len(),
                })
            }
            Err(e) => {
                let detail = e.to_string();
                self.routing.caught_up().await;
                let failed = {
                    let mut registry = self.registry.write().await;
                    registry.set_overall(0.0);
                    registry.mark_failed(&ids, &detail)
                };
                log::error!("batch failed ({} job(s) marked failed): {}", failed, detail);
                self.engine.notify_user("Encoding failed", &detail);
                Err(ControllerError::BatchEncode {
                    message: "encoding failed".to_string(),
                    detail,
                })
            }
        }
    }

    /// Cancellation intent for the running batch.
    ///
    /// The engine offers no way to interrupt a batch, so this only records
    /// the request.
    pub fn stop_batch(&self) {
        if self.flags.is_encoding() {
            log::warn!("stop requested, but a running batch cannot be cancelled");
        } else {
            log::debug!("stop requested with no batch running");
        }
    }
}
