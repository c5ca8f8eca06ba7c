//! Routes engine events into the registry.
//!
//! The dispatcher owns the subscriptions on all three channels for its whole
//! lifetime. A single task drains them, so every registry mutation caused by
//! an event happens on one logical thread and progress for a given file is
//! applied in delivery order.

use crate::engine::EncodingEngine;
use crate::events::{EngineEvent, EventChannel, EventHub, HubError};
use crate::registry::SharedRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Waits for the dispatcher to catch up with its hub.
///
/// Cloned out of a running [`EventDispatcher`] so other components can make
/// sure queued events are applied before they correct registry state.
#[derive(Debug, Clone)]
pub struct RoutingWatch {
    hub: EventHub,
    delivered_before: u64,
    routed: watch::Receiver<u64>,
}

impl RoutingWatch {
    /// Wait until every event the hub has delivered so far has been routed.
    ///
    /// Returns at once if the routing task has stopped.
    pub async fn caught_up(&self) {
        let target = self.hub.delivered_count().saturating_sub(self.delivered_before);
        let mut routed = self.routed.clone();
        if routed.wait_for(|count| *count >= target).await.is_err() {
            log::debug!("event dispatcher stopped before routing {} event(s)", target);
        }
    }
}

pub struct EventDispatcher {
    hub: EventHub,
    live: Arc<AtomicBool>,
    watch: RoutingWatch,
    task: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Subscribe to every channel on `hub` and start routing.
    ///
    /// Fails without side effects if any channel already has a subscriber.
    pub fn start<E: EncodingEngine>(
        hub: EventHub,
        registry: SharedRegistry,
        engine: Arc<E>,
    ) -> Result<Self, HubError> {
        let subs = hub.subscribe_all()?;
        let live = Arc::new(AtomicBool::new(true));
        let (routed_tx, routed_rx) = watch::channel(0u64);
        let task = tokio::spawn(route_events(
            Arc::clone(&live),
            routed_tx,
            registry,
            engine,
            subs.discovery,
            subs.discovery_errors,
            subs.progress,
        ));
        log::debug!("event dispatcher started");

        let watch = RoutingWatch {
            hub: hub.clone(),
            delivered_before: subs.delivered_before,
            routed: routed_rx,
        };
        Ok(Self {
            hub,
            live,
            watch,
            task: Some(task),
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn routing_watch(&self) -> RoutingWatch {
        self.watch.clone()
    }

    /// Wait until every event delivered so far has been routed.
    pub async fn wait_idle(&self) {
        self.watch.caught_up().await;
    }

    /// Stop routing and release the subscriptions.
    ///
    /// Events still queued when this is called are discarded.
    pub async fn shutdown(mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("event dispatcher task ended abnormally: {}", e);
                }
            }
        }
    }

    fn teardown(&mut self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        for channel in EventChannel::ALL {
            self.hub.unsubscribe(channel);
        }
        log::debug!("event dispatcher stopped");
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn route_events<E: EncodingEngine>(
    live: Arc<AtomicBool>,
    routed: watch::Sender<u64>,
    registry: SharedRegistry,
    engine: Arc<E>,
    mut discovery: UnboundedReceiver<EngineEvent>,
    mut errors: UnboundedReceiver<EngineEvent>,
    mut progress: UnboundedReceiver<EngineEvent>,
) {
    loop {
        // Discoveries first, so progress never races ahead of the job it targets.
        let event = tokio::select! {
            biased;
            Some(event) = discovery.recv() => event,
            Some(event) = errors.recv() => event,
            Some(event) = progress.recv() => event,
            else => break,
        };

        if !live.load(Ordering::Acquire) {
            log::debug!("dispatcher torn down, dropping {} event", event.channel());
            break;
        }
        route(event, &registry, engine.as_ref()).await;
        routed.send_modify(|count| *count += 1);
    }
}

/// Apply one event. Each event maps to exactly one registry operation or one
/// user notification.
async fn route<E: EncodingEngine>(event: EngineEvent, registry: &SharedRegistry, engine: &E) {
    match event {
        EngineEvent::Discovered(meta) => {
            registry.write().await.upsert_from_discovery(&meta);
        }
        EngineEvent::DiscoveryFailed(failure) => {
            let subject = failure
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "file".to_string());
            log::warn!("could not analyse {}: {}", subject, failure.message);
            engine.notify_user("File analysis failed", &failure.message);
        }
        EngineEvent::Progress(report) => {
            registry.write().await.apply_progress(&report);
        }
    }
}
