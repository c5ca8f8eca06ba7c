//! Read-only HTTP view of the job registry.

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use thiserror::Error;

use crate::controller::ActivityFlags;
use crate::registry::SharedRegistry;
use crate::snapshot::RegistrySnapshot;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("status server stopped: {0}")]
    Serve(#[from] std::io::Error),
}

#[derive(Clone)]
struct StatusState {
    registry: SharedRegistry,
    flags: Arc<ActivityFlags>,
}

async fn get_jobs(State(state): State<StatusState>) -> Json<RegistrySnapshot> {
    let registry = state.registry.read().await;
    Json(RegistrySnapshot::capture(&registry, &state.flags))
}

pub fn create_status_router(registry: SharedRegistry, flags: Arc<ActivityFlags>) -> Router {
    Router::new()
        .route("/jobs", get(get_jobs))
        .with_state(StatusState { registry, flags })
}

/// Serve `GET /jobs` on `bind` until the task is dropped.
pub async fn run_status_server(
    bind: &str,
    registry: SharedRegistry,
    flags: Arc<ActivityFlags>,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    log::info!("status server listening on http://{}/jobs", bind);

    axum::serve(listener, create_status_router(registry, flags)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EncodingProgress, ProgressStatus};
    use crate::registry::JobRegistry;
    use crate::testing::discovered;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_get_jobs_returns_snapshot() {
        let registry = JobRegistry::shared();
        {
            let mut reg = registry.write().await;
            reg.upsert_from_discovery(&discovered("a.mp4", 120.0));
            reg.upsert_from_discovery(&discovered("b.mp4", 120.0));
            reg.apply_progress(&EncodingProgress {
                time: "0:30".to_string(),
                ..EncodingProgress::status_only("a.mp4", ProgressStatus::Running)
            });
        }

        let router = create_status_router(registry, Arc::new(ActivityFlags::default()));
        let (status, body) = get(router, "/jobs").await;
        assert_eq!(status, StatusCode::OK);

        let snapshot: RegistrySnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.jobs.len(), 2);
        assert_eq!(snapshot.running_jobs, 1);
        assert_eq!(snapshot.selected_count, 2);
        assert_eq!(snapshot.overall_progress, 12.5);
        assert_eq!(snapshot.jobs[0].job.name, "a.mp4");
        assert_eq!(snapshot.jobs[0].job.progress_percent, 25.0);
    }

    #[tokio::test]
    async fn test_json_field_names() {
        let router = create_status_router(JobRegistry::shared(), Arc::new(ActivityFlags::default()));
        let (_, body) = get(router, "/jobs").await;
        let json = String::from_utf8(body).unwrap();
        for field in ["jobs", "overall_progress", "selected_count", "encoding", "analysing"] {
            assert!(json.contains(field), "missing {}", field);
        }
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let router = create_status_router(JobRegistry::shared(), Arc::new(ActivityFlags::default()));
        let (status, _) = get(router, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_error() {
        let err = run_status_server(
            "not-an-address",
            JobRegistry::shared(),
            Arc::new(ActivityFlags::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
