//! Healthcheck endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::monitor::{HealthStatus, Monitor};

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(monitor)
}

/// Answers even while a cycle is running or after a failed one.
async fn health_check(State(monitor): State<Arc<Monitor>>) -> Json<HealthStatus> {
    Json(monitor.health())
}

/// Bind and serve until the task is dropped.
pub async fn serve(monitor: Arc<Monitor>, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("[HEALTH] Listening on http://{}/health", addr);

    if let Err(e) = axum::serve(listener, create_router(monitor)).await {
        error!("[HEALTH] Server stopped: {}", e);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::PolicyConfig;
    use crate::monitor::MonitorSettings;
    use common::acquisition::MockPriceSource;
    use common::notifier::MockNotifier;
    use common::{PriceStore, QuarantineLog};
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_endpoint_reports_idle_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = Arc::new(Monitor::new(
            Arc::new(MockPriceSource::new()),
            Arc::new(PriceStore::open(dir.path().join("state.json")).unwrap()),
            Arc::new(MockNotifier::new()),
            QuarantineLog::new(dir.path().join("quarantine.json")),
            PolicyConfig::default(),
            MonitorSettings {
                catalog_path: dir.path().join("products.json"),
                item_delay: Duration::ZERO,
                item_jitter: Duration::ZERO,
                quarantine_threshold: 3,
                purge_on_quarantine: false,
            },
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(monitor)).await.unwrap();
        });

        let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["cycle_in_progress"], false);
        assert_eq!(body["cycles_completed"], 0);
        assert!(body["last_cycle_finished_at"].is_null());
    }
}
