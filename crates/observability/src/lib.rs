//! # rekor-observability
//!
//! Observability-Crate fuer das Rekor-Relay:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{HealthResponse, HealthState, HealthStatus, health_router};
pub use logging::logging_initialisieren;
pub use metrics::{RelayMetrics, metrics_router};
pub use middleware::{request_timing_layer, timing_middleware};

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;

/// Baut den Observability-Router (Metriken + Health)
pub fn observability_router(metriken: RelayMetrics, max_clients: u32) -> Router {
    Router::new()
        .merge(metrics_router(metriken.clone()))
        .merge(health_router(HealthState::neu(metriken.clone(), max_clients)))
        .route_layer(axum::middleware::from_fn_with_state(
            metriken,
            timing_middleware,
        ))
        .layer(request_timing_layer())
}

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: RelayMetrics,
    max_clients: u32,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let app = observability_router(metriken, max_clients);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

    tracing::info!("Observability-Server gestoppt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpunkt_antwortet() {
        let app = observability_router(RelayMetrics::neu().unwrap(), 16);
        let antwort = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpunkt_liefert_textformat() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.rooms_active.set(3);
        let app = observability_router(metriken, 16);

        let antwort = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);

        let body = axum::body::to_bytes(antwort.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("rekor_rooms_active 3"));
    }
}
