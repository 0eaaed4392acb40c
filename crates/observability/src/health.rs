//! Health-Check-Endpunkt
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Verbindungen und Raeumen

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::RelayMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Verbindungslimit erreicht, neue Clients werden abgewiesen
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_clients: i64,
    pub rooms_active: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub metriken: RelayMetrics,
    pub max_clients: u32,
}

impl HealthState {
    pub fn neu(metriken: RelayMetrics, max_clients: u32) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
            max_clients,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Momentaufnahme des Relay-Zustands
    pub fn antwort(&self) -> HealthResponse {
        let connected_clients = self.metriken.connected_clients.get();
        let status = if connected_clients >= i64::from(self.max_clients) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            connected_clients,
            rooms_active: self.metriken.rooms_active.get(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Relay-Status zurueck
///
/// Auch `degraded` antwortet mit 200, der Health-Check soll nicht failen.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}
