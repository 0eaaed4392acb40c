//! Prometheus-kompatible Metriken fuer das Relay
//!
//! Registrierte Metriken:
//! - `rekor_connected_clients` – Gauge: Aktuell verbundene Clients
//! - `rekor_rooms_active` – Gauge: Existierende Raeume
//! - `rekor_joins_total` – Counter: Beitrittsversuche (result = accepted/full/rejected)
//! - `rekor_signals_forwarded_total` – Counter: Weitergeleitete Signale (kind)
//! - `rekor_dropped_events_total` – Counter: Verworfene ausgehende Events
//! - `rekor_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `rekor_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Ergebnis-Label fuer `rekor_joins_total`
pub const JOIN_ANGENOMMEN: &str = "accepted";
pub const JOIN_RAUM_VOLL: &str = "full";
pub const JOIN_ABGELEHNT: &str = "rejected";

/// Alle Relay-Metriken
///
/// Clone teilt die Registry und alle Zaehler.
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    // Relay-Metriken
    pub connected_clients: IntGauge,
    pub rooms_active: IntGauge,
    pub joins_total: IntCounterVec,
    pub signals_forwarded_total: IntCounterVec,
    pub dropped_events_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "rekor_connected_clients",
            "Anzahl aktuell verbundener Clients",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let rooms_active = IntGauge::with_opts(Opts::new(
            "rekor_rooms_active",
            "Anzahl existierender Raeume",
        ))?;
        registry.register(Box::new(rooms_active.clone()))?;

        let joins_total = IntCounterVec::new(
            Opts::new("rekor_joins_total", "Beitrittsversuche nach Ergebnis"),
            &["result"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let signals_forwarded_total = IntCounterVec::new(
            Opts::new(
                "rekor_signals_forwarded_total",
                "Weitergeleitete Signaling-Nachrichten nach Art",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(signals_forwarded_total.clone()))?;

        let dropped_events_total = IntCounter::with_opts(Opts::new(
            "rekor_dropped_events_total",
            "Verworfene ausgehende Events (Queue voll oder Client getrennt)",
        ))?;
        registry.register(Box::new(dropped_events_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("rekor_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "rekor_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            rooms_active,
            joins_total,
            signals_forwarded_total,
            dropped_events_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt einen Beitrittsversuch
    pub fn join_zaehlen(&self, ergebnis: &str) {
        self.joins_total.with_label_values(&[ergebnis]).inc();
    }

    /// Zaehlt eine weitergeleitete Signaling-Nachricht
    pub fn signal_zaehlen(&self, kind: &str) {
        self.signals_forwarded_total.with_label_values(&[kind]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
