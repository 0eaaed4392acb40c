//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Wird als `Arc<SignalingState>` zwischen allen Verbindungs-Tasks beider
//! Transporte geteilt.

use rekor_observability::RelayMetrics;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::broadcast::{EventBroadcaster, SEND_QUEUE_GROESSE};
use crate::router::SignalingRouter;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale gleichzeitige Verbindungen (beide Transporte zusammen)
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der ausgehenden Queue pro Verbindung
    pub send_queue_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: SEND_QUEUE_GROESSE,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    /// Pairing-Router (haelt die Registry)
    pub router: SignalingRouter,
    /// Send-Queues aller Verbindungen
    pub broadcaster: EventBroadcaster,
    pub metriken: RelayMetrics,
    /// Freie Verbindungsplaetze, ein Permit pro laufender Verbindung
    plaetze: Arc<Semaphore>,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig, metriken: RelayMetrics) -> Arc<Self> {
        let broadcaster =
            EventBroadcaster::mit_konfig(config.send_queue_groesse, Some(metriken.clone()));
        let plaetze = Arc::new(Semaphore::new(config.max_clients as usize));
        Arc::new(Self {
            config: Arc::new(config),
            router: SignalingRouter::mit_metriken(metriken.clone()),
            broadcaster,
            metriken,
            plaetze,
        })
    }

    /// Reserviert einen Verbindungsplatz, `None` wenn das Limit erreicht ist
    ///
    /// Muss vor dem Spawn bzw. Upgrade aufgerufen werden. Der Platz wird
    /// frei, sobald das Permit gedroppt wird.
    pub fn platz_reservieren(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.plaetze).try_acquire_owned().ok()
    }

    /// Anzahl noch freier Verbindungsplaetze
    pub fn freie_plaetze(&self) -> usize {
        self.plaetze.available_permits()
    }
}
