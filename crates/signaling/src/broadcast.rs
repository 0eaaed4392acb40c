//! Event-Broadcaster – Stellt ausgehende Events an Verbindungen zu
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen Clients.
//! Der Router berechnet `Zustellung`en, der Broadcaster reiht sie in die
//! Queue der Zielverbindung ein, und der Verbindungs-Task schreibt sie auf
//! den Socket.
//!
//! Senden blockiert nie: ist eine Queue voll oder geschlossen, wird das
//! Event verworfen und gezaehlt.

use dashmap::DashMap;
use rekor_core::types::ConnectionId;
use rekor_observability::RelayMetrics;
use rekor_protocol::events::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::router::Zustellung;

/// Standard-Groesse der Send-Queue pro Client
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub conn: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ClientSender {
    /// Sendet ein Event nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    conn = %self.conn,
                    event = event.name(),
                    "Send-Queue voll – Event verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(conn = %self.conn, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Client-Sender, indiziert nach ConnectionId
    clients: DashMap<ConnectionId, ClientSender>,
    queue_groesse: usize,
    metriken: Option<RelayMetrics>,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu() -> Self {
        Self::mit_konfig(SEND_QUEUE_GROESSE, None)
    }

    /// Erstellt einen Broadcaster mit eigener Queue-Groesse und Metriken
    pub fn mit_konfig(queue_groesse: usize, metriken: Option<RelayMetrics>) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
                metriken,
            }),
        }
    }

    /// Registriert eine neue Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt auf den Socket.
    pub fn client_registrieren(&self, conn: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner.clients.insert(conn, ClientSender { conn, tx });
        if let Some(m) = &self.inner.metriken {
            m.connected_clients.set(self.inner.clients.len() as i64);
        }
        tracing::debug!(conn = %conn, "Client im Broadcaster registriert");
        rx
    }

    /// Entfernt eine Verbindung aus dem Broadcaster
    pub fn client_entfernen(&self, conn: &ConnectionId) {
        if self.inner.clients.remove(conn).is_some() {
            if let Some(m) = &self.inner.metriken {
                m.connected_clients.set(self.inner.clients.len() as i64);
            }
            tracing::debug!(conn = %conn, "Client aus Broadcaster entfernt");
        }
    }

    /// Sendet ein Event an eine einzelne Verbindung
    ///
    /// Gibt `true` zurueck wenn die Verbindung gefunden und das Event eingereiht wurde.
    pub fn an_client_senden(&self, conn: &ConnectionId, event: ServerEvent) -> bool {
        let gesendet = match self.inner.clients.get(conn) {
            Some(sender) => sender.senden(event),
            None => {
                tracing::debug!(conn = %conn, "Senden an unbekannte Verbindung");
                false
            }
        };

        if !gesendet {
            if let Some(m) = &self.inner.metriken {
                m.dropped_events_total.inc();
            }
        }
        gesendet
    }

    /// Liefert alle Zustellungen des Routers aus
    ///
    /// Gibt die Anzahl der erfolgreich eingereihten Events zurueck.
    pub fn zustellen(&self, zustellungen: Vec<Zustellung>) -> usize {
        zustellungen
            .into_iter()
            .map(|z| self.an_client_senden(&z.ziel, z.event))
            .filter(|eingereiht| *eingereiht)
            .count()
    }

    /// Gibt die Anzahl der registrierten Verbindungen zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob eine Verbindung registriert ist
    pub fn ist_registriert(&self, conn: &ConnectionId) -> bool {
        self.inner.clients.contains_key(conn)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
