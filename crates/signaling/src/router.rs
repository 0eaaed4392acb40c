//! Signaling-Router – Pairing-Protokoll
//!
//! Uebersetzt eingehende Events einer Verbindung in Registry-Operationen
//! und berechnet die ausgehenden Events. Der Router sendet selbst nichts:
//! er gibt eine Liste von `Zustellung`en zurueck, die der Transport
//! ausliefert.
//!
//! ## Zustand pro Verbindung
//! ```text
//! Unjoined --join--> Joined --disconnect--> (beendet)
//!    ^   |
//!    +---+ room-full
//! ```
//!
//! ## Pairing
//! - 1. Beitritt: `room-joined{1}` an den Beitretenden (Offerer)
//! - 2. Beitritt: `room-joined{2}` an den Beitretenden (Answerer) und
//!   `peer-joined` an den ersten Teilnehmer
//! - 3. Beitritt: `room-full` an den Beitretenden, keine Aenderung

use rekor_core::types::{ConnectionId, RoomId};
use rekor_observability::metrics::{
    JOIN_ABGELEHNT, JOIN_ANGENOMMEN, JOIN_RAUM_VOLL, RelayMetrics,
};
use rekor_protocol::events::{ClientEvent, ErrorCode, ServerEvent, Signal};
use std::sync::Arc;

use crate::registry::{ConnectionRegistry, JoinResult};

/// Ein ausgehendes Event fuer genau eine Verbindung
#[derive(Debug, Clone, PartialEq)]
pub struct Zustellung {
    pub ziel: ConnectionId,
    pub event: ServerEvent,
}

impl Zustellung {
    pub fn neu(ziel: ConnectionId, event: ServerEvent) -> Self {
        Self { ziel, event }
    }
}

/// Router fuer das Pairing- und Weiterleitungsprotokoll
///
/// Clone teilt die Registry.
#[derive(Clone)]
pub struct SignalingRouter {
    registry: Arc<ConnectionRegistry>,
    metriken: Option<RelayMetrics>,
}

impl SignalingRouter {
    /// Erstellt einen Router mit leerer Registry
    pub fn neu() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::neu()),
            metriken: None,
        }
    }

    /// Erstellt einen Router, der Beitritte, Raeume und Signale zaehlt
    pub fn mit_metriken(metriken: RelayMetrics) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::neu()),
            metriken: Some(metriken),
        }
    }

    /// Lesender Zugriff auf die Registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Verarbeitet ein eingehendes Event einer Verbindung
    pub fn verarbeiten(&self, conn: ConnectionId, event: ClientEvent) -> Vec<Zustellung> {
        tracing::trace!(conn = %conn, event = event.name(), "Event empfangen");

        match event {
            ClientEvent::Join(req) => self.beitreten(conn, RoomId::from(req.room_id)),
            ClientEvent::Ping(ping) => {
                vec![Zustellung::neu(
                    conn,
                    ServerEvent::pong(ping.timestamp_ms, jetzt_ms()),
                )]
            }
            // Antwort auf einen Server-Ping, erneuert nur den Idle-Timer
            ClientEvent::Pong(_) => Vec::new(),
            signal_event => match signal_event.into_signal() {
                Some(signal) => self.signal_weiterleiten(conn, signal),
                None => Vec::new(),
            },
        }
    }

    /// Tritt einem Raum bei
    pub fn beitreten(&self, conn: ConnectionId, raum: RoomId) -> Vec<Zustellung> {
        match self.registry.raum_beitreten(conn, raum.clone()) {
            JoinResult::Angenommen { belegung, peers } => {
                self.join_zaehlen(JOIN_ANGENOMMEN);
                if belegung == 1 {
                    if let Some(m) = &self.metriken {
                        m.rooms_active.inc();
                    }
                }

                tracing::info!(
                    conn = %conn,
                    raum = %raum,
                    belegung,
                    "Raum beigetreten"
                );

                let mut zustellungen = Vec::with_capacity(1 + peers.len());
                zustellungen.push(Zustellung::neu(
                    conn,
                    ServerEvent::room_joined(belegung as u8),
                ));
                zustellungen.extend(
                    peers
                        .into_iter()
                        .map(|peer| Zustellung::neu(peer, ServerEvent::PeerJoined)),
                );
                zustellungen
            }
            JoinResult::RaumVoll => {
                self.join_zaehlen(JOIN_RAUM_VOLL);
                tracing::warn!(conn = %conn, raum = %raum, "Raum voll – Beitritt abgelehnt");
                vec![Zustellung::neu(conn, ServerEvent::RoomFull)]
            }
            JoinResult::BereitsImRaum { raum: bisher } => {
                self.join_zaehlen(JOIN_ABGELEHNT);
                tracing::warn!(
                    conn = %conn,
                    raum = %raum,
                    bisher = %bisher,
                    "Erneuter Beitritt abgelehnt"
                );
                vec![Zustellung::neu(
                    conn,
                    ServerEvent::error(
                        ErrorCode::AlreadyInRoom,
                        format!("Bereits im Raum '{bisher}'"),
                    ),
                )]
            }
        }
    }

    /// Leitet eine Signaling-Nachricht unveraendert an alle Peers weiter
    ///
    /// Ohne Raum oder ohne Peer ist das ein stilles No-op.
    pub fn signal_weiterleiten(&self, conn: ConnectionId, signal: Signal) -> Vec<Zustellung> {
        let peers = self.registry.peers_von(&conn);
        if peers.is_empty() {
            tracing::debug!(conn = %conn, event = signal.name(), "Kein Peer – Signal verworfen");
            return Vec::new();
        }

        if let Some(m) = &self.metriken {
            m.signal_zaehlen(signal.kind.als_str());
        }
        tracing::trace!(conn = %conn, event = signal.name(), peers = peers.len(), "Signal weitergeleitet");

        let event = ServerEvent::from(signal);
        peers
            .into_iter()
            .map(|peer| Zustellung::neu(peer, event.clone()))
            .collect()
    }

    /// Raeumt eine getrennte Verbindung auf
    ///
    /// Ein verbleibender Teilnehmer erhaelt `peer-disconnected`. Mehrfacher
    /// Aufruf ist ein No-op.
    pub fn trennen(&self, conn: ConnectionId) -> Vec<Zustellung> {
        let Some(ergebnis) = self.registry.verlassen(&conn) else {
            return Vec::new();
        };

        if ergebnis.verbleibend.is_empty() {
            if let Some(m) = &self.metriken {
                m.rooms_active.dec();
            }
            tracing::info!(conn = %conn, raum = %ergebnis.raum, "Raum verlassen – Raum geloescht");
        } else {
            tracing::info!(conn = %conn, raum = %ergebnis.raum, "Raum verlassen");
        }

        ergebnis
            .verbleibend
            .into_iter()
            .map(|peer| Zustellung::neu(peer, ServerEvent::PeerDisconnected))
            .collect()
    }

    fn join_zaehlen(&self, ergebnis: &str) {
        if let Some(m) = &self.metriken {
            m.join_zaehlen(ergebnis);
        }
    }
}

impl Default for SignalingRouter {
    fn default() -> Self {
        Self::neu()
    }
}

/// Aktuelle Zeit in Millisekunden seit der Unix-Epoche
pub(crate) fn jetzt_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rekor_protocol::events::{AlterName, SignalKind, SignalPayload};
    use serde_json::json;

    fn an(ziel: ConnectionId, event: ServerEvent) -> Zustellung {
        Zustellung::neu(ziel, event)
    }

    fn offer(sdp: &str) -> ClientEvent {
        ClientEvent::from(Signal::new(SignalKind::Offer, SignalPayload::new(sdp)))
    }

    #[test]
    fn erster_beitritt_nur_room_joined() {
        let router = SignalingRouter::neu();
        let c1 = ConnectionId::new();

        let aus = router.verarbeiten(c1, ClientEvent::join("r1"));
        assert_eq!(aus, vec![an(c1, ServerEvent::room_joined(1))]);
    }

    #[test]
    fn zweiter_beitritt_benachrichtigt_ersten() {
        let router = SignalingRouter::neu();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());

        router.verarbeiten(c1, ClientEvent::join("r1"));
        let aus = router.verarbeiten(c2, ClientEvent::join("r1"));

        assert_eq!(
            aus,
            vec![
                an(c2, ServerEvent::room_joined(2)),
                an(c1, ServerEvent::PeerJoined),
            ]
        );
        let peer_joined = aus
            .iter()
            .filter(|z| z.event == ServerEvent::PeerJoined)
            .count();
        assert_eq!(peer_joined, 1);
    }

    #[test]
    fn dritter_beitritt_erhaelt_room_full() {
        let router = SignalingRouter::neu();
        let (c1, c2, c3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));
        let aus = router.verarbeiten(c3, ClientEvent::join("r1"));

        assert_eq!(aus, vec![an(c3, ServerEvent::RoomFull)]);
        assert_eq!(router.registry().teilnehmer(&RoomId::from("r1")), vec![c1, c2]);
        assert_eq!(router.registry().raum_von(&c3), None);
    }

    #[test]
    fn abgewiesener_client_kann_spaeter_denselben_raum_betreten() {
        let router = SignalingRouter::neu();
        let (c1, c2, c3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));
        assert_eq!(
            router.verarbeiten(c3, ClientEvent::join("r1")),
            vec![an(c3, ServerEvent::RoomFull)]
        );

        assert_eq!(router.trennen(c1), vec![an(c2, ServerEvent::PeerDisconnected)]);

        let aus = router.verarbeiten(c3, ClientEvent::join("r1"));
        assert_eq!(
            aus,
            vec![
                an(c3, ServerEvent::room_joined(2)),
                an(c2, ServerEvent::PeerJoined),
            ]
        );
        assert_eq!(router.registry().teilnehmer(&RoomId::from("r1")), vec![c2, c3]);
    }

    #[test]
    fn erneuter_beitritt_liefert_fehler() {
        let router = SignalingRouter::neu();
        let c1 = ConnectionId::new();

        router.verarbeiten(c1, ClientEvent::join("r1"));
        let aus = router.verarbeiten(c1, ClientEvent::join("r2"));

        assert_eq!(aus.len(), 1);
        assert_eq!(aus[0].ziel, c1);
        assert!(matches!(
            &aus[0].event,
            ServerEvent::Error(e) if e.code == ErrorCode::AlreadyInRoom
        ));
        assert_eq!(router.registry().raum_von(&c1), Some(RoomId::from("r1")));
        assert_eq!(router.registry().raum_anzahl(), 1);
    }

    #[test]
    fn signal_geht_nur_an_den_peer() {
        let router = SignalingRouter::neu();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let (d1, d2) = (ConnectionId::new(), ConnectionId::new());

        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));
        router.verarbeiten(d1, ClientEvent::join("r2"));
        router.verarbeiten(d2, ClientEvent::join("r2"));

        let aus = router.verarbeiten(c1, offer("X"));
        assert_eq!(aus.len(), 1);
        assert_eq!(aus[0].ziel, c2);
        assert_eq!(
            aus[0].event,
            ServerEvent::from(Signal::new(SignalKind::Offer, SignalPayload::new("X")))
        );
    }

    #[test]
    fn alle_signal_arten_werden_unveraendert_weitergeleitet() {
        let router = SignalingRouter::neu();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));

        let nutzlast = SignalPayload::new(json!({"type": "answer", "sdp": "v=0", "extra": [1, 2]}));
        for kind in [SignalKind::Offer, SignalKind::Answer, SignalKind::IceCandidate] {
            let signal = Signal::new(kind, nutzlast.clone());
            let aus = router.verarbeiten(c2, ClientEvent::from(signal.clone()));
            assert_eq!(aus, vec![an(c1, ServerEvent::from(signal))], "{kind}");
        }
    }

    #[test]
    fn alte_event_namen_werden_unter_gleichem_namen_weitergeleitet() {
        let router = SignalingRouter::neu();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));

        let nutzlast = SignalPayload::new(json!({"type": "offer", "sdp": "v=0"}));
        for alt in AlterName::ALLE {
            let signal = Signal::mit_altem_namen(alt, nutzlast.clone());
            let aus = router.verarbeiten(c1, ClientEvent::from(signal.clone()));
            assert_eq!(aus, vec![an(c2, ServerEvent::from(signal))]);
            assert_eq!(aus[0].event.name(), alt.als_str());
        }
    }

    #[test]
    fn signal_ohne_peer_ist_noop() {
        let router = SignalingRouter::neu();
        let allein = ConnectionId::new();
        let ohne_raum = ConnectionId::new();

        router.verarbeiten(allein, ClientEvent::join("r1"));
        assert!(router.verarbeiten(allein, offer("X")).is_empty());
        assert!(router.verarbeiten(ohne_raum, offer("X")).is_empty());
    }

    #[test]
    fn trennen_benachrichtigt_verbleibenden() {
        let router = SignalingRouter::neu();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));

        assert_eq!(router.trennen(c2), vec![an(c1, ServerEvent::PeerDisconnected)]);
        assert_eq!(router.registry().teilnehmer(&RoomId::from("r1")), vec![c1]);

        // Letzter Teilnehmer: keine Events, Raum weg
        assert!(router.trennen(c1).is_empty());
        assert!(router.registry().ist_leer());
    }

    #[test]
    fn trennen_ist_idempotent() {
        let router = SignalingRouter::neu();
        let c1 = ConnectionId::new();

        assert!(router.trennen(c1).is_empty());
        router.verarbeiten(c1, ClientEvent::join("r1"));
        assert!(router.trennen(c1).is_empty());
        assert!(router.trennen(c1).is_empty());
        assert!(router.registry().ist_leer());
    }

    #[test]
    fn ping_wird_mit_pong_beantwortet() {
        let router = SignalingRouter::neu();
        let c1 = ConnectionId::new();

        let aus = router.verarbeiten(
            c1,
            ClientEvent::Ping(rekor_protocol::events::PingMessage { timestamp_ms: 42 }),
        );
        assert_eq!(aus.len(), 1);
        assert_eq!(aus[0].ziel, c1);
        assert!(matches!(
            aus[0].event,
            ServerEvent::Pong(p) if p.echo_timestamp_ms == 42 && p.server_timestamp_ms > 0
        ));
    }

    #[test]
    fn szenario_kompletter_lebenszyklus() {
        let router = SignalingRouter::neu();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());

        assert_eq!(
            router.verarbeiten(c1, ClientEvent::join("r1")),
            vec![an(c1, ServerEvent::room_joined(1))]
        );
        assert_eq!(
            router.verarbeiten(c2, ClientEvent::join("r1")),
            vec![
                an(c2, ServerEvent::room_joined(2)),
                an(c1, ServerEvent::PeerJoined)
            ]
        );

        let aus = router.verarbeiten(c1, offer("X"));
        assert_eq!(
            aus,
            vec![an(
                c2,
                ServerEvent::from(Signal::new(SignalKind::Offer, SignalPayload::new("X")))
            )]
        );

        assert_eq!(router.trennen(c2), vec![an(c1, ServerEvent::PeerDisconnected)]);
        assert!(router.trennen(c1).is_empty());
        assert!(router.registry().ist_leer());
    }

    #[test]
    fn metriken_folgen_dem_raumzustand() {
        let metriken = RelayMetrics::neu().unwrap();
        let router = SignalingRouter::mit_metriken(metriken.clone());
        let (c1, c2, c3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        router.verarbeiten(c1, ClientEvent::join("r1"));
        router.verarbeiten(c2, ClientEvent::join("r1"));
        router.verarbeiten(c3, ClientEvent::join("r1"));
        assert_eq!(metriken.rooms_active.get(), 1);
        assert_eq!(metriken.joins_total.with_label_values(&[JOIN_ANGENOMMEN]).get(), 2);
        assert_eq!(metriken.joins_total.with_label_values(&[JOIN_RAUM_VOLL]).get(), 1);

        router.verarbeiten(c1, offer("X"));
        assert_eq!(
            metriken
                .signals_forwarded_total
                .with_label_values(&["offer"])
                .get(),
            1
        );

        router.trennen(c1);
        router.trennen(c2);
        assert_eq!(metriken.rooms_active.get(), 0);
    }
}
