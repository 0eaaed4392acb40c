//! Client-Connection – Verarbeitungsschleife einer einzelnen Verbindung
//!
//! Jede Verbindung (TCP oder WebSocket) bekommt eine `ClientConnection` in
//! einem eigenen tokio-Task. Der Transport liefert einen `Stream` mit
//! dekodierten `ClientEvent`s und einen `Sink` fuer `ServerEvent`s, die
//! Schleife selbst kennt kein Wire-Format.
//!
//! ## Ablauf
//! ```text
//! registrieren -> Schleife (Eingang | Queue | Keepalive | Shutdown) -> trennen
//! ```
//!
//! Der Verbindungsplatz wird vom Transport vor dem Spawn reserviert und
//! erst nach dem Aufraeumen freigegeben.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen `ping`
//! - Kommt innerhalb von `verbindungs_timeout_sek` kein Frame, wird die
//!   Verbindung wie ein Disconnect behandelt

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rekor_core::types::ConnectionId;
use rekor_protocol::events::{ClientEvent, ErrorCode, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, mpsc, watch};
use tokio::time::Instant;

use crate::error::{SignalingError, SignalingResult};
use crate::router::jetzt_ms;
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne Client-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    conn: ConnectionId,
    peer_addr: SocketAddr,
    transport: &'static str,
    /// Reservierter Platz im Verbindungslimit
    platz: OwnedSemaphorePermit,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer ConnectionId
    pub fn neu(
        state: Arc<SignalingState>,
        platz: OwnedSemaphorePermit,
        peer_addr: SocketAddr,
        transport: &'static str,
    ) -> Self {
        Self {
            state,
            conn: ConnectionId::new(),
            peer_addr,
            transport,
            platz,
        }
    }

    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt, ein Transportfehler oder Timeout
    /// auftritt oder ein Shutdown-Signal eingeht. Danach wird die
    /// Verbindung aus Broadcaster und Registry entfernt.
    pub async fn verarbeiten<S, K>(
        self,
        mut eingang: S,
        mut ausgang: K,
        mut shutdown_rx: watch::Receiver<bool>,
    ) where
        S: Stream<Item = SignalingResult<ClientEvent>> + Unpin,
        K: Sink<ServerEvent, Error = SignalingError> + Unpin,
    {
        let conn = self.conn;
        let mut queue = self.state.broadcaster.client_registrieren(conn);

        tracing::info!(
            conn = %conn,
            peer = %self.peer_addr,
            transport = self.transport,
            "Neue Verbindung"
        );

        let ergebnis = self
            .schleife(&mut eingang, &mut ausgang, &mut queue, &mut shutdown_rx)
            .await;

        match ergebnis {
            Ok(()) => {
                tracing::info!(conn = %conn, "Verbindung beendet (Shutdown)");
            }
            Err(SignalingError::VerbindungGetrennt) => {
                tracing::info!(conn = %conn, peer = %self.peer_addr, "Verbindung vom Client getrennt");
            }
            Err(e) => {
                tracing::warn!(conn = %conn, peer = %self.peer_addr, fehler = %e, "Verbindung abgebrochen");
            }
        }

        // Erst die eigene Queue abmelden, dann den Peer benachrichtigen
        self.state.broadcaster.client_entfernen(&conn);
        let zustellungen = self.state.router.trennen(conn);
        self.state.broadcaster.zustellen(zustellungen);

        if let Err(e) = ausgang.close().await {
            tracing::debug!(conn = %conn, fehler = %e, "Schliessen fehlgeschlagen");
        }
        drop(self.platz);
        tracing::debug!(conn = %conn, "Verbindungs-Task beendet");
    }

    /// Innere Schleife. `Ok` nur bei Shutdown, sonst der Grund des Endes.
    async fn schleife<S, K>(
        &self,
        eingang: &mut S,
        ausgang: &mut K,
        queue: &mut mpsc::Receiver<ServerEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SignalingResult<()>
    where
        S: Stream<Item = SignalingResult<ClientEvent>> + Unpin,
        K: Sink<ServerEvent, Error = SignalingError> + Unpin,
    {
        let conn = self.conn;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek.max(1));

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            let frist = letzter_empfang + timeout_dauer;
            if Instant::now() >= frist {
                return Err(SignalingError::Timeout);
            }
            let wecker = naechster_ping.min(frist);

            tokio::select! {
                frame = eingang.next() => {
                    match frame {
                        Some(Ok(event)) => {
                            letzter_empfang = Instant::now();
                            let zustellungen = self.state.router.verarbeiten(conn, event);
                            self.state.broadcaster.zustellen(zustellungen);
                        }
                        Some(Err(e)) if e.ist_behebbar() => {
                            letzter_empfang = Instant::now();
                            tracing::warn!(conn = %conn, fehler = %e, "Ungueltiges Event");
                            ausgang
                                .send(ServerEvent::error(ErrorCode::InvalidRequest, e.to_string()))
                                .await?;
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Err(SignalingError::VerbindungGetrennt),
                    }
                }

                ausgehend = queue.recv() => {
                    match ausgehend {
                        Some(event) => {
                            tracing::trace!(conn = %conn, event = event.name(), "Event gesendet");
                            ausgang.send(event).await?;
                        }
                        None => return Err(SignalingError::VerbindungGetrennt),
                    }
                }

                _ = tokio::time::sleep_until(wecker) => {
                    if Instant::now() >= naechster_ping {
                        ausgang.send(ServerEvent::ping(jetzt_ms())).await?;
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(conn = %conn, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = ServerEvent::error(
                            ErrorCode::ServerShutdown,
                            "Server wird heruntergefahren",
                        );
                        if let Err(e) = ausgang.send(abschied).await {
                            tracing::debug!(conn = %conn, fehler = %e, "Abschied nicht zugestellt");
                        }
                        return Ok(());
                    }
                }
            }
        }
    }
}
