//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` startet fuer jede eingehende TCP-Verbindung einen
//! eigenen tokio-Task mit einer `ClientConnection`. Frames werden mit dem
//! laengenpraefixierten `ServerCodec` gelesen und geschrieben. Ein
//! Framing- oder JSON-Fehler beendet die Verbindung.

use futures_util::{SinkExt, StreamExt, TryStreamExt};
use rekor_protocol::events::ServerEvent;
use rekor_protocol::wire::ServerCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, watch};
use tokio_util::codec::Framed;

use crate::connection::ClientConnection;
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// Transport-Label fuer Logs
const TRANSPORT: &str = "tcp";

/// TCP-Signaling-Server fuer native Clients
pub struct SignalingServer {
    state: Arc<SignalingState>,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Akzeptiert Verbindungen auf einem bereits gebundenen Listener
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn mit_listener(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "TCP Signaling-Server gestartet");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Platz wird vor dem Spawn reserviert
                            let Some(platz) = self.state.platz_reservieren() else {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.state.config.max_clients,
                                    "Server voll – Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            };

                            tracing::debug!(
                                peer = %peer_addr,
                                frei = self.state.freie_plaetze(),
                                "Verbindung akzeptiert"
                            );
                            tokio::spawn(verbindung_bedienen(
                                Arc::clone(&self.state),
                                platz,
                                stream,
                                peer_addr,
                                shutdown_rx.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("TCP Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}

/// Verbindet einen TCP-Stream ueber den Frame-Codec mit der Verbindungsschleife
async fn verbindung_bedienen(
    state: Arc<SignalingState>,
    platz: OwnedSemaphorePermit,
    stream: TcpStream,
    peer_addr: SocketAddr,
    shutdown_rx: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
    }

    let (sink, stream) = Framed::new(stream, ServerCodec::new()).split::<ServerEvent>();
    let eingang = stream.map_err(SignalingError::from);
    let ausgang = sink.sink_map_err(SignalingError::from);

    ClientConnection::neu(state, platz, peer_addr, TRANSPORT)
        .verarbeiten(eingang, ausgang, shutdown_rx)
        .await;
}
