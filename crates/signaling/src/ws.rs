//! WebSocket-Transport fuer Browser-Clients
//!
//! `GET /` und `GET /ws` werden zu einer WebSocket-Verbindung hochgestuft.
//! Jedes Text-Frame traegt genau ein JSON-Event. Binaer-Frames werden
//! gleich dekodiert. Ein ungueltiges Frame wird mit `INVALID_REQUEST`
//! beantwortet, die Verbindung bleibt offen.
//!
//! Der Keepalive laeuft ueber WebSocket-Ping-Frames, die Browser ohne
//! eigenen Code beantworten. Ein Pong-Frame wird der Verbindungsschleife
//! als `pong`-Event gemeldet.

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt, future};
use rekor_protocol::events::{ClientEvent, ErrorCode, PingMessage, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, watch};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::connection::ClientConnection;
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Transport-Label fuer Logs
const TRANSPORT: &str = "ws";

/// Zustand der WebSocket-Routen
#[derive(Clone)]
struct WsState {
    signaling: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Baut den WebSocket-Router inklusive CORS
///
/// Eine leere Origin-Liste erlaubt alle Origins.
pub fn ws_router(
    state: Arc<SignalingState>,
    cors_origins: &[String],
    shutdown_rx: watch::Receiver<bool>,
) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/ws", get(ws_upgrade))
        .layer(cors_layer(cors_origins))
        .with_state(WsState {
            signaling: state,
            shutdown_rx,
        })
}

/// Startet den WebSocket-Server auf einem gebundenen Listener
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn ws_server_starten(
    listener: TcpListener,
    state: Arc<SignalingState>,
    cors_origins: Vec<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = ws_router(state, &cors_origins, shutdown_rx.clone());
    tracing::info!(adresse = %listener.local_addr()?, "WebSocket Signaling-Server gestartet");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    })
    .await?;

    tracing::info!("WebSocket Signaling-Server gestoppt");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let erlaubt: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(wert) => Some(wert),
            Err(_) => {
                tracing::warn!(origin = %o, "Ungueltiger CORS-Origin ignoriert");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(erlaubt))
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
}

/// GET / und GET /ws – WebSocket-Upgrade
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    verbindung: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let peer_addr = verbindung
        .map(|ConnectInfo(addr)| addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    // Scheitert das Upgrade, wird der Platz mit dem Callback freigegeben
    let Some(platz) = state.signaling.platz_reservieren() else {
        tracing::warn!(
            peer = %peer_addr,
            max = state.signaling.config.max_clients,
            "Server voll – WebSocket abgelehnt"
        );
        let fehler = ServerEvent::error(ErrorCode::ServerFull, "Server voll");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(fehler)).into_response();
    };

    ws.on_upgrade(move |socket| verbindung_bedienen(state, platz, socket, peer_addr))
}

/// Verbindet einen WebSocket mit der Verbindungsschleife
async fn verbindung_bedienen(
    state: WsState,
    platz: OwnedSemaphorePermit,
    socket: WebSocket,
    peer_addr: SocketAddr,
) {
    let (sink, stream) = socket.split();

    let eingang = stream
        .take_while(|nachricht| future::ready(!matches!(nachricht, Ok(Message::Close(_)))))
        .filter_map(|nachricht| future::ready(nachricht_dekodieren(nachricht)));
    let ausgang = sink.with(|event: ServerEvent| future::ready(nachricht_kodieren(event)));

    ClientConnection::neu(state.signaling, platz, peer_addr, TRANSPORT)
        .verarbeiten(eingang, ausgang, state.shutdown_rx)
        .await;
}

/// Uebersetzt ein WebSocket-Frame in ein Event. `None` fuer Kontroll-Frames.
fn nachricht_dekodieren(
    nachricht: Result<Message, axum::Error>,
) -> Option<SignalingResult<ClientEvent>> {
    match nachricht {
        Ok(Message::Text(text)) => Some(ClientEvent::from_json(&text).map_err(Into::into)),
        Ok(Message::Binary(daten)) => Some(serde_json::from_slice(&daten).map_err(Into::into)),
        Ok(Message::Pong(daten)) => Some(Ok(ClientEvent::Pong(PingMessage {
            timestamp_ms: zeitstempel_lesen(&daten),
        }))),
        Ok(Message::Ping(_)) | Ok(Message::Close(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}

/// Uebersetzt ein Event in ein WebSocket-Frame
fn nachricht_kodieren(event: ServerEvent) -> Result<Message, SignalingError> {
    match event {
        ServerEvent::Ping(ping) => Ok(Message::Ping(ping.timestamp_ms.to_be_bytes().to_vec())),
        anderes => Ok(Message::Text(anderes.to_json()?)),
    }
}

fn zeitstempel_lesen(daten: &[u8]) -> u64 {
    daten
        .get(..8)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_be_bytes)
        .unwrap_or_default()
}
