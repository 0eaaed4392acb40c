//! Integrationstests fuer den WebSocket-Transport
//!
//! Startet den axum-WebSocket-Server auf 127.0.0.1:0 und verbindet sich
//! mit tokio-tungstenite wie ein Browser-Client.

use futures_util::{SinkExt, StreamExt};
use rekor_observability::RelayMetrics;
use rekor_protocol::events::{ClientEvent, ErrorCode, ServerEvent, SignalKind};
use rekor_protocol::wire::ClientCodec;
use rekor_signaling::{SignalingConfig, SignalingServer, SignalingState, ws_server_starten};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tokio_util::codec::Framed;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WARTEZEIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    state: Arc<SignalingState>,
    _shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

async fn server_starten(config: SignalingConfig) -> TestServer {
    let state = SignalingState::neu(config, RelayMetrics::neu().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(ws_server_starten(
        listener,
        Arc::clone(&state),
        Vec::new(),
        shutdown_rx.clone(),
    ));

    TestServer {
        addr,
        state,
        _shutdown_tx: shutdown_tx,
        shutdown_rx,
    }
}

async fn verbinden(addr: SocketAddr, pfad: &str) -> WsClient {
    let (client, _antwort) = connect_async(format!("ws://{addr}{pfad}")).await.unwrap();
    client
}

async fn senden(client: &mut WsClient, json: serde_json::Value) {
    client
        .send(tungstenite::Message::Text(json.to_string()))
        .await
        .unwrap();
}

/// Liest das naechste Text-Frame als ServerEvent, Kontroll-Frames werden uebersprungen
async fn empfangen(client: &mut WsClient) -> ServerEvent {
    tokio::time::timeout(WARTEZEIT, async {
        loop {
            match client.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return ServerEvent::from_json(&text).unwrap();
                }
                Some(Ok(_)) => continue,
                anderes => panic!("Text-Frame erwartet, erhalten: {anderes:?}"),
            }
        }
    })
    .await
    .expect("Timeout beim Empfangen")
}

#[tokio::test]
async fn browser_clients_werden_gepaart() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut c1 = verbinden(server.addr, "/").await;
    senden(&mut c1, json!({"event": "join", "data": {"roomId": "r1"}})).await;
    assert_eq!(empfangen(&mut c1).await, ServerEvent::room_joined(1));

    let mut c2 = verbinden(server.addr, "/ws").await;
    senden(&mut c2, json!({"event": "join", "data": {"roomId": "r1"}})).await;
    assert_eq!(empfangen(&mut c2).await, ServerEvent::room_joined(2));
    assert_eq!(empfangen(&mut c1).await, ServerEvent::PeerJoined);

    // Historische Event-Namen kommen unter demselben Namen beim Peer an
    let local = json!({"event": "localDescription", "data": {"description": {"type": "offer", "sdp": "X"}}});
    senden(&mut c1, local.clone()).await;
    let offer = empfangen(&mut c2).await;
    assert_eq!(offer.signal_kind(), Some(SignalKind::Offer));
    assert_eq!(serde_json::to_value(&offer).unwrap(), local);

    let remote = json!({"event": "remoteDescription", "data": {"description": {"type": "answer", "sdp": "Y"}}});
    senden(&mut c2, remote.clone()).await;
    assert_eq!(serde_json::to_value(empfangen(&mut c1).await).unwrap(), remote);

    for name in ["iceCandidate", "iceCandidateReply"] {
        let kandidat = json!({"event": name, "data": {"candidate": "k"}});
        senden(&mut c2, kandidat.clone()).await;
        let event = empfangen(&mut c1).await;
        assert_eq!(event.signal_kind(), Some(SignalKind::IceCandidate));
        assert_eq!(serde_json::to_value(&event).unwrap(), kandidat);
    }

    // Kanonische Namen bleiben kanonisch
    senden(&mut c1, json!({"event": "offer", "data": {"sdp": "Z"}})).await;
    assert_eq!(empfangen(&mut c2).await.name(), "offer");

    c2.close(None).await.unwrap();
    assert_eq!(empfangen(&mut c1).await, ServerEvent::PeerDisconnected);
}

#[tokio::test]
async fn ungueltiges_frame_haelt_verbindung_offen() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut c1 = verbinden(server.addr, "/ws").await;

    c1.send(tungstenite::Message::Text("kein json".to_string()))
        .await
        .unwrap();
    match empfangen(&mut c1).await {
        ServerEvent::Error(fehler) => assert_eq!(fehler.code, ErrorCode::InvalidRequest),
        anderes => panic!("Fehler erwartet, erhalten: {anderes:?}"),
    }

    senden(&mut c1, json!({"event": "join", "data": {"roomId": "r9"}})).await;
    assert_eq!(empfangen(&mut c1).await, ServerEvent::room_joined(1));
}

#[tokio::test]
async fn volles_relay_antwortet_mit_503() {
    let config = SignalingConfig {
        max_clients: 0,
        ..Default::default()
    };
    let server = server_starten(config).await;

    match connect_async(format!("ws://{}/ws", server.addr)).await {
        Err(tungstenite::Error::Http(antwort)) => assert_eq!(antwort.status(), 503),
        anderes => panic!("HTTP 503 erwartet, erhalten: {:?}", anderes.map(|_| ())),
    }
    assert_eq!(server.state.broadcaster.client_anzahl(), 0);
}

#[tokio::test]
async fn gleichzeitige_upgrades_ueberlaufen_limit_nicht() {
    let config = SignalingConfig {
        max_clients: 1,
        ..Default::default()
    };
    let server = server_starten(config).await;
    let url = format!("ws://{}/ws", server.addr);

    let versuche = (0..8).map(|_| connect_async(url.clone()));
    let ergebnisse = futures_util::future::join_all(versuche).await;

    let mut clients = Vec::new();
    for ergebnis in ergebnisse {
        match ergebnis {
            Ok((client, _)) => clients.push(client),
            Err(tungstenite::Error::Http(antwort)) => assert_eq!(antwort.status(), 503),
            Err(e) => panic!("HTTP 503 erwartet, erhalten: {e:?}"),
        }
    }
    assert_eq!(clients.len(), 1);
    assert_eq!(server.state.freie_plaetze(), 0);

    drop(clients);
    tokio::time::timeout(WARTEZEIT, async {
        while server.state.freie_plaetze() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Platz wurde nicht freigegeben");
}

#[tokio::test]
async fn tcp_und_websocket_teilen_raeume() {
    let server = server_starten(SignalingConfig::default()).await;

    let tcp_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp_addr = tcp_listener.local_addr().unwrap();
    let tcp_server = SignalingServer::neu(Arc::clone(&server.state));
    tokio::spawn(tcp_server.mit_listener(tcp_listener, server.shutdown_rx.clone()));

    let mut browser = verbinden(server.addr, "/ws").await;
    senden(&mut browser, json!({"event": "join", "data": {"roomId": "gemischt"}})).await;
    assert_eq!(empfangen(&mut browser).await, ServerEvent::room_joined(1));

    let mut nativ = Framed::new(TcpStream::connect(tcp_addr).await.unwrap(), ClientCodec::new());
    nativ.send(ClientEvent::join("gemischt")).await.unwrap();
    let antwort = tokio::time::timeout(WARTEZEIT, nativ.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(antwort, ServerEvent::room_joined(2));
    assert_eq!(empfangen(&mut browser).await, ServerEvent::PeerJoined);
}
