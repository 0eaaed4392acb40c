//! Signaling-Events
//!
//! Definiert alle Nachrichten, die zwischen Client und Relay ausgetauscht
//! werden.
//!
//! ## Design
//! - JSON, adjacently tagged: `{"event": "join", "data": {"roomId": "r1"}}`
//! - Events ohne Nutzlast lassen `data` weg: `{"event": "room-full"}`
//! - Signaling-Nutzlasten (SDP, ICE-Kandidaten) sind opak und werden
//!   unveraendert weitergereicht
//! - Die Event-Namen der urspruenglichen Socket.IO-Browser-Clients
//!   (`localDescription`, `remoteDescription`, `iceCandidate`,
//!   `iceCandidateReply`) sind eigene Varianten und werden unter demselben
//!   Namen an den Peer weitergereicht

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Opake Nutzlast
// ---------------------------------------------------------------------------

/// Opake Signaling-Nutzlast (Session-Description oder ICE-Kandidat)
///
/// Das Relay liest den Inhalt nie, es reicht den JSON-Wert nur weiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalPayload(pub serde_json::Value);

impl SignalPayload {
    pub fn new(wert: impl Into<serde_json::Value>) -> Self {
        Self(wert.into())
    }
}

/// Art einer weitergeleiteten Signaling-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    /// Event-Name auf dem Draht (auch als Metrik-Label verwendet)
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Historischer Event-Name der Socket.IO-Browser-Clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlterName {
    LocalDescription,
    RemoteDescription,
    IceCandidate,
    IceCandidateReply,
}

impl AlterName {
    pub const ALLE: [AlterName; 4] = [
        Self::LocalDescription,
        Self::RemoteDescription,
        Self::IceCandidate,
        Self::IceCandidateReply,
    ];

    /// Signaling-Art hinter dem Namen
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::LocalDescription => SignalKind::Offer,
            Self::RemoteDescription => SignalKind::Answer,
            Self::IceCandidate | Self::IceCandidateReply => SignalKind::IceCandidate,
        }
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::LocalDescription => "localDescription",
            Self::RemoteDescription => "remoteDescription",
            Self::IceCandidate => "iceCandidate",
            Self::IceCandidateReply => "iceCandidateReply",
        }
    }
}

/// Eine Signaling-Nachricht unabhaengig von ihrer Richtung
///
/// `alter_name` merkt sich, unter welchem historischen Namen das Signal
/// eingegangen ist, damit der Peer es unter demselben Namen erhaelt.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub payload: SignalPayload,
    pub alter_name: Option<AlterName>,
}

impl Signal {
    pub fn new(kind: SignalKind, payload: SignalPayload) -> Self {
        Self {
            kind,
            payload,
            alter_name: None,
        }
    }

    /// Signal unter einem historischen Event-Namen
    pub fn mit_altem_namen(name: AlterName, payload: SignalPayload) -> Self {
        Self {
            kind: name.kind(),
            payload,
            alter_name: Some(name),
        }
    }

    /// Event-Name, unter dem das Signal auf dem Draht steht
    pub fn name(&self) -> &'static str {
        match self.alter_name {
            Some(alt) => alt.als_str(),
            None => self.kind.als_str(),
        }
    }
}

// ---------------------------------------------------------------------------
// Nutzlast-Strukturen
// ---------------------------------------------------------------------------

/// Beitrittsanfrage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: String,
}

/// Session-Description (Offer oder Answer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionPayload {
    pub sdp: SignalPayload,
}

/// Session-Description unter dem Feldnamen der alten Browser-Clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDescriptionPayload {
    pub description: SignalPayload,
}

/// ICE-Kandidat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub candidate: SignalPayload,
}

/// Bestaetigung eines erfolgreichen Beitritts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoined {
    /// 1 = Offerer (erster im Raum), 2 = Answerer
    pub occupancy: u8,
}

/// Keepalive-Ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    pub timestamp_ms: u64,
}

/// Antwort auf einen Client-Ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

/// Standardisierte Fehler-Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    AlreadyInRoom,
    ServerFull,
    ServerShutdown,
}

/// Fehler-Antwort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Client -> Relay
// ---------------------------------------------------------------------------

/// Eingehende Events (Client -> Relay)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join(JoinRequest),
    Offer(DescriptionPayload),
    Answer(DescriptionPayload),
    IceCandidate(CandidatePayload),
    Ping(PingMessage),
    Pong(PingMessage),
    #[serde(rename = "localDescription")]
    LocalDescription(LegacyDescriptionPayload),
    #[serde(rename = "remoteDescription")]
    RemoteDescription(LegacyDescriptionPayload),
    #[serde(rename = "iceCandidate")]
    LegacyIceCandidate(CandidatePayload),
    #[serde(rename = "iceCandidateReply")]
    IceCandidateReply(CandidatePayload),
}

impl ClientEvent {
    /// Erstellt eine Beitrittsanfrage
    pub fn join(room_id: impl Into<String>) -> Self {
        Self::Join(JoinRequest {
            room_id: room_id.into(),
        })
    }

    /// Event-Name fuer Logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::LocalDescription(_) => "localDescription",
            Self::RemoteDescription(_) => "remoteDescription",
            Self::LegacyIceCandidate(_) => "iceCandidate",
            Self::IceCandidateReply(_) => "iceCandidateReply",
        }
    }

    /// Zerlegt ein Signaling-Event in sein `Signal`, `None` fuer alle anderen
    pub fn into_signal(self) -> Option<Signal> {
        let signal = match self {
            Self::Offer(p) => Signal::new(SignalKind::Offer, p.sdp),
            Self::Answer(p) => Signal::new(SignalKind::Answer, p.sdp),
            Self::IceCandidate(p) => Signal::new(SignalKind::IceCandidate, p.candidate),
            Self::LocalDescription(p) => {
                Signal::mit_altem_namen(AlterName::LocalDescription, p.description)
            }
            Self::RemoteDescription(p) => {
                Signal::mit_altem_namen(AlterName::RemoteDescription, p.description)
            }
            Self::LegacyIceCandidate(p) => {
                Signal::mit_altem_namen(AlterName::IceCandidate, p.candidate)
            }
            Self::IceCandidateReply(p) => {
                Signal::mit_altem_namen(AlterName::IceCandidateReply, p.candidate)
            }
            Self::Join(_) | Self::Ping(_) | Self::Pong(_) => return None,
        };
        Some(signal)
    }

    /// Serialisiert das Event als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Event aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<Signal> for ClientEvent {
    fn from(signal: Signal) -> Self {
        let payload = signal.payload;
        match (signal.alter_name, signal.kind) {
            (Some(AlterName::LocalDescription), _) => {
                Self::LocalDescription(LegacyDescriptionPayload { description: payload })
            }
            (Some(AlterName::RemoteDescription), _) => {
                Self::RemoteDescription(LegacyDescriptionPayload { description: payload })
            }
            (Some(AlterName::IceCandidate), _) => {
                Self::LegacyIceCandidate(CandidatePayload { candidate: payload })
            }
            (Some(AlterName::IceCandidateReply), _) => {
                Self::IceCandidateReply(CandidatePayload { candidate: payload })
            }
            (None, SignalKind::Offer) => Self::Offer(DescriptionPayload { sdp: payload }),
            (None, SignalKind::Answer) => Self::Answer(DescriptionPayload { sdp: payload }),
            (None, SignalKind::IceCandidate) => {
                Self::IceCandidate(CandidatePayload { candidate: payload })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Relay -> Client
// ---------------------------------------------------------------------------

/// Ausgehende Events (Relay -> Client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    RoomJoined(RoomJoined),
    RoomFull,
    PeerJoined,
    PeerDisconnected,
    Offer(DescriptionPayload),
    Answer(DescriptionPayload),
    IceCandidate(CandidatePayload),
    Ping(PingMessage),
    Pong(PongMessage),
    Error(ErrorResponse),
    #[serde(rename = "localDescription")]
    LocalDescription(LegacyDescriptionPayload),
    #[serde(rename = "remoteDescription")]
    RemoteDescription(LegacyDescriptionPayload),
    #[serde(rename = "iceCandidate")]
    LegacyIceCandidate(CandidatePayload),
    #[serde(rename = "iceCandidateReply")]
    IceCandidateReply(CandidatePayload),
}

impl ServerEvent {
    /// Erstellt eine Beitrittsbestaetigung
    pub fn room_joined(occupancy: u8) -> Self {
        Self::RoomJoined(RoomJoined { occupancy })
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::Ping(PingMessage { timestamp_ms })
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::Pong(PongMessage {
            echo_timestamp_ms,
            server_timestamp_ms,
        })
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
        })
    }

    /// Event-Name fuer Logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomJoined(_) => "room-joined",
            Self::RoomFull => "room-full",
            Self::PeerJoined => "peer-joined",
            Self::PeerDisconnected => "peer-disconnected",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
            Self::LocalDescription(_) => "localDescription",
            Self::RemoteDescription(_) => "remoteDescription",
            Self::LegacyIceCandidate(_) => "iceCandidate",
            Self::IceCandidateReply(_) => "iceCandidateReply",
        }
    }

    /// Gibt die Signaling-Art zurueck, falls es sich um eine weitergeleitete
    /// Signaling-Nachricht handelt
    pub fn signal_kind(&self) -> Option<SignalKind> {
        match self {
            Self::Offer(_) | Self::LocalDescription(_) => Some(SignalKind::Offer),
            Self::Answer(_) | Self::RemoteDescription(_) => Some(SignalKind::Answer),
            Self::IceCandidate(_) | Self::LegacyIceCandidate(_) | Self::IceCandidateReply(_) => {
                Some(SignalKind::IceCandidate)
            }
            _ => None,
        }
    }

    /// Serialisiert das Event als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Event aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<Signal> for ServerEvent {
    fn from(signal: Signal) -> Self {
        let payload = signal.payload;
        match (signal.alter_name, signal.kind) {
            (Some(AlterName::LocalDescription), _) => {
                Self::LocalDescription(LegacyDescriptionPayload { description: payload })
            }
            (Some(AlterName::RemoteDescription), _) => {
                Self::RemoteDescription(LegacyDescriptionPayload { description: payload })
            }
            (Some(AlterName::IceCandidate), _) => {
                Self::LegacyIceCandidate(CandidatePayload { candidate: payload })
            }
            (Some(AlterName::IceCandidateReply), _) => {
                Self::IceCandidateReply(CandidatePayload { candidate: payload })
            }
            (None, SignalKind::Offer) => Self::Offer(DescriptionPayload { sdp: payload }),
            (None, SignalKind::Answer) => Self::Answer(DescriptionPayload { sdp: payload }),
            (None, SignalKind::IceCandidate) => {
                Self::IceCandidate(CandidatePayload { candidate: payload })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
