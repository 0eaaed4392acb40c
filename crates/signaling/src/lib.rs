//! rekor-signaling – Raum-Pairing und Signaling-Relay
//!
//! Dieser Crate paart genau zwei Clients pro Raum und leitet ihre
//! WebRTC-Signaling-Nachrichten (Offer, Answer, ICE-Kandidaten)
//! unveraendert an den jeweils anderen Teilnehmer weiter.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket (ws_router)      TCP (SignalingServer)
//!          \                      /
//!           v                    v
//!      ClientConnection (pro Verbindung ein Task)
//!           |  Eingang -> SignalingRouter -> Zustellungen
//!           v
//!      EventBroadcaster (Send-Queue pro Verbindung)
//!
//! ConnectionRegistry – Raeume und Mitgliedschaften (max. 2 pro Raum)
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod registry;
pub mod router;
pub mod server_state;
pub mod tcp;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use connection::ClientConnection;
pub use error::{SignalingError, SignalingResult};
pub use registry::{ConnectionRegistry, JoinResult, LeaveResult, MAX_TEILNEHMER};
pub use router::{SignalingRouter, Zustellung};
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
pub use ws::{ws_router, ws_server_starten};
