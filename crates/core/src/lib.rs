//! rekor-core – Gemeinsame Typen
//!
//! Identifikationstypen, die von Protokoll, Signaling und Server
//! gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{ConnectionId, RoomId};
