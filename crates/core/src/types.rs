//! Identifikationstypen fuer Verbindungen und Raeume
//!
//! Beide IDs verwenden das Newtype-Pattern, damit eine Verbindungs-ID
//! nicht versehentlich als Raum-Name verwendet werden kann.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Eindeutige ID einer Transport-Verbindung
///
/// Wird vom Transport pro Verbindung vergeben und nie wiederverwendet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Vom Client gewaehlter Raum-Name
///
/// Wird nicht validiert: jeder Client kann einen Raum durch Nennung
/// seines Namens anlegen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Erstellt eine RoomId aus einem beliebigen String
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gibt den Raum-Namen zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RoomId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
