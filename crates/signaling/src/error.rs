//! Fehlertypen fuer den Signaling-Service
//!
//! Betrifft nur den Transport. Raum- und Weiterleitungslogik kennt keine
//! Fehler: ein voller Raum wird dem Client gemeldet, fehlender Zustand
//! ist ein stilles No-op.

use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket, Frame-Codec)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket-Fehler
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(#[from] axum::Error),

    /// Ungueltiges Event (JSON passt nicht zum Protokoll)
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] serde_json::Error),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Keine Nachricht innerhalb des Timeouts
    #[error("Timeout")]
    Timeout,
}

impl SignalingError {
    /// Gibt true zurueck wenn die Verbindung nach dem Fehler weiterlaufen kann
    ///
    /// Nur ein einzelnes ungueltiges Event ist behebbar, alle anderen
    /// Fehler beenden die Verbindung.
    pub fn ist_behebbar(&self) -> bool {
        matches!(self, Self::Protokoll(_))
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nur_protokollfehler_sind_behebbar() {
        let json_fehler = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(SignalingError::from(json_fehler).ist_behebbar());

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "weg");
        assert!(!SignalingError::from(io).ist_behebbar());
        assert!(!SignalingError::Timeout.ist_behebbar());
        assert!(!SignalingError::VerbindungGetrennt.ist_behebbar());
    }

    #[test]
    fn fehler_anzeige() {
        assert_eq!(SignalingError::Timeout.to_string(), "Timeout");
        assert_eq!(
            SignalingError::VerbindungGetrennt.to_string(),
            "Verbindung getrennt"
        );
    }
}
