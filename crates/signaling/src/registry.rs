//! Connection-Registry – Raeume und Mitgliedschaften
//!
//! Haelt zwei Indizes, die immer zueinander konsistent sind:
//!
//! ```text
//! raeume:          RoomId       -> [ConnectionId; <= 2]  (Ankunftsreihenfolge)
//! mitgliedschaft:  ConnectionId -> RoomId
//! ```
//!
//! Beide liegen hinter einem einzigen Mutex, damit Beitritt und Verlassen
//! atomar ueber beide Indizes laufen. Lesende Operationen nehmen denselben
//! Lock und sehen daher immer einen konsistenten Zustand. Der Lock wird nie
//! ueber ein `.await` gehalten.
//!
//! Die Registry speichert nur IDs, nie Transport-Objekte.

use parking_lot::Mutex;
use rekor_core::types::{ConnectionId, RoomId};
use std::collections::HashMap;

/// Maximale Anzahl Teilnehmer pro Raum
pub const MAX_TEILNEHMER: usize = 2;

// ---------------------------------------------------------------------------
// Ergebnis-Typen
// ---------------------------------------------------------------------------

/// Ergebnis eines Beitrittsversuchs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResult {
    /// Beitritt erfolgreich
    Angenommen {
        /// Belegung nach dem Beitritt (1 = Offerer, 2 = Answerer)
        belegung: usize,
        /// Die anderen Teilnehmer zum Zeitpunkt des Beitritts
        peers: Vec<ConnectionId>,
    },
    /// Raum ist bereits voll, nichts wurde veraendert
    RaumVoll,
    /// Verbindung ist schon Mitglied eines Raums, nichts wurde veraendert
    BereitsImRaum { raum: RoomId },
}

/// Ergebnis von `verlassen` fuer eine Verbindung, die in einem Raum war
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveResult {
    pub raum: RoomId,
    /// Verbleibende Teilnehmer in Ankunftsreihenfolge (0 oder 1)
    pub verbleibend: Vec<ConnectionId>,
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryInner {
    raeume: HashMap<RoomId, Vec<ConnectionId>>,
    mitgliedschaft: HashMap<ConnectionId, RoomId>,
}

/// Verwaltet Raeume und die Zuordnung Verbindung -> Raum
///
/// Alle Operationen sind total: unbekannte IDs liefern leere Ergebnisse.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Tritt einem Raum bei oder legt ihn an
    ///
    /// - Raum existiert nicht: anlegen, Belegung 1
    /// - Raum hat einen Teilnehmer: hinzufuegen, Belegung 2
    /// - Raum ist voll: `RaumVoll`, keine Aenderung
    /// - Verbindung ist schon in einem Raum: `BereitsImRaum`, keine Aenderung
    pub fn raum_beitreten(&self, conn: ConnectionId, raum: RoomId) -> JoinResult {
        let mut inner = self.inner.lock();

        if let Some(bisher) = inner.mitgliedschaft.get(&conn) {
            return JoinResult::BereitsImRaum {
                raum: bisher.clone(),
            };
        }

        if inner
            .raeume
            .get(&raum)
            .is_some_and(|teilnehmer| teilnehmer.len() >= MAX_TEILNEHMER)
        {
            return JoinResult::RaumVoll;
        }

        let teilnehmer = inner.raeume.entry(raum.clone()).or_default();
        let peers = teilnehmer.clone();
        teilnehmer.push(conn);
        let belegung = teilnehmer.len();

        inner.mitgliedschaft.insert(conn, raum);

        JoinResult::Angenommen { belegung, peers }
    }

    /// Entfernt eine Verbindung aus ihrem Raum
    ///
    /// Gibt `None` zurueck wenn die Verbindung in keinem Raum war. Ein leer
    /// gewordener Raum wird geloescht.
    pub fn verlassen(&self, conn: &ConnectionId) -> Option<LeaveResult> {
        let mut inner = self.inner.lock();

        let raum = inner.mitgliedschaft.remove(conn)?;

        let verbleibend = match inner.raeume.get_mut(&raum) {
            Some(teilnehmer) => {
                teilnehmer.retain(|c| c != conn);
                teilnehmer.clone()
            }
            None => Vec::new(),
        };

        if verbleibend.is_empty() {
            inner.raeume.remove(&raum);
        }

        Some(LeaveResult { raum, verbleibend })
    }

    /// Gibt den anderen Teilnehmer im Raum der Verbindung zurueck
    pub fn anderer_teilnehmer(&self, conn: &ConnectionId) -> Option<ConnectionId> {
        self.peers_von(conn).into_iter().next()
    }

    /// Gibt alle Teilnehmer im Raum der Verbindung ausser ihr selbst zurueck
    pub fn peers_von(&self, conn: &ConnectionId) -> Vec<ConnectionId> {
        let inner = self.inner.lock();

        inner
            .mitgliedschaft
            .get(conn)
            .and_then(|raum| inner.raeume.get(raum))
            .map(|teilnehmer| {
                teilnehmer
                    .iter()
                    .filter(|c| *c != conn)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gibt den Raum einer Verbindung zurueck
    pub fn raum_von(&self, conn: &ConnectionId) -> Option<RoomId> {
        self.inner.lock().mitgliedschaft.get(conn).cloned()
    }

    /// Gibt die Teilnehmer eines Raums in Ankunftsreihenfolge zurueck
    pub fn teilnehmer(&self, raum: &RoomId) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .raeume
            .get(raum)
            .cloned()
            .unwrap_or_default()
    }

    /// Anzahl existierender Raeume
    pub fn raum_anzahl(&self) -> usize {
        self.inner.lock().raeume.len()
    }

    /// Anzahl Verbindungen, die Mitglied eines Raums sind
    pub fn verbindung_anzahl(&self) -> usize {
        self.inner.lock().mitgliedschaft.len()
    }

    /// Prueft ob weder Raeume noch Mitgliedschaften existieren
    pub fn ist_leer(&self) -> bool {
        let inner = self.inner.lock();
        inner.raeume.is_empty() && inner.mitgliedschaft.is_empty()
    }

    /// Prueft beide Indizes auf gegenseitige Konsistenz
    #[cfg(test)]
    fn ist_konsistent(&self) -> bool {
        let inner = self.inner.lock();

        let raeume_ok = inner.raeume.iter().all(|(raum, teilnehmer)| {
            !teilnehmer.is_empty()
                && teilnehmer.len() <= MAX_TEILNEHMER
                && teilnehmer
                    .iter()
                    .all(|c| inner.mitgliedschaft.get(c) == Some(raum))
        });
        let index_ok = inner.mitgliedschaft.iter().all(|(conn, raum)| {
            inner
                .raeume
                .get(raum)
                .is_some_and(|teilnehmer| teilnehmer.contains(conn))
        });

        raeume_ok && index_ok
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
