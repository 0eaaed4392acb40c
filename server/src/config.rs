//! Relay-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass das Relay ohne Konfigurationsdatei laeuft.

use anyhow::{Context, bail};
use rekor_observability::logging::{log_format_gueltig, log_level_gueltig};
use rekor_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Vollstaendige Relay-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    /// Keepalive, Timeouts und Queues pro Verbindung
    pub verbindung: VerbindungsEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Metriken und Health-Check
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename (nur fuer Logs)
    pub name: String,
    /// Maximale gleichzeitige Verbindungen ueber alle Transporte
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Rekor Relay".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer WebSocket-Clients (Browser)
    pub ws_port: u16,
    /// Port fuer native TCP-Clients
    pub tcp_port: u16,
    pub tcp_aktiviert: bool,
    /// Erlaubte CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 1234,
            tcp_port: 1235,
            tcp_aktiviert: false,
            cors_origins: vec![
                "http://localhost:3000".into(),
                "https://rekor.vercel.app".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    pub keepalive_sek: u64,
    pub verbindungs_timeout_sek: u64,
    pub send_queue_groesse: usize,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            keepalive_sek: standard.keepalive_sek,
            verbindungs_timeout_sek: standard.verbindungs_timeout_sek,
            send_queue_groesse: standard.send_queue_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

/// Herkunft einer geladenen Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigQuelle {
    Datei,
    /// Datei fehlt, alle Werte sind Standardwerte
    Standardwerte,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    ///
    /// Laeuft vor der Logging-Initialisierung und loggt deshalb nicht
    /// selbst. Der Aufrufer meldet `ConfigQuelle::Standardwerte`.
    pub fn laden(pfad: &str) -> anyhow::Result<(Self, ConfigQuelle)> {
        let (config, quelle) = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config = toml::from_str::<Self>(&inhalt)
                    .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?;
                (config, ConfigQuelle::Datei)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), ConfigQuelle::Standardwerte)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"));
            }
        };
        config.validieren()?;
        Ok((config, quelle))
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        if self.verbindung.verbindungs_timeout_sek <= self.verbindung.keepalive_sek {
            bail!(
                "verbindungs_timeout_sek ({}) muss groesser als keepalive_sek ({}) sein",
                self.verbindung.verbindungs_timeout_sek,
                self.verbindung.keepalive_sek
            );
        }
        if self.netzwerk.tcp_aktiviert && self.netzwerk.tcp_port == self.netzwerk.ws_port {
            bail!("tcp_port und ws_port duerfen nicht gleich sein");
        }
        self.ws_bind_adresse()?;
        Ok(())
    }

    /// Konfiguration fuer den Signaling-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            max_clients: self.server.max_clients,
            keepalive_sek: self.verbindung.keepalive_sek,
            verbindungs_timeout_sek: self.verbindung.verbindungs_timeout_sek,
            send_queue_groesse: self.verbindung.send_queue_groesse,
        }
    }

    /// Gibt die Bind-Adresse fuer WebSocket-Clients zurueck
    pub fn ws_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer TCP-Clients zurueck
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.observability.port)
    }

    fn adresse(&self, port: u16) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.netzwerk.bind_adresse, port)
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.netzwerk.bind_adresse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.netzwerk.ws_port, 1234);
        assert!(!cfg.netzwerk.tcp_aktiviert);
        assert_eq!(cfg.netzwerk.cors_origins.len(), 2);
        assert_eq!(cfg.logging.level, "info");
        cfg.validieren().unwrap();
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ws_bind_adresse().unwrap().to_string(), "0.0.0.0:1234");
        assert_eq!(cfg.observability_bind_adresse().unwrap().port(), 9300);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            max_clients = 100

            [netzwerk]
            tcp_aktiviert = true
            tcp_port = 10000
            cors_origins = []

            [verbindung]
            keepalive_sek = 5
            verbindungs_timeout_sek = 15
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        assert!(cfg.netzwerk.cors_origins.is_empty());
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.ws_port, 1234);
        assert_eq!(cfg.server.name, "Rekor Relay");

        let signaling = cfg.signaling_config();
        assert_eq!(signaling.max_clients, 100);
        assert_eq!(signaling.keepalive_sek, 5);
        assert_eq!(signaling.verbindungs_timeout_sek, 15);
        cfg.validieren().unwrap();
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.verbindung.verbindungs_timeout_sek = cfg.verbindung.keepalive_sek;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let (cfg, quelle) = ServerConfig::laden("/nicht/vorhanden/rekor.toml").unwrap();
        assert_eq!(quelle, ConfigQuelle::Standardwerte);
        assert_eq!(cfg.netzwerk.ws_port, 1234);
    }

    #[test]
    fn vorhandene_datei_wird_als_quelle_gemeldet() {
        let pfad = std::env::temp_dir().join(format!("rekor-config-{}.toml", std::process::id()));
        std::fs::write(&pfad, "[server]\nmax_clients = 7\n").unwrap();

        let ergebnis = ServerConfig::laden(pfad.to_str().unwrap());
        std::fs::remove_file(&pfad).unwrap();

        let (cfg, quelle) = ergebnis.unwrap();
        assert_eq!(quelle, ConfigQuelle::Datei);
        assert_eq!(cfg.server.max_clients, 7);
    }
}
