//! Rekor Relay – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet das Relay.

use anyhow::Result;
use rekor_observability::logging_initialisieren;
use rekor_server::Server;
use rekor_server::config::{ConfigQuelle, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("REKOR_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let (config, quelle) = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    if quelle == ConfigQuelle::Standardwerte {
        tracing::warn!(
            pfad = %config_pfad,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        ws = %config.ws_bind_adresse()?,
        tcp_aktiviert = config.netzwerk.tcp_aktiviert,
        "Rekor Relay wird initialisiert"
    );

    Server::neu(config).starten().await
}
