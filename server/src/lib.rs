//! rekor-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Metriken, Signaling-Transporte und
//! Observability-Server zu einem lauffaehigen Relay.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use rekor_observability::{RelayMetrics, observability_server_starten};
use rekor_signaling::{SignalingServer, SignalingState, ws_server_starten};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Haelt den laufenden Relay-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut dienste = self.dienste_starten(shutdown_rx).await?;

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Ctrl-C-Handler nicht installierbar")?;
                tracing::info!("Shutdown-Signal empfangen, Relay wird beendet");
            }
            Some(ende) = dienste.join_next() => {
                // Ein Dienst ist vorzeitig beendet, die anderen folgen
                tracing::error!(ergebnis = ?ende, "Dienst unerwartet beendet");
            }
        }

        // Empfaenger koennen bereits weg sein
        let _ = shutdown_tx.send(true);
        while let Some(ende) = dienste.join_next().await {
            match ende {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(fehler = %e, "Dienst mit Fehler beendet"),
                Err(e) => tracing::error!(fehler = %e, "Dienst-Task abgebrochen"),
            }
        }

        tracing::info!("Relay gestoppt");
        Ok(())
    }

    /// Bindet alle Sockets und startet die Dienste als Tasks
    ///
    /// Bind-Fehler werden sofort gemeldet, bevor ein Dienst laeuft.
    pub async fn dienste_starten(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<JoinSet<Result<()>>> {
        let metriken = RelayMetrics::neu().context("Metriken nicht initialisierbar")?;
        let state = SignalingState::neu(self.config.signaling_config(), metriken.clone());

        tracing::info!(
            server_name = %self.config.server.name,
            max_clients = self.config.server.max_clients,
            "Relay startet"
        );

        let mut dienste = JoinSet::new();

        let ws_addr = self.config.ws_bind_adresse()?;
        let ws_listener = TcpListener::bind(ws_addr)
            .await
            .with_context(|| format!("WebSocket-Port {ws_addr} nicht bindbar"))?;
        dienste.spawn(ws_server_dienst(
            ws_listener,
            Arc::clone(&state),
            self.config.netzwerk.cors_origins.clone(),
            shutdown_rx.clone(),
        ));

        if self.config.netzwerk.tcp_aktiviert {
            let tcp_addr = self.config.tcp_bind_adresse()?;
            let tcp_listener = TcpListener::bind(tcp_addr)
                .await
                .with_context(|| format!("TCP-Port {tcp_addr} nicht bindbar"))?;
            let tcp_server = SignalingServer::neu(Arc::clone(&state));
            let rx = shutdown_rx.clone();
            dienste.spawn(async move {
                tcp_server
                    .mit_listener(tcp_listener, rx)
                    .await
                    .context("TCP Signaling-Server")
            });
        }

        if self.config.observability.aktiviert {
            let obs_addr = self.config.observability_bind_adresse()?;
            dienste.spawn(observability_server_starten(
                obs_addr,
                metriken,
                self.config.server.max_clients,
                shutdown_rx,
            ));
        }

        Ok(dienste)
    }
}

async fn ws_server_dienst(
    listener: TcpListener,
    state: Arc<SignalingState>,
    cors_origins: Vec<String>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    ws_server_starten(listener, state, cors_origins, shutdown_rx)
        .await
        .context("WebSocket Signaling-Server")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.netzwerk.bind_adresse = "127.0.0.1".into();
        config.netzwerk.ws_port = 0;
        config.netzwerk.tcp_port = 0;
        config.netzwerk.tcp_aktiviert = true;
        config.observability.aktiviert = false;
        config
    }

    #[tokio::test]
    async fn dienste_stoppen_beim_shutdown() {
        let server = Server::neu(test_config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut dienste = server.dienste_starten(shutdown_rx).await.unwrap();
        assert_eq!(dienste.len(), 2);

        shutdown_tx.send(true).unwrap();
        while let Some(ende) = dienste.join_next().await {
            ende.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn belegter_port_wird_gemeldet() {
        let belegt = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.netzwerk.ws_port = belegt.local_addr().unwrap().port();
        config.netzwerk.tcp_aktiviert = false;

        let (_tx, rx) = watch::channel(false);
        assert!(Server::neu(config).dienste_starten(rx).await.is_err());
    }
}
