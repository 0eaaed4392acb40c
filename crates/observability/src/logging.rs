//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `REKOR_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: info
//! - `REKOR_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Umgebungsvariablen haben Vorrang vor den Werten aus der
//! Konfigurationsdatei.

use tracing_subscriber::{EnvFilter, fmt};

/// Name der Umgebungsvariable fuer das Log-Level
pub const LOG_LEVEL_ENV: &str = "REKOR_LOG_LEVEL";

/// Name der Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "REKOR_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Darf nur einmal pro Prozess aufgerufen werden.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format_aufloesen(format).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Bestimmt das effektive Log-Format (Umgebung vor Konfiguration)
pub fn log_format_aufloesen(konfiguriert: &str) -> String {
    std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| konfiguriert.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
