//! Error types for tagmeter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or exporting metrics
///
/// Instrumentation calls (`increment`, `record`) never return errors; only
/// configuration and the export pipeline do.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Name pattern is not a valid regular expression
    #[error("Invalid name pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Name pattern template references a capture group the pattern does not have
    #[error("Name pattern {pattern:?} has no capture group {group} (groups: {available})")]
    MissingCaptureGroup {
        pattern: String,
        group: usize,
        available: usize,
    },

    /// Pattern configuration could not be parsed
    #[error("Failed to parse pattern configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Export Errors
    // =========================================================================
    /// Sidecar could not be reached
    #[error("Sidecar connection error: {0}")]
    SidecarConnection(#[source] reqwest::Error),

    /// Sidecar answered with something other than 200
    #[error("Post to sidecar failed with status: {status}")]
    SidecarStatus { status: u16 },

    /// Payload serialization failed
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Exporter worker is already running
    #[error("Exporter is already running")]
    ExporterRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors raised while building configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::InvalidPattern { .. }
                | Error::MissingCaptureGroup { .. }
                | Error::ConfigParse(_)
                | Error::Config(_)
        )
    }
}
