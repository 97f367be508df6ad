//! Error types for presence-core operations.
//!
//! Tracking operations never return these to the host. They surface from
//! configuration loading and from collaborator implementations, where the
//! caller logs and moves on.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Setup Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors raised while configuring or wiring the tracker.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {details}")]
    ConfigParse { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to spawn worker thread {name}: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using PresenceError.
pub type Result<T> = std::result::Result<T, PresenceError>;

impl From<PresenceError> for String {
    fn from(err: PresenceError) -> String {
        err.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Transient failure reported by a status store, audit sink or notifier.
///
/// Never retried explicitly: the next accepted activity or deadline is the
/// implicit retry point.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected request: {0}")]
    Rejected(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CollaboratorError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CollaboratorError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CollaboratorError::Json {
            context: context.into(),
            source,
        }
    }
}
