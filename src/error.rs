//! Error taxonomy for the reminder and notification engine.
//!
//! Creation-time failures ([`EngineError::Validation`], [`EngineError::Persistence`])
//! propagate to the caller. Timer-fired paths treat [`EngineError::NotFound`] as a
//! no-op and log everything else where it happens.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input (unparseable due time, missing field, bad radius).
    /// Rejected synchronously and never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The store could not be read or written. Surfaced to the caller as-is.
    #[error("persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A delivery channel transport failed. Recorded per channel.
    #[error("delivery error on {channel}: {message}")]
    Delivery { channel: String, message: String },

    /// The entity was deleted or never existed.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            source: None,
        }
    }

    pub fn reminder_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "reminder",
            id: id.to_string(),
        }
    }

    pub fn location_reminder_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "location reminder",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence {
            message: format!("serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Persistence {
            message: format!("db task failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
