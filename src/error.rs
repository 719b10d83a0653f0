//! Error types for FrostKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using FrostError
pub type Result<T> = std::result::Result<T, FrostError>;

/// Unified error type for FrostKV operations
#[derive(Debug, Error)]
pub enum FrostError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Data store is not open")]
    NotOpen,

    #[error("Data store is already open")]
    AlreadyOpen,

    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Collection already exists: {0}")]
    AlreadyExists(String),

    #[error("Collection not found: {0}")]
    NotFound(String),

    #[error("Version '{version}' already exists for collection '{collection}'")]
    VersionExists { collection: String, version: String },

    #[error(
        "Version '{version}' is not newer than '{last_version}' for collection '{collection}'"
    )]
    VersionNotNewer {
        collection: String,
        version: String,
        last_version: String,
    },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Item of {size} bytes exceeds segment data capacity of {capacity} bytes")]
    ItemTooLarge { size: usize, capacity: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Request Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // -------------------------------------------------------------------------
    // Protocol Errors (close the connection)
    // -------------------------------------------------------------------------
    #[error("Frame payload of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network / Client Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No connected replicas available")]
    RemoteUnavailable,
}

impl FrostError {
    /// Whether this error is a protocol-level error that must close the
    /// connection instead of producing a failure status.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            FrostError::FrameTooLarge(_) | FrostError::MalformedFrame(_)
        )
    }

    /// Whether this error is a logical (application-level) failure rather
    /// than a transport failure. The aggregator propagates logical errors
    /// and swallows transport errors.
    pub fn is_logical(&self) -> bool {
        !matches!(
            self,
            FrostError::Io(_)
                | FrostError::Network(_)
                | FrostError::RemoteUnavailable
                | FrostError::FrameTooLarge(_)
                | FrostError::MalformedFrame(_)
                | FrostError::UnexpectedResponse(_)
        )
    }
}
