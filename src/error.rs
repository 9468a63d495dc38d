//! Error types for the capture flow

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing a design
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize the flow or a save strategy
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Failed to fetch the storefront page
    #[error("Failed to load page: {0}")]
    PageError(String),

    /// Bounded wait expired before the page was ready
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Required design state was missing or unreadable
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Mosaic image could not be decoded or encoded
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// The remote save endpoint failed or rejected the design
    #[error("Save backend error: {0}")]
    BackendError(String),

    /// Local state files could not be read or written
    #[error("Local storage error: {0}")]
    StorageError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
