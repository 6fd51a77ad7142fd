//! Error types for imprint-io

use std::io;

/// Result type for metadata edit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while editing image metadata
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad signature or magic bytes
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Length or size fields inconsistent with the actual stream
    #[error("Corrupt chunk at offset {offset}: {reason}")]
    ChunkCorruption { offset: u64, reason: String },

    /// Extension not in the supported set
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Write succeeded but the read-back does not match the input
    #[error("Verification failed for {field}: wrote {expected:?}, read back {found:?}")]
    VerificationFailure {
        field: &'static str,
        expected: String,
        found: Option<String>,
    },

    /// Decode or encode failure in the re-encode fallback
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}
