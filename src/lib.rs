//! Lossless copyright and privacy metadata editing for raster images.
//!
//! This crate inserts or removes copyright/author metadata directly on the
//! compressed byte stream of PNG, WebP, and JPEG files — chunk framing,
//! checksums, padding and flag bits are rewritten, the pixel data bytes are
//! not. When a lossless path is unavailable or the stream is malformed,
//! stripping falls back to decoding and re-encoding through the `image`
//! crate.
//!
//! # Design Principles
//!
//! - **Lossless first**: pixel-data regions stay byte-identical whenever a
//!   binary surgery path exists
//! - **Never corrupt**: edits go through a temp file and an atomic rename;
//!   parse failures abort to the fallback, not to a half-written file
//! - **Per-file isolation**: every call opens its own handles and shares no
//!   state, so callers may run many files concurrently
//!
//! # Quick Start
//!
//! ```no_run
//! use imprint_io::{strip_file, tag_file};
//!
//! // Add copyright and artist metadata (lossless where possible)
//! let result = tag_file("photo.png", "tagged.png", "© 2025 Acme", "J. Doe");
//! assert!(result.success, "{}", result.detail);
//!
//! // Remove all metadata for privacy
//! let result = strip_file("photo.jpg", "clean.jpg");
//! println!("{}", result.detail);
//! ```
//!
//! # Editor-Level API
//!
//! The per-format editors work on byte streams for callers that manage
//! their own I/O:
//!
//! ```no_run
//! use imprint_io::{exif, PngEditor};
//! use std::io::Cursor;
//!
//! # fn main() -> imprint_io::Result<()> {
//! let source = std::fs::read("photo.png")?;
//! let block = exif::build_block(Some("© 2025 Acme"), None, None);
//!
//! let mut dest = Vec::new();
//! PngEditor::tag(&mut Cursor::new(&source), &mut dest, &block, &[], None)?;
//! std::fs::write("tagged.png", dest)?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod exif;
mod fallback;
mod formats;
mod service;
pub mod xmp;

pub use error::{Error, Result};
pub use formats::{Format, JpegEditor, PngEditor, WebpEditor};
pub use service::{
    strip_file, tag_file, EditResult, MetadataRequest, MetadataService, Operation,
};

// Test utilities - only compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
