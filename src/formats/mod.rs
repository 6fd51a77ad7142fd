//! Format-specific chunk and segment editors

use std::path::Path;

pub mod jpeg;
pub mod png;
pub mod webp;

pub use jpeg::JpegEditor;
pub use png::PngEditor;
pub use webp::WebpEditor;

/// Raster container formats the service accepts.
///
/// A closed variant set: dispatch over it is compile-time exhaustive, and
/// "unsupported format" is decided once, at extension resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jpeg,
    Png,
    Webp,
    Tiff,
    Avif,
}

impl Format {
    /// Resolve a format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    /// Resolve a format from a bare extension, without the dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "tif" | "tiff" => Some(Self::Tiff),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// True when a lossless chunk/segment editor exists for this format.
    ///
    /// Tiff and Avif are accepted by the service but only through the
    /// re-encode fallback.
    pub fn has_lossless_editor(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Webp)
    }

    /// Human-readable name used in result details and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Webp => "WebP",
            Self::Tiff => "TIFF",
            Self::Avif => "AVIF",
        }
    }

    /// The `image` crate format used by the re-encode fallback.
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Webp => image::ImageFormat::WebP,
            Self::Tiff => image::ImageFormat::Tiff,
            Self::Avif => image::ImageFormat::Avif,
        }
    }
}
