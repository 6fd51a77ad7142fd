//! Metadata edit orchestration
//!
//! Dispatches a request to the right format editor, recovers strip failures
//! through the re-encode fallback, and verifies tag operations by reading
//! the destination back. All writes go through a temp file in the
//! destination directory followed by an atomic persist, so a failed edit
//! never leaves a half-written file behind — including when source and
//! destination are the same path.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exif::{self, ExifData};
use crate::fallback;
use crate::formats::{Format, JpegEditor, PngEditor, WebpEditor};
use crate::xmp;

/// What to do with a file's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Insert copyright/artist metadata
    Tag,
    /// Remove all metadata
    Strip,
}

/// One file's metadata edit request.
///
/// Request-scoped: built for one file, consumed by one `process` call.
/// Nothing is shared between concurrent requests.
#[derive(Debug, Clone)]
pub struct MetadataRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub operation: Operation,
    /// Copyright notice (Tag only; at least one of copyright/artist required)
    pub copyright: Option<String>,
    /// Artist/author name
    pub artist: Option<String>,
}

/// Outcome reported to the caller.
///
/// `detail` names the method used on success ("lossless chunk edit",
/// "re-encoded") and the cause on failure.
#[derive(Debug, Clone)]
pub struct EditResult {
    pub success: bool,
    pub detail: String,
}

impl EditResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Orchestrator for metadata edits.
#[derive(Debug, Default)]
pub struct MetadataService;

impl MetadataService {
    pub fn new() -> Self {
        Self
    }

    /// Process one request. Never panics and never returns a surgery-level
    /// error directly: strip failures are recovered through the re-encode
    /// fallback, and everything else is reported in the result.
    pub fn process(&self, request: &MetadataRequest) -> EditResult {
        let copyright = request.copyright.as_deref().filter(|s| !s.is_empty());
        let artist = request.artist.as_deref().filter(|s| !s.is_empty());

        if request.operation == Operation::Tag && copyright.is_none() && artist.is_none() {
            return EditResult::failed("no copyright or artist text provided");
        }

        let Some(format) = Format::from_path(&request.destination) else {
            let ext = request
                .destination
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return EditResult::failed(format!("unsupported format: .{ext}"));
        };

        log::debug!(
            "{:?} {} -> {} ({})",
            request.operation,
            request.source.display(),
            request.destination.display(),
            format.label()
        );

        let outcome = match request.operation {
            Operation::Tag => self.tag(request, format, copyright, artist),
            Operation::Strip => self.strip(request, format),
        };

        match outcome {
            Ok(detail) => EditResult::ok(detail),
            Err(err) => EditResult::failed(err.to_string()),
        }
    }

    fn tag(
        &self,
        request: &MetadataRequest,
        format: Format,
        copyright: Option<&str>,
        artist: Option<&str>,
    ) -> Result<String> {
        if !format.has_lossless_editor() {
            // Re-encoding cannot add EXIF either, so there is nothing to
            // fall back to: report rather than risk a generic edit.
            return Err(Error::UnsupportedFormat(format!(
                "no lossless EXIF path for {}",
                format.label()
            )));
        }

        let existing = read_exif_block(&request.source, format);
        let block = exif::build_block(copyright, artist, existing.as_deref());

        write_via_temp(&request.source, &request.destination, |reader, writer| {
            match format {
                Format::Jpeg => JpegEditor::tag(reader, writer, &block),
                Format::Png => {
                    let mut text_fields = Vec::new();
                    if let Some(text) = copyright {
                        text_fields.push(("Copyright", text));
                    }
                    if let Some(name) = artist {
                        text_fields.push(("Author", name));
                    }
                    let packet = xmp::build_packet(copyright, artist);
                    PngEditor::tag(reader, writer, &block, &text_fields, Some(&packet))
                }
                Format::Webp => {
                    let packet = xmp::build_packet(copyright, artist);
                    WebpEditor::tag(reader, writer, &block, Some(&packet))
                }
                Format::Tiff | Format::Avif => Err(Error::UnsupportedFormat(format!(
                    "no lossless EXIF path for {}",
                    format.label()
                ))),
            }
        })?;

        self.verify(&request.destination, format, copyright, artist)?;
        Ok(format!("tagged {} (lossless metadata edit)", format.label()))
    }

    fn strip(&self, request: &MetadataRequest, format: Format) -> Result<String> {
        if format.has_lossless_editor() {
            let attempt = write_via_temp(&request.source, &request.destination, |reader, writer| {
                match format {
                    Format::Jpeg => JpegEditor::strip(reader, writer),
                    Format::Png => PngEditor::strip(reader, writer),
                    Format::Webp => WebpEditor::strip(reader, writer),
                    Format::Tiff | Format::Avif => Err(Error::UnsupportedFormat(format!(
                        "no lossless strip path for {}",
                        format.label()
                    ))),
                }
            });

            match attempt {
                Ok(()) => {
                    return Ok(format!(
                        "metadata stripped (lossless {} edit)",
                        format.label()
                    ))
                }
                Err(err) => log::warn!(
                    "lossless {} strip failed ({err}), falling back to re-encoding",
                    format.label()
                ),
            }
        }

        reencode_via_temp(&request.source, &request.destination, format)?;
        Ok("metadata stripped (re-encoded)".into())
    }

    /// Re-open the destination and confirm the tagged fields read back
    /// exactly as written. A mismatch is surfaced but the file is kept:
    /// the bytes were written and may still be usable.
    fn verify(
        &self,
        destination: &Path,
        format: Format,
        copyright: Option<&str>,
        artist: Option<&str>,
    ) -> Result<()> {
        let block = read_exif_block(destination, format).unwrap_or_default();
        let parsed = ExifData::parse(&block);

        if let Some(expected) = copyright {
            let found = parsed.copyright();
            if found != Some(expected) {
                return Err(Error::VerificationFailure {
                    field: "copyright",
                    expected: expected.to_string(),
                    found: found.map(str::to_string),
                });
            }
        }
        if let Some(expected) = artist {
            let found = parsed.artist();
            if found != Some(expected) {
                return Err(Error::VerificationFailure {
                    field: "artist",
                    expected: expected.to_string(),
                    found: found.map(str::to_string),
                });
            }
        }
        Ok(())
    }
}

/// Add copyright/artist metadata to an image file.
///
/// Empty strings count as absent; at least one field must be non-empty.
pub fn tag_file(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    copyright: &str,
    artist: &str,
) -> EditResult {
    MetadataService::new().process(&MetadataRequest {
        source: source.as_ref().to_path_buf(),
        destination: destination.as_ref().to_path_buf(),
        operation: Operation::Tag,
        copyright: (!copyright.is_empty()).then(|| copyright.to_string()),
        artist: (!artist.is_empty()).then(|| artist.to_string()),
    })
}

/// Remove all metadata from an image file.
pub fn strip_file(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> EditResult {
    MetadataService::new().process(&MetadataRequest {
        source: source.as_ref().to_path_buf(),
        destination: destination.as_ref().to_path_buf(),
        operation: Operation::Strip,
        copyright: None,
        artist: None,
    })
}

/// The source file's EXIF block (raw TIFF data), if it has one.
///
/// Read errors are treated as "no existing data": a broken source block
/// must not stop the edit.
fn read_exif_block(path: &Path, format: Format) -> Option<Vec<u8>> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    let result = match format {
        Format::Jpeg => JpegEditor::extract_exif(&mut reader),
        Format::Png => PngEditor::extract_exif(&mut reader),
        Format::Webp => WebpEditor::extract_exif(&mut reader),
        Format::Tiff | Format::Avif => Ok(None),
    };
    result.ok().flatten()
}

/// Run `edit` from `source` into a temp file next to `destination`, then
/// persist atomically. The temp file is removed on every failure path.
fn write_via_temp<F>(source: &Path, destination: &Path, edit: F) -> Result<()>
where
    F: FnOnce(&mut BufReader<File>, &mut BufWriter<tempfile::NamedTempFile>) -> Result<()>,
{
    let mut reader = BufReader::new(File::open(source)?);
    let temp = tempfile::Builder::new()
        .prefix(".imprint-")
        .suffix(".tmp")
        .tempfile_in(temp_dir(destination))?;

    let mut writer = BufWriter::new(temp);
    edit(&mut reader, &mut writer)?;

    let temp = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    temp.persist(destination).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Re-encode into a temp file next to `destination`, then persist.
fn reencode_via_temp(source: &Path, destination: &Path, format: Format) -> Result<()> {
    let temp = tempfile::Builder::new()
        .prefix(".imprint-")
        .suffix(".tmp")
        .tempfile_in(temp_dir(destination))?;

    fallback::reencode(source, temp.path(), format)?;
    temp.persist(destination).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Directory the temp file lives in: the destination's parent, so the
/// final persist is a same-filesystem rename.
fn temp_dir(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
