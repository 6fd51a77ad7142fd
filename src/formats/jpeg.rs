//! JPEG EXIF segment editor
//!
//! JPEG needs no chunk-stream surgery: metadata lives in marker segments
//! before the scan data, so tagging is one APP1 insert/replace and stripping
//! is segment omission. Everything from SOS onward is copied verbatim — the
//! compressed scan bytes are never touched.

use std::io::{self, ErrorKind, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::exif::EXIF_HEADER;

// JPEG markers
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOS: u8 = 0xDA; // Start of Scan (image data follows)
const APP1: u8 = 0xE1; // EXIF / XMP
const COM: u8 = 0xFE; // Comment

// Standalone markers without a length field
const TEM: u8 = 0x01;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENDED_SIGNATURE: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";

/// Max payload of a JPEG marker segment (u16 length field minus itself)
const MAX_SEGMENT_SIZE: usize = 65533;

/// JPEG EXIF segment editor
pub struct JpegEditor;

impl JpegEditor {
    /// Copy `source` to `dest` with EXIF APP1, XMP APP1 (standard and
    /// extended) and COM segments removed.
    pub fn strip<R: Read, W: Write>(source: &mut R, dest: &mut W) -> Result<()> {
        read_soi(source)?;
        dest.write_all(&[0xFF, SOI])?;

        let mut offset = 2u64;
        loop {
            let marker = next_marker(source, &mut offset)?;
            match marker {
                EOI => {
                    dest.write_all(&[0xFF, EOI])?;
                    return Ok(());
                }
                SOS => {
                    // Scan data (and the trailing EOI) is copied verbatim
                    dest.write_all(&[0xFF, SOS])?;
                    io::copy(source, dest)?;
                    return Ok(());
                }
                TEM | RST0..=RST7 => {
                    dest.write_all(&[0xFF, marker])?;
                }
                _ => {
                    let payload = read_segment(source, &mut offset)?;
                    if is_metadata_segment(marker, &payload) {
                        log::debug!("dropping APP1/COM segment (marker 0x{marker:02X})");
                        continue;
                    }
                    write_segment(dest, marker, &payload)?;
                }
            }
        }
    }

    /// Copy `source` to `dest` with `exif_block` written as an APP1 segment
    /// immediately after SOI, replacing any existing EXIF segment.
    ///
    /// `exif_block` gets the "Exif\0\0" prefix prepended if missing; blocks
    /// larger than one marker segment are rejected.
    pub fn tag<R: Read, W: Write>(source: &mut R, dest: &mut W, exif_block: &[u8]) -> Result<()> {
        let mut block = exif_block.to_vec();
        if !block.starts_with(EXIF_HEADER) {
            let mut prefixed = EXIF_HEADER.to_vec();
            prefixed.extend_from_slice(&block);
            block = prefixed;
        }
        if block.len() > MAX_SEGMENT_SIZE {
            return Err(Error::InvalidFormat(format!(
                "EXIF block too large for an APP1 segment: {} bytes",
                block.len()
            )));
        }

        read_soi(source)?;
        dest.write_all(&[0xFF, SOI])?;
        write_segment(dest, APP1, &block)?;

        let mut offset = 2u64;
        loop {
            let marker = next_marker(source, &mut offset)?;
            match marker {
                EOI => {
                    dest.write_all(&[0xFF, EOI])?;
                    return Ok(());
                }
                SOS => {
                    dest.write_all(&[0xFF, SOS])?;
                    io::copy(source, dest)?;
                    return Ok(());
                }
                TEM | RST0..=RST7 => {
                    dest.write_all(&[0xFF, marker])?;
                }
                _ => {
                    let payload = read_segment(source, &mut offset)?;
                    if marker == APP1 && payload.starts_with(EXIF_HEADER) {
                        log::debug!("replacing existing EXIF APP1 segment");
                        continue;
                    }
                    write_segment(dest, marker, &payload)?;
                }
            }
        }
    }

    /// Raw TIFF payload of the first EXIF APP1 segment, if any.
    pub fn extract_exif<R: Read>(source: &mut R) -> Result<Option<Vec<u8>>> {
        read_soi(source)?;

        let mut offset = 2u64;
        loop {
            let marker = match next_marker(source, &mut offset) {
                Ok(marker) => marker,
                Err(_) => return Ok(None),
            };
            match marker {
                EOI | SOS => return Ok(None),
                TEM | RST0..=RST7 => continue,
                _ => {
                    let payload = read_segment(source, &mut offset)?;
                    if marker == APP1 && payload.starts_with(EXIF_HEADER) {
                        return Ok(Some(payload[EXIF_HEADER.len()..].to_vec()));
                    }
                }
            }
        }
    }
}

fn is_metadata_segment(marker: u8, payload: &[u8]) -> bool {
    marker == COM
        || (marker == APP1
            && (payload.starts_with(EXIF_HEADER)
                || payload.starts_with(XMP_SIGNATURE)
                || payload.starts_with(XMP_EXTENDED_SIGNATURE)))
}

fn read_soi<R: Read>(source: &mut R) -> Result<()> {
    let mut soi = [0u8; 2];
    source
        .read_exact(&mut soi)
        .map_err(|_| Error::InvalidFormat("not a JPEG file".into()))?;
    if soi != [0xFF, SOI] {
        return Err(Error::InvalidFormat("not a JPEG file".into()));
    }
    Ok(())
}

/// Read the next marker byte, consuming fill bytes (0xFF padding).
fn next_marker<R: Read>(source: &mut R, offset: &mut u64) -> Result<u8> {
    let prefix = read_marker_byte(source, *offset)?;
    if prefix != 0xFF {
        return Err(Error::ChunkCorruption {
            offset: *offset,
            reason: format!("expected marker prefix 0xFF, got 0x{prefix:02X}"),
        });
    }
    *offset += 1;

    loop {
        let marker = read_marker_byte(source, *offset)?;
        *offset += 1;
        if marker != 0xFF {
            return Ok(marker);
        }
    }
}

fn read_marker_byte<R: Read>(source: &mut R, offset: u64) -> Result<u8> {
    let mut byte = [0u8; 1];
    source.read_exact(&mut byte).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::ChunkCorruption {
                offset,
                reason: "stream ended before SOS/EOI".into(),
            }
        } else {
            e.into()
        }
    })?;
    Ok(byte[0])
}

/// Read one marker segment's payload (length field consumed).
fn read_segment<R: Read>(source: &mut R, offset: &mut u64) -> Result<Vec<u8>> {
    let length = source.read_u16::<BigEndian>().map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: "truncated segment length".into(),
    })? as usize;
    if length < 2 {
        return Err(Error::ChunkCorruption {
            offset: *offset,
            reason: format!("segment length {length} smaller than its own field"),
        });
    }

    let mut payload = vec![0u8; length - 2];
    source.read_exact(&mut payload).map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: format!("segment length {length} points past end of stream"),
    })?;

    *offset += length as u64;
    Ok(payload)
}

fn write_segment<W: Write>(dest: &mut W, marker: u8, payload: &[u8]) -> Result<()> {
    dest.write_all(&[0xFF, marker])?;
    dest.write_u16::<BigEndian>(payload.len() as u16 + 2)?;
    dest.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use std::io::Cursor;

    #[test]
    fn test_invalid_soi() {
        let mut dest = Vec::new();
        let result = JpegEditor::strip(&mut Cursor::new(b"PNG?".to_vec()), &mut dest);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_strip_removes_exif_xmp_and_comments() {
        let block = crate::exif::build_block(Some("c"), None, None);
        let source = test_utils::jpeg_with_metadata(&block);
        let mut dest = Vec::new();
        JpegEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();

        assert!(JpegEditor::extract_exif(&mut Cursor::new(&dest)).unwrap().is_none());
        let markers = test_utils::jpeg_markers(&dest).unwrap();
        assert!(!markers.contains(&COM));
        // APP0 survives, scan data is byte-identical
        assert!(markers.contains(&0xE0));
        assert_eq!(
            test_utils::jpeg_scan_data(&source).unwrap(),
            test_utils::jpeg_scan_data(&dest).unwrap()
        );
    }

    #[test]
    fn test_tag_inserts_app1_after_soi() {
        let source = test_utils::minimal_jpeg();
        let block = crate::exif::build_block(Some("© Acme"), Some("J. Doe"), None);
        let mut dest = Vec::new();
        JpegEditor::tag(&mut Cursor::new(&source), &mut dest, &block).unwrap();

        // FF D8, then FF E1
        assert_eq!(&dest[0..2], &[0xFF, SOI]);
        assert_eq!(&dest[2..4], &[0xFF, APP1]);
        assert_eq!(&dest[6..12], EXIF_HEADER);

        let exif = JpegEditor::extract_exif(&mut Cursor::new(&dest)).unwrap().unwrap();
        let parsed = crate::exif::ExifData::parse(&exif);
        assert_eq!(parsed.copyright(), Some("© Acme"));
        assert_eq!(parsed.artist(), Some("J. Doe"));
    }

    #[test]
    fn test_tag_replaces_existing_exif() {
        let old = crate::exif::build_block(Some("old"), None, None);
        let source = test_utils::jpeg_with_metadata(&old);
        let new = crate::exif::build_block(Some("new"), None, None);
        let mut dest = Vec::new();
        JpegEditor::tag(&mut Cursor::new(&source), &mut dest, &new).unwrap();

        let exif = JpegEditor::extract_exif(&mut Cursor::new(&dest)).unwrap().unwrap();
        assert_eq!(crate::exif::ExifData::parse(&exif).copyright(), Some("new"));

        let app1_count = test_utils::jpeg_markers(&dest)
            .unwrap()
            .iter()
            .filter(|&&m| m == APP1)
            .count();
        assert_eq!(app1_count, 1);
    }

    #[test]
    fn test_tag_rejects_oversized_block() {
        let source = test_utils::minimal_jpeg();
        let huge = vec![0u8; MAX_SEGMENT_SIZE + 1];
        let mut dest = Vec::new();
        let result = JpegEditor::tag(&mut Cursor::new(&source), &mut dest, &huge);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_segment_is_corruption() {
        // SOI + APP0 claiming more payload than the stream has
        let source = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x40, 0x01, 0x02];
        let mut dest = Vec::new();
        let result = JpegEditor::strip(&mut Cursor::new(&source), &mut dest);
        assert!(matches!(result, Err(Error::ChunkCorruption { .. })));
    }
}
