//! PNG chunk editor
//!
//! Single-pass rewrite of the PNG chunk stream. Strip omits the metadata
//! chunk set; tag drops any existing EXIF/XMP chunks and inserts fresh ones
//! immediately before the first IDAT. Copied chunks keep their original CRC
//! (payloads are unchanged); only newly written chunks get a computed one.

use std::io::{ErrorKind, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// PNG signature
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

const IDAT: &[u8; 4] = b"IDAT";
const IEND: &[u8; 4] = b"IEND";
const EXIF: &[u8; 4] = b"eXIf";
const TEXT: &[u8; 4] = b"tEXt";
const ITXT: &[u8; 4] = b"iTXt";

/// XMP keyword in iTXt chunks
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp\0";

/// Ancillary chunk types that carry metadata (safe to strip; none are
/// needed for rendering).
const METADATA_CHUNKS: [&[u8; 4]; 11] = [
    b"tEXt", b"zTXt", b"iTXt", b"eXIf", b"tIME", b"pHYs", b"oFFs", b"sCAL", b"fRAc", b"gIFg",
    b"gIFx",
];

/// One chunk read from the stream, CRC untouched.
struct RawChunk {
    type_: [u8; 4],
    payload: Vec<u8>,
    crc: [u8; 4],
}

/// PNG chunk editor
pub struct PngEditor;

impl PngEditor {
    /// Copy `source` to `dest` with all metadata chunks removed.
    ///
    /// Critical chunks are copied byte-for-byte including their CRC.
    pub fn strip<R: Read, W: Write>(source: &mut R, dest: &mut W) -> Result<()> {
        read_signature(source)?;
        dest.write_all(PNG_SIGNATURE)?;

        let mut offset = PNG_SIGNATURE.len() as u64;
        let mut found_iend = false;

        while let Some(chunk) = next_chunk(source, &mut offset)? {
            if METADATA_CHUNKS.contains(&&chunk.type_) {
                log::debug!("dropping {} chunk", String::from_utf8_lossy(&chunk.type_));
                continue;
            }

            write_raw(dest, &chunk)?;

            if &chunk.type_ == IEND {
                found_iend = true;
                break;
            }
        }

        if !found_iend {
            return Err(Error::InvalidFormat("PNG missing IEND chunk".into()));
        }
        Ok(())
    }

    /// Copy `source` to `dest`, inserting an `eXIf` chunk, optional `tEXt`
    /// key/value chunks, and an optional XMP `iTXt` chunk before the first
    /// IDAT. Pre-existing EXIF and XMP chunks are dropped first.
    ///
    /// `exif_block` may carry the "Exif\0\0" prefix; the eXIf chunk stores
    /// raw TIFF data, so the prefix is stripped here.
    pub fn tag<R: Read, W: Write>(
        source: &mut R,
        dest: &mut W,
        exif_block: &[u8],
        text_fields: &[(&str, &str)],
        xmp: Option<&[u8]>,
    ) -> Result<()> {
        read_signature(source)?;
        dest.write_all(PNG_SIGNATURE)?;

        let exif_payload = crate::exif::raw_tiff(exif_block);
        let mut offset = PNG_SIGNATURE.len() as u64;
        let mut inserted = false;
        let mut found_iend = false;

        while let Some(chunk) = next_chunk(source, &mut offset)? {
            if &chunk.type_ == EXIF {
                log::debug!("replacing existing eXIf chunk");
                continue;
            }
            if xmp.is_some() && &chunk.type_ == ITXT && chunk.payload.starts_with(XMP_KEYWORD) {
                log::debug!("replacing existing XMP iTXt chunk");
                continue;
            }

            // Metadata goes in front of the pixel data; if the stream has
            // no IDAT at all, in front of IEND.
            if !inserted && (&chunk.type_ == IDAT || &chunk.type_ == IEND) {
                write_chunk(dest, EXIF, exif_payload)?;
                for (key, value) in text_fields {
                    let mut data = Vec::with_capacity(key.len() + 1 + value.len());
                    data.extend_from_slice(key.as_bytes());
                    data.push(0);
                    data.extend_from_slice(value.as_bytes());
                    write_chunk(dest, TEXT, &data)?;
                }
                if let Some(packet) = xmp {
                    write_xmp_chunk(dest, packet)?;
                }
                inserted = true;
            }

            write_raw(dest, &chunk)?;

            if &chunk.type_ == IEND {
                found_iend = true;
                break;
            }
        }

        if !found_iend {
            return Err(Error::InvalidFormat("PNG missing IEND chunk".into()));
        }
        Ok(())
    }

    /// Raw TIFF payload of the first `eXIf` chunk, if any.
    pub fn extract_exif<R: Read>(source: &mut R) -> Result<Option<Vec<u8>>> {
        read_signature(source)?;

        let mut offset = PNG_SIGNATURE.len() as u64;
        while let Some(chunk) = next_chunk(source, &mut offset)? {
            if &chunk.type_ == EXIF {
                return Ok(Some(chunk.payload));
            }
            if &chunk.type_ == IEND {
                break;
            }
        }
        Ok(None)
    }
}

fn read_signature<R: Read>(source: &mut R) -> Result<()> {
    let mut sig = [0u8; 8];
    source
        .read_exact(&mut sig)
        .map_err(|_| Error::InvalidFormat("not a PNG file".into()))?;
    if sig != PNG_SIGNATURE {
        return Err(Error::InvalidFormat("not a PNG file".into()));
    }
    Ok(())
}

/// Read the next chunk, or `None` at a clean end of stream.
fn next_chunk<R: Read>(source: &mut R, offset: &mut u64) -> Result<Option<RawChunk>> {
    let length = match source.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Chunk lengths are capped at 2^31-1 by the PNG spec; larger values
    // also guard the payload allocation below.
    if length > 0x7FFF_FFFF {
        return Err(Error::ChunkCorruption {
            offset: *offset,
            reason: format!("chunk length too large: {length}"),
        });
    }

    let mut type_ = [0u8; 4];
    source.read_exact(&mut type_).map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: "truncated chunk header".into(),
    })?;

    let mut payload = vec![0u8; length as usize];
    source.read_exact(&mut payload).map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: format!("chunk length {length} points past end of stream"),
    })?;

    let mut crc = [0u8; 4];
    source.read_exact(&mut crc).map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: "truncated chunk CRC".into(),
    })?;

    *offset += 8 + length as u64 + 4;
    Ok(Some(RawChunk { type_, payload, crc }))
}

/// Copy a chunk verbatim, original CRC included.
fn write_raw<W: Write>(dest: &mut W, chunk: &RawChunk) -> Result<()> {
    dest.write_u32::<BigEndian>(chunk.payload.len() as u32)?;
    dest.write_all(&chunk.type_)?;
    dest.write_all(&chunk.payload)?;
    dest.write_all(&chunk.crc)?;
    Ok(())
}

/// Write a new chunk with a freshly computed CRC.
fn write_chunk<W: Write>(dest: &mut W, chunk_type: &[u8; 4], data: &[u8]) -> Result<()> {
    dest.write_u32::<BigEndian>(data.len() as u32)?;
    dest.write_all(chunk_type)?;
    dest.write_all(data)?;
    dest.write_u32::<BigEndian>(crc32(chunk_type, data))?;
    Ok(())
}

/// Write an XMP packet as an uncompressed iTXt chunk.
fn write_xmp_chunk<W: Write>(dest: &mut W, packet: &[u8]) -> Result<()> {
    let mut data = Vec::with_capacity(XMP_KEYWORD.len() + 4 + packet.len());
    data.extend_from_slice(XMP_KEYWORD);
    data.push(0); // compression flag (0 = uncompressed)
    data.push(0); // compression method
    data.push(0); // language tag (empty, null-terminated)
    data.push(0); // translated keyword (empty, null-terminated)
    data.extend_from_slice(packet);
    write_chunk(dest, ITXT, &data)
}

/// CRC-32 over chunk type + payload (ISO 3309, as the PNG spec defines).
pub(crate) fn crc32(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;

    for &byte in chunk_type.iter().chain(data) {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }

    crc ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use std::io::Cursor;

    #[test]
    fn test_crc_matches_known_value() {
        // CRC of an empty IEND chunk is a published constant.
        assert_eq!(crc32(b"IEND", &[]), 0xAE42_6082);
    }

    #[test]
    fn test_invalid_signature() {
        let mut source = Cursor::new(vec![0u8; 16]);
        let mut dest = Vec::new();
        let result = PngEditor::strip(&mut source, &mut dest);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
        assert!(dest.is_empty());
    }

    #[test]
    fn test_truncated_chunk_is_corruption() {
        let mut data = test_utils::minimal_png();
        // Inflate the IHDR length field so it points past the end.
        data[8] = 0x7F;
        let mut dest = Vec::new();
        let result = PngEditor::strip(&mut Cursor::new(data), &mut dest);
        assert!(matches!(result, Err(Error::ChunkCorruption { .. })));
    }

    #[test]
    fn test_strip_removes_metadata_chunks() {
        let source = test_utils::png_with_metadata();
        let mut dest = Vec::new();
        PngEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();

        let types: Vec<String> = test_utils::png_chunks(&dest)
            .unwrap()
            .into_iter()
            .map(|c| c.type_name())
            .collect();
        assert_eq!(types, ["IHDR", "IDAT", "IEND"]);
    }

    #[test]
    fn test_strip_preserves_critical_bytes() {
        let source = test_utils::png_with_metadata();
        let mut dest = Vec::new();
        PngEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();

        let input: Vec<_> = test_utils::png_chunks(&source).unwrap();
        let output: Vec<_> = test_utils::png_chunks(&dest).unwrap();
        for out in &output {
            let matching = input.iter().find(|c| c.type_ == out.type_).unwrap();
            assert_eq!(matching.raw, out.raw, "critical chunk bytes changed");
        }
    }

    #[test]
    fn test_tag_inserts_exif_before_idat() {
        let source = test_utils::minimal_png();
        let block = crate::exif::build_block(Some("c"), None, None);
        let mut dest = Vec::new();
        PngEditor::tag(&mut Cursor::new(&source), &mut dest, &block, &[], None).unwrap();

        let chunks = test_utils::png_chunks(&dest).unwrap();
        let types: Vec<String> = chunks.iter().map(|c| c.type_name()).collect();
        assert_eq!(types, ["IHDR", "eXIf", "IDAT", "IEND"]);

        // eXIf stores raw TIFF data, prefix stripped
        let exif = &chunks[1];
        assert!(exif.payload.starts_with(b"II"));
        assert_eq!(exif.crc, crc32(b"eXIf", &exif.payload));
    }

    #[test]
    fn test_tag_replaces_existing_exif() {
        let old = crate::exif::build_block(Some("old"), None, None);
        let source = test_utils::png_with_exif(crate::exif::raw_tiff(&old));
        let new = crate::exif::build_block(Some("new"), None, None);

        let mut dest = Vec::new();
        PngEditor::tag(&mut Cursor::new(&source), &mut dest, &new, &[], None).unwrap();

        let exif = PngEditor::extract_exif(&mut Cursor::new(&dest)).unwrap().unwrap();
        assert_eq!(crate::exif::ExifData::parse(&exif).copyright(), Some("new"));

        let count = test_utils::png_chunks(&dest)
            .unwrap()
            .iter()
            .filter(|c| c.type_ == *b"eXIf")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_tag_writes_text_and_xmp_chunks() {
        let source = test_utils::minimal_png();
        let block = crate::exif::build_block(Some("c"), Some("a"), None);
        let xmp = crate::xmp::build_packet(Some("c"), Some("a"));

        let mut dest = Vec::new();
        PngEditor::tag(
            &mut Cursor::new(&source),
            &mut dest,
            &block,
            &[("Copyright", "c"), ("Author", "a")],
            Some(&xmp),
        )
        .unwrap();

        let chunks = test_utils::png_chunks(&dest).unwrap();
        let types: Vec<String> = chunks.iter().map(|c| c.type_name()).collect();
        assert_eq!(types, ["IHDR", "eXIf", "tEXt", "tEXt", "iTXt", "IDAT", "IEND"]);

        let itxt = chunks.iter().find(|c| c.type_ == *b"iTXt").unwrap();
        assert!(itxt.payload.starts_with(XMP_KEYWORD));
        for chunk in &chunks {
            assert_eq!(chunk.crc, crc32(&chunk.type_, &chunk.payload));
        }
    }

    #[test]
    fn test_extract_exif_none_when_absent() {
        let source = test_utils::minimal_png();
        let exif = PngEditor::extract_exif(&mut Cursor::new(&source)).unwrap();
        assert!(exif.is_none());
    }
}
