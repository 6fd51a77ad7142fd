//! RIFF/WebP chunk editor
//!
//! WebP wraps its chunks in a RIFF container: little-endian sizes, one pad
//! byte after odd-sized payloads, and a file-level size field at offset 4
//! that must be patched after any edit. Metadata presence is mirrored in
//! the VP8X extended-features flag byte, which is cleared on strip and set
//! (or synthesized) on tag.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const RIFF_TAG: &[u8; 4] = b"RIFF";
const WEBP_TAG: &[u8; 4] = b"WEBP";

const VP8: &[u8; 4] = b"VP8 ";
const VP8L: &[u8; 4] = b"VP8L";
const VP8X: &[u8; 4] = b"VP8X";
const EXIF: &[u8; 4] = b"EXIF";
const XMP: &[u8; 4] = b"XMP ";

/// Metadata chunk types (EXIF, ICC profile, XMP)
const METADATA_CHUNKS: [&[u8; 4]; 3] = [b"EXIF", b"ICCP", b"XMP "];

// VP8X flag bits
const FLAG_ICC: u8 = 0x20;
const FLAG_EXIF: u8 = 0x08;
const FLAG_XMP: u8 = 0x04;

/// RIFF/WebP chunk editor
pub struct WebpEditor;

impl WebpEditor {
    /// Copy `source` to `dest` with EXIF/ICCP/XMP chunks removed and the
    /// matching VP8X flag bits cleared. Alpha and animation bits are left
    /// untouched. The RIFF size field is patched after writing.
    pub fn strip<R: Read, W: Write + Seek>(source: &mut R, dest: &mut W) -> Result<()> {
        let size_bytes = read_header(source)?;
        dest.write_all(RIFF_TAG)?;
        dest.write_all(&size_bytes)?;
        dest.write_all(WEBP_TAG)?;

        let mut offset = 12u64;
        while let Some((type_, mut payload)) = next_chunk(source, &mut offset)? {
            if METADATA_CHUNKS.contains(&&type_) {
                log::debug!("dropping {} chunk", String::from_utf8_lossy(&type_));
                continue;
            }

            if &type_ == VP8X {
                if let Some(flags) = payload.first_mut() {
                    *flags &= !(FLAG_ICC | FLAG_EXIF | FLAG_XMP);
                }
            }

            write_chunk(dest, &type_, &payload)?;
        }

        patch_riff_size(dest)
    }

    /// Copy `source` to `dest` with fresh EXIF (and optional XMP) chunks
    /// appended after the image data, replacing any existing ones, and the
    /// VP8X flag bits set. A file without VP8X gets one synthesized, its
    /// canvas size parsed from the VP8/VP8L bitstream header.
    ///
    /// WebP EXIF chunks store raw TIFF data; a leading "Exif\0\0" prefix on
    /// `exif_block` is stripped here.
    pub fn tag<R: Read, W: Write>(
        source: &mut R,
        dest: &mut W,
        exif_block: &[u8],
        xmp: Option<&[u8]>,
    ) -> Result<()> {
        read_header(source)?;

        let mut chunks: Vec<([u8; 4], Vec<u8>)> = Vec::new();
        let mut offset = 12u64;
        while let Some(chunk) = next_chunk(source, &mut offset)? {
            chunks.push(chunk);
        }

        chunks.retain(|(type_, _)| type_ != EXIF && type_ != XMP);

        let new_flags = FLAG_EXIF | if xmp.is_some() { FLAG_XMP } else { 0 };
        match chunks.iter_mut().find(|(type_, _)| type_ == VP8X) {
            Some((_, payload)) => {
                let flags = payload.first_mut().ok_or(Error::ChunkCorruption {
                    offset: 12,
                    reason: "empty VP8X chunk".into(),
                })?;
                // Any existing XMP chunk was just removed, so its bit must
                // track whether a new one is written.
                *flags &= !(FLAG_EXIF | FLAG_XMP);
                *flags |= new_flags;
            }
            None => {
                let (width, height) = canvas_dimensions(&chunks)?;
                let mut payload = Vec::with_capacity(10);
                payload.write_u32::<LittleEndian>(new_flags as u32)?;
                payload.write_u24::<LittleEndian>(width - 1)?;
                payload.write_u24::<LittleEndian>(height - 1)?;
                chunks.insert(0, (*VP8X, payload));
            }
        }

        chunks.push((*EXIF, crate::exif::raw_tiff(exif_block).to_vec()));
        if let Some(packet) = xmp {
            chunks.push((*XMP, packet.to_vec()));
        }

        // WEBP tag + every chunk with its header and pad byte
        let total: u32 = 4 + chunks
            .iter()
            .map(|(_, p)| 8 + p.len() as u32 + (p.len() as u32 & 1))
            .sum::<u32>();

        dest.write_all(RIFF_TAG)?;
        dest.write_u32::<LittleEndian>(total)?;
        dest.write_all(WEBP_TAG)?;
        for (type_, payload) in &chunks {
            write_chunk(dest, type_, payload)?;
        }

        Ok(())
    }

    /// Raw TIFF payload of the EXIF chunk, if any.
    pub fn extract_exif<R: Read>(source: &mut R) -> Result<Option<Vec<u8>>> {
        read_header(source)?;

        let mut offset = 12u64;
        while let Some((type_, payload)) = next_chunk(source, &mut offset)? {
            if &type_ == EXIF {
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }
}

/// Validate `RIFF....WEBP` and return the original size field bytes.
fn read_header<R: Read>(source: &mut R) -> Result<[u8; 4]> {
    let mut header = [0u8; 12];
    source
        .read_exact(&mut header)
        .map_err(|_| Error::InvalidFormat("not a RIFF/WebP file".into()))?;
    if &header[0..4] != RIFF_TAG || &header[8..12] != WEBP_TAG {
        return Err(Error::InvalidFormat("not a RIFF/WebP file".into()));
    }
    Ok([header[4], header[5], header[6], header[7]])
}

/// Read the next chunk (pad byte consumed, not returned), or `None` at a
/// clean end of stream.
fn next_chunk<R: Read>(source: &mut R, offset: &mut u64) -> Result<Option<([u8; 4], Vec<u8>)>> {
    let mut type_ = [0u8; 4];
    match source.read_exact(&mut type_) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = source.read_u32::<LittleEndian>().map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: "truncated chunk header".into(),
    })?;
    if size > 0x7FFF_FFFF {
        return Err(Error::ChunkCorruption {
            offset: *offset,
            reason: format!("chunk size too large: {size}"),
        });
    }

    let mut payload = vec![0u8; size as usize];
    source.read_exact(&mut payload).map_err(|_| Error::ChunkCorruption {
        offset: *offset,
        reason: format!("chunk size {size} points past end of stream"),
    })?;

    // RIFF chunks are word-aligned; a missing final pad byte is tolerated.
    if size % 2 != 0 {
        let mut pad = [0u8; 1];
        let _ = source.read_exact(&mut pad);
    }

    *offset += 8 + size as u64 + (size as u64 & 1);
    Ok(Some((type_, payload)))
}

fn write_chunk<W: Write>(dest: &mut W, type_: &[u8; 4], payload: &[u8]) -> Result<()> {
    dest.write_all(type_)?;
    dest.write_u32::<LittleEndian>(payload.len() as u32)?;
    dest.write_all(payload)?;
    if payload.len() % 2 != 0 {
        dest.write_all(&[0])?;
    }
    Ok(())
}

/// Rewrite the size field at offset 4 to total-bytes-written minus 8.
fn patch_riff_size<W: Write + Seek>(dest: &mut W) -> Result<()> {
    let end = dest.stream_position()?;
    dest.seek(SeekFrom::Start(4))?;
    dest.write_u32::<LittleEndian>((end - 8) as u32)?;
    dest.seek(SeekFrom::Start(end))?;
    Ok(())
}

/// Canvas width/height for a synthesized VP8X chunk, parsed from the VP8
/// frame header or the VP8L signature bitstream.
fn canvas_dimensions(chunks: &[([u8; 4], Vec<u8>)]) -> Result<(u32, u32)> {
    if let Some((_, payload)) = chunks.iter().find(|(type_, _)| type_ == VP8L) {
        // Signature byte, then 14-bit width-1 and 14-bit height-1, LSB-first
        if payload.len() >= 5 && payload[0] == 0x2F {
            let first = u16::from_le_bytes([payload[1], payload[2]]);
            let width = 1 + (first & 0x3FFF) as u32;
            let last_two = ((first & 0xC000) >> 14) as u32;
            let second = u16::from_le_bytes([payload[3], payload[4]]);
            let height = 1 + ((((second & 0x0FFF) as u32) << 2) | last_two);
            return Ok((width, height));
        }
    }

    if let Some((_, payload)) = chunks.iter().find(|(type_, _)| type_ == VP8) {
        // Skip the 3-byte frame tag and 3-byte start code
        if payload.len() >= 10 {
            let width = (u16::from_le_bytes([payload[6], payload[7]]) & 0x3FFF) as u32;
            let height = (u16::from_le_bytes([payload[8], payload[9]]) & 0x3FFF) as u32;
            if width > 0 && height > 0 {
                return Ok((width, height));
            }
        }
    }

    Err(Error::InvalidFormat(
        "WebP missing VP8 or VP8L image data".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use std::io::Cursor;

    #[test]
    fn test_invalid_header() {
        let mut dest = Cursor::new(Vec::new());
        let result = WebpEditor::strip(&mut Cursor::new(vec![0u8; 20]), &mut dest);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_strip_removes_metadata_and_clears_flags() {
        let source = test_utils::webp_with_metadata();
        let mut dest = Cursor::new(Vec::new());
        WebpEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();
        let out = dest.into_inner();

        let chunks = test_utils::webp_chunks(&out).unwrap();
        let types: Vec<String> = chunks.iter().map(|c| c.type_name()).collect();
        assert_eq!(types, ["VP8X", "VP8 "]);

        let vp8x = &chunks[0];
        assert_eq!(vp8x.payload[0] & (FLAG_ICC | FLAG_EXIF | FLAG_XMP), 0);
        // Alpha bit untouched
        assert_eq!(vp8x.payload[0] & 0x10, 0x10);
    }

    #[test]
    fn test_strip_patches_riff_size() {
        let source = test_utils::webp_with_metadata();
        let mut dest = Cursor::new(Vec::new());
        WebpEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();
        let out = dest.into_inner();

        let size = u32::from_le_bytes([out[4], out[5], out[6], out[7]]);
        assert_eq!(size as usize, out.len() - 8);
    }

    #[test]
    fn test_strip_preserves_image_chunk_bytes() {
        let source = test_utils::webp_with_metadata();
        let mut dest = Cursor::new(Vec::new());
        WebpEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();
        let out = dest.into_inner();

        let vp8_in = test_utils::webp_chunks(&source)
            .unwrap()
            .into_iter()
            .find(|c| c.type_ == *b"VP8 ")
            .unwrap();
        let vp8_out = test_utils::webp_chunks(&out)
            .unwrap()
            .into_iter()
            .find(|c| c.type_ == *b"VP8 ")
            .unwrap();
        assert_eq!(vp8_in.payload, vp8_out.payload);
    }

    #[test]
    fn test_tag_appends_exif_and_sets_flag() {
        let source = test_utils::webp_with_metadata();
        let block = crate::exif::build_block(Some("c"), None, None);
        let mut dest = Vec::new();
        WebpEditor::tag(&mut Cursor::new(&source), &mut dest, &block, None).unwrap();

        let chunks = test_utils::webp_chunks(&dest).unwrap();
        let exif = chunks.iter().find(|c| c.type_ == *b"EXIF").unwrap();
        assert!(exif.payload.starts_with(b"II"));

        let vp8x = chunks.iter().find(|c| c.type_ == *b"VP8X").unwrap();
        assert_eq!(vp8x.payload[0] & FLAG_EXIF, FLAG_EXIF);

        // Image data follows VP8X, metadata follows image data
        let types: Vec<String> = chunks.iter().map(|c| c.type_name()).collect();
        assert_eq!(types.last().unwrap(), "EXIF");

        let size = u32::from_le_bytes([dest[4], dest[5], dest[6], dest[7]]);
        assert_eq!(size as usize, dest.len() - 8);
    }

    #[test]
    fn test_tag_synthesizes_vp8x_when_missing() {
        let source = test_utils::minimal_webp_lossy(320, 240);
        let block = crate::exif::build_block(Some("c"), None, None);
        let xmp = crate::xmp::build_packet(Some("c"), None);
        let mut dest = Vec::new();
        WebpEditor::tag(&mut Cursor::new(&source), &mut dest, &block, Some(&xmp)).unwrap();

        let chunks = test_utils::webp_chunks(&dest).unwrap();
        let types: Vec<String> = chunks.iter().map(|c| c.type_name()).collect();
        assert_eq!(types, ["VP8X", "VP8 ", "EXIF", "XMP "]);

        let vp8x = &chunks[0];
        assert_eq!(vp8x.payload.len(), 10);
        assert_eq!(vp8x.payload[0], FLAG_EXIF | FLAG_XMP);
        let width = 1 + u32::from_le_bytes([vp8x.payload[4], vp8x.payload[5], vp8x.payload[6], 0]);
        let height = 1 + u32::from_le_bytes([vp8x.payload[7], vp8x.payload[8], vp8x.payload[9], 0]);
        assert_eq!((width, height), (320, 240));
    }

    #[test]
    fn test_odd_payload_gets_pad_byte() {
        let source = test_utils::webp_with_odd_chunk();
        let mut dest = Cursor::new(Vec::new());
        WebpEditor::strip(&mut Cursor::new(&source), &mut dest).unwrap();
        let out = dest.into_inner();

        // Stream stays aligned: every chunk is still parseable
        let chunks = test_utils::webp_chunks(&out).unwrap();
        assert!(chunks.iter().any(|c| c.payload.len() % 2 == 1));
        assert_eq!(out.len() % 2, 0);
    }

    #[test]
    fn test_truncated_chunk_is_corruption() {
        let mut source = test_utils::webp_with_metadata();
        let len = source.len();
        source.truncate(len - 6);
        let mut dest = Cursor::new(Vec::new());
        let result = WebpEditor::strip(&mut Cursor::new(&source), &mut dest);
        assert!(matches!(result, Err(Error::ChunkCorruption { .. })));
    }

    #[test]
    fn test_extract_exif_round_trip() {
        let source = test_utils::minimal_webp_lossy(16, 16);
        let block = crate::exif::build_block(Some("© Acme"), None, None);
        let mut dest = Vec::new();
        WebpEditor::tag(&mut Cursor::new(&source), &mut dest, &block, None).unwrap();

        let exif = WebpEditor::extract_exif(&mut Cursor::new(&dest)).unwrap().unwrap();
        assert_eq!(crate::exif::ExifData::parse(&exif).copyright(), Some("© Acme"));
    }
}
