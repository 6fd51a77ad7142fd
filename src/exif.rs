//! TIFF/EXIF block builder and parser
//!
//! This module builds the EXIF byte block embedded by the format editors and
//! parses existing blocks so their tags can be merged instead of discarded.
//!
//! TIFF Structure:
//! - Header: byte order (II/MM), magic (0x002A), IFD offset
//! - IFD (Image File Directory): tag count, tags (12 bytes each), next IFD offset
//! - Tags: tag ID (2), type (2), count (4), value/offset (4)
//!
//! Parsing accepts both byte orders; encoding always emits little-endian
//! ("II"), so output is deterministic regardless of the source file.

use std::collections::BTreeMap;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::Result;

/// The "Exif\0\0" prefix that precedes TIFF data in a JPEG APP1 segment.
///
/// PNG `eXIf` chunks and WebP `EXIF` chunks store the raw TIFF data without
/// this prefix.
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// TIFF/EXIF tag IDs
pub mod tags {
    pub const ARTIST: u16 = 0x013B;
    pub const COPYRIGHT: u16 = 0x8298;
    /// Windows extended author tag (UTF-16LE, read by filesystem property
    /// viewers in preference to ARTIST)
    pub const XP_AUTHOR: u16 = 0x9C9D;

    pub const EXIF_IFD_POINTER: u16 = 0x8769;
    pub const GPS_IFD_POINTER: u16 = 0x8825;
    pub const INTEROP_IFD_POINTER: u16 = 0xA005;

    // IFD1 (thumbnail) pointer tags, dropped on encode
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
}

/// TIFF data types
mod types {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
}

/// Byte width of one element of a TIFF data type, `None` for unknown types.
fn type_size(type_: u16) -> Option<usize> {
    match type_ {
        1 | 2 | 6 | 7 => Some(1), // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),         // SHORT, SSHORT
        4 | 9 | 11 => Some(4),    // LONG, SLONG, FLOAT
        5 | 10 | 12 => Some(8),   // RATIONAL, SRATIONAL, DOUBLE
        _ => None,
    }
}

/// Byte order for reading multi-byte values
#[derive(Debug, Clone, Copy)]
enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    fn read_u16(&self, data: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([data[0], data[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([data[0], data[1]]),
        }
    }

    fn read_u32(&self, data: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            ByteOrder::BigEndian => u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
        }
    }
}

/// A decoded tag value.
///
/// Tags the editor interprets get a structured variant; everything else is
/// carried through verbatim as [`TagValue::Raw`] so merging preserves tags
/// it does not understand (camera make/model, exposure data, rationals).
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// NUL-terminated ASCII text
    Ascii(String),
    /// Single unsigned short
    Short(u16),
    /// Single unsigned long
    Long(u32),
    /// Raw byte payload (TIFF type BYTE)
    Bytes(Vec<u8>),
    /// UTF-16LE, NUL-terminated text stored as a BYTE array (XP* tags)
    Utf16(String),
    /// Uninterpreted entry: TIFF type, element count, payload in
    /// little-endian element order
    Raw { type_: u16, count: u32, data: Vec<u8> },
}

impl TagValue {
    /// Wire form: (TIFF type, element count, payload bytes, little-endian)
    fn wire(&self) -> (u16, u32, Vec<u8>) {
        match self {
            TagValue::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                (types::ASCII, bytes.len() as u32, bytes)
            }
            TagValue::Short(v) => (types::SHORT, 1, v.to_le_bytes().to_vec()),
            TagValue::Long(v) => (types::LONG, 1, v.to_le_bytes().to_vec()),
            TagValue::Bytes(b) => (types::BYTE, b.len() as u32, b.clone()),
            TagValue::Utf16(s) => {
                let mut bytes: Vec<u8> = s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
                bytes.push(0);
                bytes.push(0);
                (types::BYTE, bytes.len() as u32, bytes)
            }
            TagValue::Raw { type_, count, data } => (*type_, *count, data.clone()),
        }
    }
}

/// Maximum number of tags in an IFD (prevents DOS attacks)
const MAX_IFD_TAGS: u16 = 1000;

/// An EXIF block decomposed into its IFD sections.
///
/// Section maps are keyed by tag ID; `BTreeMap` keeps the ascending tag
/// order TIFF mandates and makes encoded output deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifData {
    /// 0th IFD (main image): copyright, artist, camera make/model, ...
    pub ifd0: BTreeMap<u16, TagValue>,
    /// Exif sub-IFD: exposure, capture date, ...
    pub exif: BTreeMap<u16, TagValue>,
    /// GPS sub-IFD
    pub gps: BTreeMap<u16, TagValue>,
    /// 1st IFD (thumbnail)
    pub ifd1: BTreeMap<u16, TagValue>,
}

impl ExifData {
    /// Parse an EXIF block, with or without the "Exif\0\0" prefix.
    ///
    /// Unknown or corrupt input yields an empty `ExifData`, never an error:
    /// a broken block in the source must not stop a tag operation.
    pub fn parse(data: &[u8]) -> Self {
        Self::parse_inner(data).unwrap_or_default()
    }

    fn parse_inner(data: &[u8]) -> Option<Self> {
        let tiff = raw_tiff(data);
        if tiff.len() < 8 {
            return None;
        }

        let order = match &tiff[0..2] {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => return None,
        };
        if order.read_u16(&tiff[2..4]) != 0x002A {
            return None;
        }

        let ifd0_offset = order.read_u32(&tiff[4..8]);

        let mut out = ExifData::default();
        let ifd0 = parse_ifd(tiff, ifd0_offset, order, &mut out.ifd0)?;

        if let Some(exif_offset) = ifd0.exif_pointer {
            let _ = parse_ifd(tiff, exif_offset, order, &mut out.exif);
        }
        if let Some(gps_offset) = ifd0.gps_pointer {
            let _ = parse_ifd(tiff, gps_offset, order, &mut out.gps);
        }
        if ifd0.next_ifd != 0 {
            let _ = parse_ifd(tiff, ifd0.next_ifd, order, &mut out.ifd1);
        }

        Some(out)
    }

    /// True if no section carries any tag.
    pub fn is_empty(&self) -> bool {
        self.ifd0.is_empty() && self.exif.is_empty() && self.gps.is_empty() && self.ifd1.is_empty()
    }

    /// Copyright notice (tag 0x8298), if present as ASCII.
    pub fn copyright(&self) -> Option<&str> {
        match self.ifd0.get(&tags::COPYRIGHT) {
            Some(TagValue::Ascii(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Artist name (tag 0x013B), if present as ASCII.
    pub fn artist(&self) -> Option<&str> {
        match self.ifd0.get(&tags::ARTIST) {
            Some(TagValue::Ascii(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Encode as little-endian TIFF data (no "Exif\0\0" prefix).
    ///
    /// Layout: header, IFD0, Exif IFD, GPS IFD, 1st IFD, with pointer tags
    /// regenerated and value areas relocated. Thumbnail pointer tags in the
    /// 1st IFD are dropped since no thumbnail bytes are carried.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut ifd0 = self.ifd0.clone();
        ifd0.remove(&tags::EXIF_IFD_POINTER);
        ifd0.remove(&tags::GPS_IFD_POINTER);

        let mut ifd1 = self.ifd1.clone();
        ifd1.remove(&tags::JPEG_INTERCHANGE_FORMAT);
        ifd1.remove(&tags::JPEG_INTERCHANGE_FORMAT_LENGTH);

        // Pointer placeholders so section sizes are final before offsets
        // are computed (a Long entry has a fixed 12-byte footprint).
        if !self.exif.is_empty() {
            ifd0.insert(tags::EXIF_IFD_POINTER, TagValue::Long(0));
        }
        if !self.gps.is_empty() {
            ifd0.insert(tags::GPS_IFD_POINTER, TagValue::Long(0));
        }

        let ifd0_offset = 8u32;
        let mut cursor = ifd0_offset + encoded_len(&ifd0);

        let exif_offset = cursor;
        if !self.exif.is_empty() {
            cursor += encoded_len(&self.exif);
        }
        let gps_offset = cursor;
        if !self.gps.is_empty() {
            cursor += encoded_len(&self.gps);
        }
        let ifd1_offset = cursor;

        if !self.exif.is_empty() {
            ifd0.insert(tags::EXIF_IFD_POINTER, TagValue::Long(exif_offset));
        }
        if !self.gps.is_empty() {
            ifd0.insert(tags::GPS_IFD_POINTER, TagValue::Long(gps_offset));
        }
        let next0 = if ifd1.is_empty() { 0 } else { ifd1_offset };

        let mut out = Vec::new();
        out.extend_from_slice(b"II");
        out.write_u16::<LittleEndian>(0x002A)?;
        out.write_u32::<LittleEndian>(ifd0_offset)?;

        serialize_ifd(&ifd0, ifd0_offset, next0, &mut out)?;
        if !self.exif.is_empty() {
            serialize_ifd(&self.exif, exif_offset, 0, &mut out)?;
        }
        if !self.gps.is_empty() {
            serialize_ifd(&self.gps, gps_offset, 0, &mut out)?;
        }
        if !ifd1.is_empty() {
            serialize_ifd(&ifd1, ifd1_offset, 0, &mut out)?;
        }

        Ok(out)
    }
}

/// Pointers discovered while walking an IFD.
#[derive(Debug, Default)]
struct IfdPointers {
    next_ifd: u32,
    exif_pointer: Option<u32>,
    gps_pointer: Option<u32>,
}

/// Walk one IFD, filling `map` with decoded entries.
///
/// Structural tags (sub-IFD pointers) are returned instead of stored;
/// entries with bad offsets or unknown types are skipped, not fatal.
fn parse_ifd(
    data: &[u8],
    offset: u32,
    order: ByteOrder,
    map: &mut BTreeMap<u16, TagValue>,
) -> Option<IfdPointers> {
    let offset = offset as usize;
    if offset + 2 > data.len() {
        return None;
    }

    let tag_count = order.read_u16(&data[offset..offset + 2]);
    if tag_count > MAX_IFD_TAGS {
        return None;
    }

    let mut pointers = IfdPointers::default();

    for i in 0..tag_count as usize {
        let entry = offset + 2 + i * 12;
        if entry + 12 > data.len() {
            break;
        }

        let tag_id = order.read_u16(&data[entry..entry + 2]);
        let type_ = order.read_u16(&data[entry + 2..entry + 4]);
        let count = order.read_u32(&data[entry + 4..entry + 8]);
        let value_or_offset = order.read_u32(&data[entry + 8..entry + 12]);

        match tag_id {
            tags::EXIF_IFD_POINTER => {
                pointers.exif_pointer = Some(value_or_offset);
                continue;
            }
            tags::GPS_IFD_POINTER => {
                pointers.gps_pointer = Some(value_or_offset);
                continue;
            }
            // Interoperability IFD is dropped: its pointer would go stale
            // once values are relocated and it carries nothing we keep.
            tags::INTEROP_IFD_POINTER => continue,
            _ => {}
        }

        let Some(unit) = type_size(type_) else {
            continue;
        };
        let Some(total) = unit.checked_mul(count as usize) else {
            continue;
        };

        let bytes: Vec<u8> = if total <= 4 {
            data[entry + 8..entry + 8 + total].to_vec()
        } else {
            let start = value_or_offset as usize;
            let Some(end) = start.checked_add(total) else {
                continue;
            };
            if end > data.len() {
                continue;
            }
            data[start..end].to_vec()
        };

        let value = decode_value(type_, count, bytes, order);
        map.insert(tag_id, value);
    }

    let next_pos = offset + 2 + tag_count as usize * 12;
    if next_pos + 4 <= data.len() {
        let next = order.read_u32(&data[next_pos..next_pos + 4]);
        if (next as usize) < data.len() {
            pointers.next_ifd = next;
        }
    }

    Some(pointers)
}

/// Decode one entry's payload into a `TagValue`, normalizing multi-byte
/// element payloads to little-endian so re-encoding is order-independent.
fn decode_value(type_: u16, count: u32, bytes: Vec<u8>, order: ByteOrder) -> TagValue {
    match type_ {
        types::ASCII => match String::from_utf8(bytes.clone()) {
            Ok(s) => TagValue::Ascii(s.trim_end_matches('\0').to_string()),
            Err(_) => TagValue::Raw {
                type_,
                count,
                data: bytes,
            },
        },
        types::SHORT if count == 1 && bytes.len() >= 2 => TagValue::Short(order.read_u16(&bytes)),
        types::LONG if count == 1 && bytes.len() >= 4 => TagValue::Long(order.read_u32(&bytes)),
        types::BYTE => TagValue::Bytes(bytes),
        _ => TagValue::Raw {
            type_,
            count,
            data: to_little_endian(type_, bytes, order),
        },
    }
}

/// Byte-swap a raw payload from the file's element order to little-endian.
///
/// RATIONAL types swap per 4-byte half, not per 8-byte element.
fn to_little_endian(type_: u16, bytes: Vec<u8>, order: ByteOrder) -> Vec<u8> {
    let swap = match (order, type_) {
        (ByteOrder::LittleEndian, _) => return bytes,
        (_, 3 | 8) => 2,
        (_, 4 | 9 | 11) => 4,
        (_, 5 | 10) => 4,
        (_, 12) => 8,
        _ => return bytes,
    };

    let mut out = bytes;
    for group in out.chunks_exact_mut(swap) {
        group.reverse();
    }
    out
}

/// Total encoded size of one IFD including its relocated value area.
fn encoded_len(map: &BTreeMap<u16, TagValue>) -> u32 {
    let mut len = 2 + 12 * map.len() as u32 + 4;
    for value in map.values() {
        let (_, _, payload) = value.wire();
        if payload.len() > 4 {
            // Values keep word alignment, so odd payloads get a pad byte.
            len += (payload.len() as u32 + 1) & !1;
        }
    }
    len
}

/// Serialize one IFD at `base_offset` into `out`.
fn serialize_ifd(
    map: &BTreeMap<u16, TagValue>,
    base_offset: u32,
    next_ifd: u32,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mut values: Vec<u8> = Vec::new();
    let value_base = base_offset + 2 + 12 * map.len() as u32 + 4;

    out.write_u16::<LittleEndian>(map.len() as u16)?;
    for (tag, value) in map {
        let (type_, count, payload) = value.wire();
        out.write_u16::<LittleEndian>(*tag)?;
        out.write_u16::<LittleEndian>(type_)?;
        out.write_u32::<LittleEndian>(count)?;

        if payload.len() <= 4 {
            out.extend_from_slice(&payload);
            for _ in payload.len()..4 {
                out.push(0);
            }
        } else {
            out.write_u32::<LittleEndian>(value_base + values.len() as u32)?;
            values.extend_from_slice(&payload);
            if payload.len() % 2 != 0 {
                values.push(0);
            }
        }
    }
    out.write_u32::<LittleEndian>(next_ifd)?;
    out.extend_from_slice(&values);

    Ok(())
}

/// Strip the "Exif\0\0" prefix if present, returning the TIFF data.
pub fn raw_tiff(block: &[u8]) -> &[u8] {
    if block.starts_with(EXIF_HEADER) {
        &block[EXIF_HEADER.len()..]
    } else {
        block
    }
}

/// Build an EXIF block carrying the given copyright and artist, merged over
/// any tags already present in `existing`.
///
/// The copyright goes to tag 0x8298 and the artist to both tag 0x013B and
/// the Windows extended author tag 0x9C9D (UTF-16LE). Matching tags in
/// `existing` are overridden; everything else is preserved. Returns the
/// full block with the "Exif\0\0" prefix.
///
/// Never fails hard: an internal encode error degrades to a minimal empty
/// block, since metadata tagging must never block image delivery.
pub fn build_block(copyright: Option<&str>, artist: Option<&str>, existing: Option<&[u8]>) -> Vec<u8> {
    let mut exif = existing.map(ExifData::parse).unwrap_or_default();

    if let Some(text) = copyright.filter(|t| !t.is_empty()) {
        exif.ifd0.insert(tags::COPYRIGHT, TagValue::Ascii(text.to_string()));
    }
    if let Some(name) = artist.filter(|n| !n.is_empty()) {
        exif.ifd0.insert(tags::ARTIST, TagValue::Ascii(name.to_string()));
        exif.ifd0.insert(tags::XP_AUTHOR, TagValue::Utf16(name.to_string()));
    }

    match exif.encode() {
        Ok(tiff) => {
            let mut block = EXIF_HEADER.to_vec();
            block.extend_from_slice(&tiff);
            block
        }
        Err(err) => {
            log::warn!("EXIF encode failed ({err}), writing minimal block");
            let mut block = EXIF_HEADER.to_vec();
            // "II", magic, IFD0 at 8, zero tags, no next IFD
            block.extend_from_slice(&[
                0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]);
            block
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order() {
        let be = ByteOrder::BigEndian;
        let le = ByteOrder::LittleEndian;

        assert_eq!(be.read_u16(&[0x12, 0x34]), 0x1234);
        assert_eq!(le.read_u16(&[0x34, 0x12]), 0x1234);

        assert_eq!(be.read_u32(&[0x12, 0x34, 0x56, 0x78]), 0x12345678);
        assert_eq!(le.read_u32(&[0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_build_and_parse_round_trip() {
        let block = build_block(Some("© 2025 Acme"), Some("J. Doe"), None);
        assert!(block.starts_with(EXIF_HEADER));

        let parsed = ExifData::parse(&block);
        assert_eq!(parsed.copyright(), Some("© 2025 Acme"));
        assert_eq!(parsed.artist(), Some("J. Doe"));
    }

    #[test]
    fn test_xp_author_is_utf16le() {
        let block = build_block(None, Some("J. Doe"), None);
        let parsed = ExifData::parse(&block);

        let expected: Vec<u8> = "J. Doe"
            .encode_utf16()
            .flat_map(|c| c.to_le_bytes())
            .chain([0, 0])
            .collect();
        assert_eq!(
            parsed.ifd0.get(&tags::XP_AUTHOR),
            Some(&TagValue::Bytes(expected))
        );
    }

    #[test]
    fn test_merge_preserves_unrelated_tags() {
        // Build a block with a camera model and a stale copyright, then
        // re-tag: only copyright/artist may change.
        let mut original = ExifData::default();
        original
            .ifd0
            .insert(0x0110, TagValue::Ascii("EOS R5".into()));
        original
            .ifd0
            .insert(tags::COPYRIGHT, TagValue::Ascii("old".into()));
        original
            .exif
            .insert(0x8827, TagValue::Short(400)); // ISO
        let encoded = original.encode().unwrap();

        let block = build_block(Some("new"), Some("J. Doe"), Some(&encoded));
        let merged = ExifData::parse(&block);

        assert_eq!(merged.copyright(), Some("new"));
        assert_eq!(merged.artist(), Some("J. Doe"));
        assert_eq!(
            merged.ifd0.get(&0x0110),
            Some(&TagValue::Ascii("EOS R5".into()))
        );
        assert_eq!(merged.exif.get(&0x8827), Some(&TagValue::Short(400)));
    }

    #[test]
    fn test_parse_big_endian() {
        // Hand-assembled "MM" block: IFD0 with one SHORT tag (Orientation = 1)
        let data: Vec<u8> = vec![
            0x4D, 0x4D, // MM
            0x00, 0x2A, // magic
            0x00, 0x00, 0x00, 0x08, // IFD0 offset
            0x00, 0x01, // one tag
            0x01, 0x12, // Orientation
            0x00, 0x03, // SHORT
            0x00, 0x00, 0x00, 0x01, // count
            0x00, 0x01, 0x00, 0x00, // value 1, inline
            0x00, 0x00, 0x00, 0x00, // no next IFD
        ];
        let parsed = ExifData::parse(&data);
        assert_eq!(parsed.ifd0.get(&0x0112), Some(&TagValue::Short(1)));
    }

    #[test]
    fn test_garbage_input_is_empty_not_error() {
        assert!(ExifData::parse(b"not tiff at all").is_empty());
        assert!(ExifData::parse(&[]).is_empty());
        assert!(ExifData::parse(&[0x49, 0x49, 0x2A]).is_empty());
    }

    #[test]
    fn test_corrupt_existing_block_is_ignored() {
        let block = build_block(Some("text"), None, Some(b"\xFF\xFF garbage"));
        let parsed = ExifData::parse(&block);
        assert_eq!(parsed.copyright(), Some("text"));
    }

    #[test]
    fn test_thumbnail_pointers_dropped_on_encode() {
        let mut data = ExifData::default();
        data.ifd1
            .insert(tags::JPEG_INTERCHANGE_FORMAT, TagValue::Long(1234));
        data.ifd1
            .insert(tags::JPEG_INTERCHANGE_FORMAT_LENGTH, TagValue::Long(99));
        data.ifd1.insert(0x0112, TagValue::Short(1));

        let parsed = ExifData::parse(&data.encode().unwrap());
        assert_eq!(parsed.ifd1.get(&0x0112), Some(&TagValue::Short(1)));
        assert!(!parsed.ifd1.contains_key(&tags::JPEG_INTERCHANGE_FORMAT));
    }

    #[test]
    fn test_deterministic_encoding() {
        let a = build_block(Some("c"), Some("a"), None);
        let b = build_block(Some("c"), Some("a"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_raw_tiff_strips_prefix() {
        let block = build_block(Some("x"), None, None);
        assert!(raw_tiff(&block).starts_with(b"II"));
        assert_eq!(raw_tiff(b"II*\x00rest"), b"II*\x00rest");
    }
}
