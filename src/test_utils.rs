//! Test utilities: in-memory fixture builders and stream walkers.
//!
//! Every fixture is a complete, minimal byte stream assembled by hand, so
//! tests exercise exact container framing without binary files in the
//! repository. The PNG fixtures are valid images (stored-deflate IDAT) and
//! decode with the `image` crate; the WebP/JPEG fixtures carry placeholder
//! image payloads with just enough real header structure for the editors.

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::formats::png::crc32;

// ---------------------------------------------------------------- PNG

/// PNG chunk with its framing, as read back from a stream.
#[derive(Debug, Clone)]
pub struct PngChunk {
    pub type_: [u8; 4],
    pub payload: Vec<u8>,
    pub crc: u32,
    /// The complete chunk bytes: length, type, payload, CRC
    pub raw: Vec<u8>,
}

impl PngChunk {
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.type_).into_owned()
    }
}

fn png_chunk(out: &mut Vec<u8>, type_: &[u8; 4], data: &[u8]) {
    out.write_u32::<BigEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(type_);
    out.extend_from_slice(data);
    out.write_u32::<BigEndian>(crc32(type_, data)).unwrap();
}

fn adler32(data: &[u8]) -> u32 {
    let mut s1: u32 = 1;
    let mut s2: u32 = 0;
    for &byte in data {
        s1 = (s1 + byte as u32) % 65521;
        s2 = (s2 + s1) % 65521;
    }
    (s2 << 16) | s1
}

/// IDAT payload for a 1x1 RGBA red pixel: zlib with one stored deflate
/// block, so the fixture decodes without a compressor.
fn stored_idat() -> Vec<u8> {
    let raw = [0x00, 0xFF, 0x00, 0x00, 0xFF]; // filter None + RGBA pixel
    let mut idat = vec![0x78, 0x01]; // zlib header
    idat.push(0x01); // final stored block
    idat.write_u16::<LittleEndian>(raw.len() as u16).unwrap();
    idat.write_u16::<LittleEndian>(!(raw.len() as u16)).unwrap();
    idat.extend_from_slice(&raw);
    idat.write_u32::<BigEndian>(adler32(&raw)).unwrap();
    idat
}

fn png_ihdr() -> [u8; 13] {
    [
        0x00, 0x00, 0x00, 0x01, // width 1
        0x00, 0x00, 0x00, 0x01, // height 1
        0x08, // bit depth
        0x06, // color type RGBA
        0x00, // compression
        0x00, // filter
        0x00, // interlace
    ]
}

/// Minimal decodable PNG: signature, IHDR, IDAT, IEND.
pub fn minimal_png() -> Vec<u8> {
    let mut out = crate::formats::png::PNG_SIGNATURE.to_vec();
    png_chunk(&mut out, b"IHDR", &png_ihdr());
    png_chunk(&mut out, b"IDAT", &stored_idat());
    png_chunk(&mut out, b"IEND", &[]);
    out
}

/// Decodable PNG carrying one eXIf chunk (raw TIFF payload) before IDAT.
pub fn png_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut out = crate::formats::png::PNG_SIGNATURE.to_vec();
    png_chunk(&mut out, b"IHDR", &png_ihdr());
    png_chunk(&mut out, b"eXIf", tiff);
    png_chunk(&mut out, b"IDAT", &stored_idat());
    png_chunk(&mut out, b"IEND", &[]);
    out
}

/// Decodable PNG with the usual metadata spread: tEXt, pHYs, tIME, eXIf.
pub fn png_with_metadata() -> Vec<u8> {
    let block = crate::exif::build_block(Some("old notice"), None, None);

    let mut out = crate::formats::png::PNG_SIGNATURE.to_vec();
    png_chunk(&mut out, b"IHDR", &png_ihdr());
    png_chunk(&mut out, b"tEXt", b"Comment\0shot on a potato");
    png_chunk(
        &mut out,
        b"pHYs",
        &[0x00, 0x00, 0x0B, 0x13, 0x00, 0x00, 0x0B, 0x13, 0x01],
    );
    png_chunk(&mut out, b"tIME", &[0x07, 0xE9, 0x01, 0x01, 0x00, 0x00, 0x00]);
    png_chunk(&mut out, b"eXIf", crate::exif::raw_tiff(&block));
    png_chunk(&mut out, b"IDAT", &stored_idat());
    png_chunk(&mut out, b"IEND", &[]);
    out
}

/// Walk a PNG stream into its chunks. `None` on malformed framing.
pub fn png_chunks(data: &[u8]) -> Option<Vec<PngChunk>> {
    if !data.starts_with(crate::formats::png::PNG_SIGNATURE) {
        return None;
    }

    let mut chunks = Vec::new();
    let mut pos = 8usize;
    while pos + 8 <= data.len() {
        let length = u32::from_be_bytes(data[pos..pos + 4].try_into().ok()?) as usize;
        let end = pos + 8 + length + 4;
        if end > data.len() {
            return None;
        }
        chunks.push(PngChunk {
            type_: data[pos + 4..pos + 8].try_into().ok()?,
            payload: data[pos + 8..pos + 8 + length].to_vec(),
            crc: u32::from_be_bytes(data[pos + 8 + length..end].try_into().ok()?),
            raw: data[pos..end].to_vec(),
        });
        pos = end;
    }
    Some(chunks)
}

// ---------------------------------------------------------------- WebP

/// RIFF chunk as read back from a WebP stream.
#[derive(Debug, Clone)]
pub struct WebpChunk {
    pub type_: [u8; 4],
    pub payload: Vec<u8>,
}

impl WebpChunk {
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.type_).into_owned()
    }
}

fn webp_chunk(out: &mut Vec<u8>, type_: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(type_);
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(data);
    if data.len() % 2 != 0 {
        out.push(0);
    }
}

fn webp_assemble(chunks: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (type_, payload) in chunks {
        webp_chunk(&mut body, type_, payload);
    }

    let mut out = b"RIFF".to_vec();
    out.write_u32::<LittleEndian>(4 + body.len() as u32).unwrap();
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&body);
    out
}

/// VP8 payload with a real-enough frame header: 3-byte frame tag, start
/// code, then width/height as u16le. Scan bytes are placeholder.
fn vp8_payload(width: u16, height: u16) -> Vec<u8> {
    let mut payload = vec![0x30, 0x01, 0x00, 0x9D, 0x01, 0x2A];
    payload.write_u16::<LittleEndian>(width).unwrap();
    payload.write_u16::<LittleEndian>(height).unwrap();
    payload.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
    payload
}

/// Simple lossy WebP: RIFF header and one VP8 chunk, no VP8X.
pub fn minimal_webp_lossy(width: u16, height: u16) -> Vec<u8> {
    webp_assemble(&[(*b"VP8 ", vp8_payload(width, height))])
}

/// Extended WebP (16x16) carrying VP8X with alpha + all metadata flag bits,
/// an ICC profile, an EXIF block, and an XMP packet.
pub fn webp_with_metadata() -> Vec<u8> {
    let mut vp8x = vec![0x3C, 0x00, 0x00, 0x00]; // alpha | ICC | EXIF | XMP
    vp8x.write_u24::<LittleEndian>(15).unwrap(); // width - 1
    vp8x.write_u24::<LittleEndian>(15).unwrap(); // height - 1

    let block = crate::exif::build_block(Some("old notice"), None, None);
    let xmp = crate::xmp::build_packet(Some("old notice"), None);

    webp_assemble(&[
        (*b"VP8X", vp8x),
        (*b"ICCP", b"fake icc profile".to_vec()),
        (*b"VP8 ", vp8_payload(16, 16)),
        (*b"EXIF", crate::exif::raw_tiff(&block).to_vec()),
        (*b"XMP ", xmp),
    ])
}

/// WebP whose image chunk has an odd-sized payload (exercises pad bytes),
/// plus one odd-sized metadata chunk to strip.
pub fn webp_with_odd_chunk() -> Vec<u8> {
    let mut vp8 = vp8_payload(8, 8);
    vp8.push(0x55); // force odd length
    webp_assemble(&[(*b"VP8 ", vp8), (*b"EXIF", vec![0xAA; 7])])
}

/// Walk a WebP stream into its chunks. `None` on malformed framing.
pub fn webp_chunks(data: &[u8]) -> Option<Vec<WebpChunk>> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return None;
    }

    let mut chunks = Vec::new();
    let mut pos = 12usize;
    while pos + 8 <= data.len() {
        let size = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().ok()?) as usize;
        let end = pos + 8 + size;
        if end > data.len() {
            return None;
        }
        chunks.push(WebpChunk {
            type_: data[pos..pos + 4].try_into().ok()?,
            payload: data[pos + 8..end].to_vec(),
        });
        pos = end + (size & 1);
    }
    Some(chunks)
}

// ---------------------------------------------------------------- JPEG

fn jpeg_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.write_u16::<BigEndian>(payload.len() as u16 + 2).unwrap();
    out.extend_from_slice(payload);
}

const JFIF_PAYLOAD: [u8; 14] = [
    b'J', b'F', b'I', b'F', 0x00, // identifier
    0x01, 0x01, // version
    0x00, // units
    0x00, 0x01, 0x00, 0x01, // density
    0x00, 0x00, // thumbnail
];

/// Minimal JPEG shell: SOI, APP0/JFIF, SOS with placeholder scan, EOI.
/// Not decodable, but the editors never decode scan data.
pub fn minimal_jpeg() -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    jpeg_segment(&mut out, 0xE0, &JFIF_PAYLOAD);
    jpeg_segment(&mut out, 0xDA, &[0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]); // placeholder scan
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// JPEG shell carrying an EXIF APP1 (from `exif_block`), an XMP APP1, and
/// a COM segment before the scan.
pub fn jpeg_with_metadata(exif_block: &[u8]) -> Vec<u8> {
    let mut app1_exif = crate::exif::EXIF_HEADER.to_vec();
    app1_exif.extend_from_slice(crate::exif::raw_tiff(exif_block));

    let mut app1_xmp = b"http://ns.adobe.com/xap/1.0/\0".to_vec();
    app1_xmp.extend_from_slice(b"<x:xmpmeta/>");

    let mut out = vec![0xFF, 0xD8];
    jpeg_segment(&mut out, 0xE0, &JFIF_PAYLOAD);
    jpeg_segment(&mut out, 0xE1, &app1_exif);
    jpeg_segment(&mut out, 0xE1, &app1_xmp);
    jpeg_segment(&mut out, 0xFE, b"a comment");
    jpeg_segment(&mut out, 0xDA, &[0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Marker bytes of each segment up to and including SOS.
/// `None` on malformed framing.
pub fn jpeg_markers(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut markers = Vec::new();
    let mut pos = 2usize;
    while pos + 2 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        markers.push(marker);
        match marker {
            0xDA | 0xD9 => break,
            0x01 | 0xD0..=0xD7 => pos += 2,
            _ => {
                if pos + 4 > data.len() {
                    return None;
                }
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }
    Some(markers)
}

/// Everything from the SOS marker to the end of the stream (scan data plus
/// trailing EOI), for byte-identity assertions.
pub fn jpeg_scan_data(data: &[u8]) -> Option<Vec<u8>> {
    let mut pos = 2usize;
    while pos + 2 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xDA {
            return Some(data[pos..].to_vec());
        }
        match marker {
            0x01 | 0xD0..=0xD7 => pos += 2,
            _ => {
                if pos + 4 > data.len() {
                    return None;
                }
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }
    None
}
