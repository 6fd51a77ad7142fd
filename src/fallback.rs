//! Re-encode fallback
//!
//! Used when no lossless surgery path exists (TIFF, AVIF) or when one fails
//! on a malformed stream. Decoding to a pixel buffer discards every
//! format-level ancillary field by construction; transparency survives
//! because the buffer keeps its alpha channel.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{codecs::jpeg::JpegEncoder, codecs::webp::WebPEncoder, DynamicImage, ImageReader};

use crate::error::Result;
use crate::formats::Format;

/// Quality used when the fallback writes JPEG, matching the lossless
/// paths' "no visible recompression" expectation.
const JPEG_QUALITY: u8 = 95;

/// Decode `source` and re-encode it to `dest` as `format`, dropping all
/// metadata.
pub fn reencode(source: &Path, dest: &Path, format: Format) -> Result<()> {
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;
    log::debug!(
        "re-encoding {} as {} ({}x{})",
        source.display(),
        format.label(),
        img.width(),
        img.height()
    );

    match format {
        Format::Jpeg => {
            // JPEG has no alpha; flatten before encoding
            let mut writer = BufWriter::new(File::create(dest)?);
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
            writer.flush()?;
        }
        Format::Webp => {
            // The webp encoder is lossless and takes 8-bit RGB(A) only
            let mut writer = BufWriter::new(File::create(dest)?);
            let encoder = WebPEncoder::new_lossless(&mut writer);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?;
            writer.flush()?;
        }
        Format::Png | Format::Tiff | Format::Avif => {
            img.save_with_format(dest, format.image_format())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reencode_preserves_pixels_and_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.png");
        let dest = dir.path().join("out.png");

        let mut buf = image::RgbaImage::new(2, 1);
        buf.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        buf.put_pixel(1, 0, image::Rgba([0, 255, 0, 128]));
        buf.save(&source).unwrap();

        reencode(&source, &dest, Format::Png).unwrap();

        let out = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(out.get_pixel(1, 0), &image::Rgba([0, 255, 0, 128]));
    }

    #[test]
    fn test_reencode_unreadable_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("garbage.png");
        std::fs::write(&source, b"not an image").unwrap();

        let result = reencode(&source, &dir.path().join("out.png"), Format::Png);
        assert!(result.is_err());
    }
}
