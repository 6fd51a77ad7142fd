#![no_main]

use imprint_io::exif::{self, ExifData};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Corrupt blocks must parse to empty data, not panic
    let parsed = ExifData::parse(data);
    let _ = parsed.copyright();
    let _ = parsed.artist();

    // Merging over arbitrary bytes must always produce an encodable block
    let block = exif::build_block(Some("fuzz"), Some("fuzz"), Some(data));
    assert!(block.starts_with(exif::EXIF_HEADER));
});
