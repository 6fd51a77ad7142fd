#![no_main]

use imprint_io::PngEditor;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Rewriting arbitrary input must only return errors, never panic
    let mut dest = Vec::new();
    let _ = PngEditor::strip(&mut Cursor::new(data), &mut dest);

    let block = imprint_io::exif::build_block(Some("fuzz"), None, None);
    let mut dest = Vec::new();
    let _ = PngEditor::tag(&mut Cursor::new(data), &mut dest, &block, &[], None);

    let _ = PngEditor::extract_exif(&mut Cursor::new(data));
});
