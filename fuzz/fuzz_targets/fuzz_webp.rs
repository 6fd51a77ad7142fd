#![no_main]

use imprint_io::WebpEditor;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut dest = Cursor::new(Vec::new());
    let _ = WebpEditor::strip(&mut Cursor::new(data), &mut dest);

    let block = imprint_io::exif::build_block(Some("fuzz"), None, None);
    let mut dest = Vec::new();
    let _ = WebpEditor::tag(&mut Cursor::new(data), &mut dest, &block, None);

    let _ = WebpEditor::extract_exif(&mut Cursor::new(data));
});
