//! Fuzz target for per-image-XML document parsing.
//!
//! This fuzzer feeds arbitrary UTF-8 documents to the VOC XML parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use annoport::formats::voc_xml::fuzz_parse_voc_file;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(xml) = std::str::from_utf8(data) else {
        return;
    };

    fuzz_parse_voc_file(xml);
});
