//! Fuzz target for normalized-text single-row parsing.
//!
//! This fuzzer feeds arbitrary UTF-8 lines to the YOLO row parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use annoport::formats::yolo::fuzz_parse_label_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    fuzz_parse_label_line(line);
});
