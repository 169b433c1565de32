//! Fuzz target for ZIP archive expansion.
//!
//! This fuzzer feeds arbitrary byte sequences to the archive entry
//! lister, driving central-directory parsing, path sanitization, and
//! entry decompression.

#![no_main]

use annoport::payload::archive_entries;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = archive_entries(data, "<fuzz>");
});
