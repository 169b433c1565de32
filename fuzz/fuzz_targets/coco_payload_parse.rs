//! Fuzz target for interchange-JSON payload parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the COCO payload parser,
//! which sniffs JSON from ZIP, expands archives, and merges multi-document
//! uploads, checking for panics, buffer overflows, or other undefined
//! behavior.
//!
//! Run with:
//!   cargo +nightly fuzz run coco_payload_parse
//!
//! Or with a corpus:
//!   cargo +nightly fuzz run coco_payload_parse fuzz/corpus/coco_payload_parse/

#![no_main]

use annoport::formats::coco::fuzz_parse_payload;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid OOM on very large inputs.
    // 10MB is generous for annotation payloads.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    // Try to parse the data. We don't care about errors,
    // only about panics, crashes, or hangs.
    fuzz_parse_payload(data);
});
