//! Fuzz target for run bundle reading.
//!
//! Bundles may be handed over from elsewhere for re-scoring, so parsing
//! must handle arbitrary bytes without panicking.

#![no_main]

use cs_bundle::BundleReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = BundleReader::from_bytes(data.to_vec()) {
        let _ = reader.verify_all();
        let _ = reader.read_summary::<serde_json::Value>();
    }
});
