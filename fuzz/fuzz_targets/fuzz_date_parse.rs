//! Fuzz target for date cell parsing.

#![no_main]

use cs_core::normalize::dates::{encode_timestamp, parse_timestamp};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Never panics; parsed values always encode to a finite number
    if let Some(ts) = parse_timestamp(data) {
        assert!(encode_timestamp(&ts).is_finite());
    }
});
