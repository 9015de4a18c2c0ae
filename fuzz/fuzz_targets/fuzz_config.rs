//! Fuzz target for pipeline configuration parsing and validation.

#![no_main]

use cs_config::{validate_config, PipelineConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Parse then validate - should never panic, only return an error
    if let Ok(config) = PipelineConfig::from_json(text) {
        let _ = validate_config(&config);
    }
});
