//! Fuzz target for CSV ingest followed by classification and normalization.
//!
//! Whatever the input, loading either fails with an error or yields a table
//! the normalizer turns into the same number of rows.

#![no_main]

use cs_config::SchemaConfig;
use cs_core::classify::ColumnClassifier;
use cs_core::normalize::FeatureNormalizer;
use cs_core::table::read_csv;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(table) = read_csv(data) else {
        return;
    };
    let rows = table.n_rows();
    let schema = SchemaConfig::default();
    let roles = ColumnClassifier::new(&schema).classify(&table.schema()).roles;
    if let Ok(out) = FeatureNormalizer::new(&schema).normalize(table, &roles) {
        assert_eq!(out.table.n_rows(), rows);
    }
});
