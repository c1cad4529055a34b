//! Fuzz target for exporter TOML configuration parsing.
//!
//! Tests that config parsing and validation handle arbitrary input without
//! panicking.

#![no_main]

use std::path::Path;

use ce_common::ExporterConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = ExporterConfig::from_toml_str(text, Path::new("fuzz.toml")) {
        let _ = config.validate();
    }
});
