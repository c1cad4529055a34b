//! Fuzz target for clamscan line classification.
//!
//! Lines come straight off the network, so classification must never panic
//! and must keep infection paths a prefix of the line.

#![no_main]

use ce_core::classify::{classify, Classification};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    match classify(&line) {
        Classification::InfectionFound { path, .. } => assert!(line.starts_with(path.as_str())),
        Classification::ErrorLine { raw } => assert_eq!(raw, line),
        _ => {}
    }
});
