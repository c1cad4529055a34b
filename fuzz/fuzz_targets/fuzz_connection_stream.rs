//! Fuzz target for a whole connection's byte stream.
//!
//! Arbitrary bytes (invalid UTF-8, stray `\r`, no trailing newline) must
//! always produce a published run.

#![no_main]

use std::io::Cursor;
use std::sync::Arc;

use ce_core::handler::{ConnectionHandler, RunPhase};
use ce_core::memory_sink::MemorySink;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let sink = Arc::new(MemorySink::new());
    let report = ConnectionHandler::new(0, sink.clone(), None).run(Cursor::new(data));
    assert_eq!(report.phase, RunPhase::Published);
    assert_eq!(sink.durations().len(), 1);
});
