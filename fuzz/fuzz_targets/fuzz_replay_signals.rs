//! Fuzz target for replay JSONL parsing.
//!
//! Every malformed line must surface as an error, never a panic.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_replay_signals
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = irrigation_app::parse_replay_signals(text);
    }
});
