//! Fuzz target for `irrigation.toml` parsing and resolution.
//!
//! Goal: parsing and resolving should **never panic** on any input.
//! Both may return errors.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_config
//! ```

#![no_main]

use irrigation_settings::{Overrides, parse_config_toml, resolve_config};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(cfg) = parse_config_toml(text) {
            let _ = resolve_config(cfg, Overrides::default());
        }
    }
});
