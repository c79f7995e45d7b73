//! Fuzz target for scope and scope-selector parsing.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_scope_parse
//! ```

#![no_main]

use irrigation_types::{Scope, ScopeSelector};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(scope) = Scope::parse(text) {
            // A parsed scope must print back to something that parses to itself.
            let again = Scope::parse(&scope.to_string());
            assert_eq!(again.as_ref().ok(), Some(&scope));
        }
        let _ = ScopeSelector::parse(text);
    }
});
