//! Fuzz target for path patterns.
//!
//! Any pattern and path must be handled without panicking, and a match must
//! yield one value per parameter.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use switchyard_router::PathPattern;

#[derive(Debug, Arbitrary)]
struct Input {
    pattern: String,
    path: String,
}

fuzz_target!(|input: Input| {
    let pattern = PathPattern::parse(input.pattern);
    if pattern.matches(&input.path) {
        let params = pattern.extract_params(&input.path);
        if !pattern.is_wildcard() {
            assert!(params.len() <= pattern.param_names().len());
            assert!(params.values().all(|value| !value.is_empty()));
        }
    }
});
