//! Fuzz target for request target splitting and query parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use switchyard_router::path::{parse_query, split_target};

fuzz_target!(|data: &[u8]| {
    let target = String::from_utf8_lossy(data);

    let (path, query) = split_target(&target);
    assert!(path.starts_with('/') || !target.contains("://"));
    assert!(!path.contains('?'));

    // Should never panic, including on malformed percent escapes
    let _ = parse_query(&query);
    let _ = parse_query(&target);
});
