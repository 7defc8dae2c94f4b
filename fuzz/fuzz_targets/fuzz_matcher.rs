//! Fuzz target for message selection.
//!
//! Arbitrary JSON payloads are matched against a registry mixing every
//! matcher form.

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::json;
use switchyard_router::{Matcher, MessageKind, MessageSchema, Registry};

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let mut registry = Registry::new();
    registry.register_client(Matcher::field_eq("type", "chat:message").and("v", 1), None, None);
    registry.register_client(
        Matcher::field("type"),
        Some(MessageSchema::new(json!({
            "properties": {"type": {"const": "chat:typing"}}
        }))),
        None,
    );
    registry.register_client(
        Matcher::predicate(|payload| payload.as_array().is_some_and(|a| a.len() > 2)),
        None,
        None,
    );
    registry.register_server(Matcher::any(), None);

    let _ = registry.find(MessageKind::Client, &payload);
    assert!(registry.find(MessageKind::Server, &payload).is_some());
});
