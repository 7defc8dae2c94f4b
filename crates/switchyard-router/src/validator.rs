//! Payload validation seam.

use serde_json::Value;

/// Validates a payload against a message schema's payload JSON Schema.
///
/// The router does not interpret schemas. On failure the validator returns
/// a human-readable message which is reported to the application as-is.
/// Validation is synchronous; asynchronous checks belong in a
/// [`ValueStage::PreValidation`](crate::hooks::ValueStage::PreValidation) hook.
pub trait Validator: Send + Sync {
    /// Validate `payload` against `schema`.
    fn validate(&self, schema: &Value, payload: &Value) -> Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&Value, &Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, schema: &Value, payload: &Value) -> Result<(), String> {
        self(schema, payload)
    }
}
