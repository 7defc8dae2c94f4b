//! # Input Validation
//!
//! Field rules shared by the node configuration and the chat message
//! payloads, plus flattening of [`ValidationErrors`] into readable
//! messages.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use switchyard_node::validation::validate_chat_id;
//!
//! if let Err(e) = validate_chat_id("general") {
//!     println!("Invalid chat id: {}", e);
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Absolute HTTP path: `/` or `/`-separated URL-safe segments.
pub static HTTP_PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/[A-Za-z0-9._~-]+)+$|^/$").expect("Invalid regex"));

/// Chat identifiers are used as path segments.
pub static CHAT_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("Invalid regex"));

/// Access tokens: `<user>:<secret>` with a URL-safe user part.
pub static TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]{1,32}):([A-Za-z0-9]{4,64})$").expect("Invalid regex"));

pub const MAX_CHAT_ID_LENGTH: usize = 64;
pub const MAX_TEXT_LENGTH: u64 = 4096;

/// Field-level validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted field path.
    pub field: String,
    /// Error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Flatten validation errors, nested structs included, into field errors
/// sorted by field path.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect(errors, "", &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
    out
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                out.extend(errs.iter().map(|e| FieldError {
                    field: path.clone(),
                    code: e.code.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation failed for field '{}'", path)),
                }));
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

/// One line per failing field: `field: message`, joined with `; `.
pub fn describe_errors(errors: &ValidationErrors) -> String {
    field_errors(errors)
        .into_iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate an absolute HTTP path.
pub fn validate_http_path(path: &str) -> Result<(), ValidationError> {
    if !HTTP_PATH_REGEX.is_match(path) {
        let mut err = ValidationError::new("http_path");
        err.message = Some("must be an absolute path of URL-safe segments".into());
        return Err(err);
    }
    Ok(())
}

/// Validate a log level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_level");
            err.message = Some("must be one of trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

/// Validate a chat identifier.
pub fn validate_chat_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_CHAT_ID_LENGTH {
        let mut err = ValidationError::new("length");
        err.message =
            Some(format!("must be between 1 and {} characters", MAX_CHAT_ID_LENGTH).into());
        return Err(err);
    }
    if !CHAT_ID_REGEX.is_match(id) {
        let mut err = ValidationError::new("pattern");
        err.message = Some(
            "must start with a letter or number and contain only letters, numbers, dots, hyphens, and underscores"
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Split an access token into its user part, or reject it.
pub fn parse_token(token: &str) -> Result<&str, ValidationError> {
    match TOKEN_REGEX.captures(token).and_then(|c| c.get(1)) {
        Some(user) => Ok(user.as_str()),
        None => {
            let mut err = ValidationError::new("token");
            err.message = Some("Wrong token!".into());
            Err(err)
        }
    }
}
