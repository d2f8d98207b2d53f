//! Validation helpers for DTOs.

use serde_json::Value;
use validator::ValidationError;

/// Longest accepted editing context identifier.
pub const MAX_CONTEXT_ID_LENGTH: usize = 64;

/// Validates that a snapshot is a JSON object.
///
/// # Examples
///
/// ```ignore
/// validate_fields_object(&json!({"notes": ""})) // Ok
/// validate_fields_object(&json!([1, 2]))        // Err - not an object
/// ```
pub fn validate_fields_object(value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        return Ok(());
    }

    let mut err = ValidationError::new("fields_object");
    err.message = Some("Fields must be a JSON object".into());
    Err(err)
}

/// Validates an editing context identifier: non-blank, at most
/// [`MAX_CONTEXT_ID_LENGTH`] characters of `[A-Za-z0-9_-]`.
pub fn validate_context_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_CONTEXT_ID_LENGTH {
        let mut err = ValidationError::new("context_id_length");
        err.message = Some(
            format!(
                "Context ID must be between 1 and {MAX_CONTEXT_ID_LENGTH} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("context_id_format");
        err.message =
            Some("Context ID must contain only letters, digits, '-' and '_'".into());
        return Err(err);
    }

    Ok(())
}
