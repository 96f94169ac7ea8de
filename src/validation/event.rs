//! Required-field checks for asset events

use thiserror::Error;

use crate::types::AssetEvent;

/// Identifier fields that must be non-empty
pub const REQUIRED_FIELDS: &[&str] = &["asset_id", "event_type", "node_id"];

/// Validation failure for an event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// Check that every identifying field is present and non-blank
pub fn validate_event(event: &AssetEvent) -> Result<(), ValidationError> {
    let fields = [
        (REQUIRED_FIELDS[0], event.asset_id.as_str()),
        (REQUIRED_FIELDS[1], event.event_type.as_str()),
        (REQUIRED_FIELDS[2], event.node_id.as_str()),
    ];

    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField(name));
        }
    }
    Ok(())
}
