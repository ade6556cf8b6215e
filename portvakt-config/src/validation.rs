//! Custom validation functions for configuration.
//!
//! Shared validation logic used across multiple configuration modules.

use validator::ValidationError;

use crate::capture::parse_port_spec;

/// Validate that an interface name follows Linux naming conventions.
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 15
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface"))
    }
}

/// Validate an ipset/chain name: non-empty, no whitespace, and short enough
/// that the `-shadow` suffix still fits the kernel's 31-character limit.
pub fn validate_set_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 24
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_set_name"))
    }
}

/// Validate that every monitored-port spec parses as `"N"` or `"N-M"`.
pub fn validate_port_specs(specs: &[String]) -> Result<(), ValidationError> {
    for spec in specs {
        if parse_port_spec(spec).is_err() {
            return Err(ValidationError::new("invalid_port_spec"));
        }
    }
    Ok(())
}
