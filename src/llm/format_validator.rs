use jsonschema::Validator;
use serde_json::Value;

use crate::errors::{Error, Result};

/// Creates a JSON Schema validator from a schema value
///
/// # Arguments
/// * `schema` - The JSON Schema document
///
/// # Returns
/// * `Result<Validator>` - The compiled validator on success, or a configuration error
pub fn build_validator(schema: &Value) -> Result<Validator> {
    jsonschema::validator_for(schema)
        .map_err(|e| Error::config(format!("invalid JSON schema: {}", e)))
}

/// Validates a payload against a schema validator
///
/// # Arguments
/// * `validator` - The compiled JSON Schema validator
/// * `payload` - The value to validate
///
/// # Returns
/// * `Result<(), Vec<String>>` - Ok when valid, otherwise every violation message
pub fn validate_payload(validator: &Validator, payload: &Value) -> std::result::Result<(), Vec<String>> {
    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
