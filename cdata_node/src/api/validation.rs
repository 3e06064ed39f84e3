//! Request validation utilities

use crate::api::errors::ValidationError;
use ethers::types::Address;
use ethers::utils::to_checksum;
use serde_json::Value;

fn invalid(field: &str, message: impl Into<String>, value: Option<Value>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
        value,
    }
}

/// Validate an EVM address.
///
/// All-lowercase and all-uppercase hex are accepted as-is; mixed case must
/// match the EIP-55 checksum.
pub fn validate_address(field: &str, address: &str) -> Result<Address, ValidationError> {
    let address = address.trim();
    let value = Some(Value::String(address.to_string()));

    if address.is_empty() {
        return Err(invalid(field, format!("{} cannot be empty", field), value));
    }

    let hex = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| invalid(field, format!("Invalid {} address", field), value.clone()))?;

    if hex.len() != 40 || !is_valid_hex(hex) {
        return Err(invalid(field, format!("Invalid {} address", field), value));
    }

    let parsed: Address = address
        .to_lowercase()
        .parse()
        .map_err(|_| invalid(field, format!("Invalid {} address", field), value.clone()))?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&parsed, None)[2..] != *hex {
        return Err(invalid(
            field,
            format!("Invalid {} address checksum", field),
            value,
        ));
    }

    Ok(parsed)
}

/// Require a present, non-blank string field
pub fn require_field<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(invalid(field, format!("Bad Request: {} is required.", field), None)),
    }
}

/// Coordinates are exactly two strings
pub fn validate_coordinates(value: &Value) -> Result<[String; 2], ValidationError> {
    let err = || {
        invalid(
            "coordinates",
            "Coordinates must be an array of two strings.",
            Some(value.clone()),
        )
    };
    match value.as_array().map(Vec::as_slice) {
        Some([Value::String(lat), Value::String(lon)]) => Ok([lat.clone(), lon.clone()]),
        _ => Err(err()),
    }
}

/// Check if string is valid hex
fn is_valid_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}
