//! Single-string address encoding with an embedded pincode
//!
//! Addresses are stored as `ADDRESS<|PIN|>PINCODE`. Older records carry the
//! pincode as trailing digits in the address body; [`decode_address`] still
//! understands those.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Separator between the address body and its pincode
pub const PIN_DELIMITER: &str = "<|PIN|>";

const PIN_LEN: usize = 6;

/// Address body with its pincode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressItem {
    /// Free-text address body
    pub address: String,
    /// Six-digit postal code
    pub pincode: String,
}

impl AddressItem {
    /// Create an address item
    pub fn new(address: impl Into<String>, pincode: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            pincode: pincode.into(),
        }
    }
}

/// Encode into the stored form; an empty body encodes to an empty string
pub fn encode_address(item: &AddressItem) -> String {
    let body = strip_trailing_pin(&item.address);
    if body.is_empty() {
        return String::new();
    }
    format!("{}{}{}", body, PIN_DELIMITER, item.pincode.trim())
}

/// Split a stored address back into body and pincode
pub fn decode_address(encoded: &str) -> AddressItem {
    if encoded.is_empty() {
        return AddressItem::default();
    }

    if let Some((body, pin)) = encoded.rsplit_once(PIN_DELIMITER) {
        return AddressItem {
            address: trim_separators(body.trim()).to_string(),
            pincode: pin.trim().to_string(),
        };
    }

    match last_pin(encoded) {
        Some(pin) => AddressItem {
            address: strip_trailing_pin(encoded).to_string(),
            pincode: pin.to_string(),
        },
        None => AddressItem {
            address: encoded.trim().to_string(),
            pincode: String::new(),
        },
    }
}

/// A non-empty address body requires a six-digit pincode
pub fn validate_address(item: &AddressItem) -> bool {
    item.address.trim().is_empty() || is_pincode(item.pincode.trim())
}

/// Validate every encoded address in a list
pub fn validate_encoded_addresses(addresses: &[String]) -> Result<(), ValidationError> {
    for (index, encoded) in addresses.iter().enumerate() {
        if !validate_address(&decode_address(encoded)) {
            return Err(ValidationError::invalid_address(
                index,
                "address requires a six-digit pincode",
            ));
        }
    }
    Ok(())
}

fn is_pincode(s: &str) -> bool {
    s.len() == PIN_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

fn trim_separators(s: &str) -> &str {
    s.trim_end_matches(|c: char| c == ',' || c.is_whitespace())
}

/// Remove a six-digit pin (and the separators before it) from the end
fn strip_trailing_pin(s: &str) -> &str {
    let trimmed = s.trim_end();
    let digits = trimmed
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits < PIN_LEN {
        return s.trim();
    }

    let cut = trimmed.len().saturating_sub(PIN_LEN);
    let body = trimmed.get(..cut).unwrap_or_default();
    body.trim_end_matches(|c: char| c == ',' || c == '-' || c.is_whitespace())
        .trim()
}

/// The last run of six digits with no digit after it
fn last_pin(s: &str) -> Option<&str> {
    let last = s.bytes().rposition(|b| b.is_ascii_digit())?;
    let end = last.checked_add(1)?;
    let start = end.checked_sub(PIN_LEN)?;
    let candidate = s.get(start..end)?;
    is_pincode(candidate).then_some(candidate)
}
