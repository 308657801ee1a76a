//! Field validation for caller-supplied profile state

use crate::address::validate_encoded_addresses;
use crate::error::ValidationError;
use crate::model::ProfileFields;
use chrono::NaiveDate;

/// Validation context selecting which optional checks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileValidationContext {
    /// Whether to check the `local@domain.tld` email shape
    pub validate_email_format: bool,
    /// Whether every address must carry a six-digit pincode
    pub require_address_pincodes: bool,
}

impl Default for ProfileValidationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileValidationContext {
    /// Create a new validation context with the email check enabled
    pub fn new() -> Self {
        Self {
            validate_email_format: true,
            require_address_pincodes: false,
        }
    }

    /// Only the blank-field and date checks
    pub fn minimal() -> Self {
        Self {
            validate_email_format: false,
            require_address_pincodes: false,
        }
    }

    /// Enable or disable the address pincode requirement
    pub fn with_address_pincodes(mut self, enabled: bool) -> Self {
        self.require_address_pincodes = enabled;
        self
    }

    /// Validate desired profile fields as of `today`
    pub fn validate_fields(
        &self,
        fields: &ProfileFields,
        today: NaiveDate,
    ) -> Result<(), ValidationError> {
        require_non_blank("name", &fields.name)?;
        require_non_blank("email", &fields.email)?;
        require_non_blank("sex", &fields.sex)?;

        if self.validate_email_format {
            validate_email(&fields.email)?;
        }

        if fields.date_of_birth > today {
            return Err(ValidationError::FutureDateOfBirth(fields.date_of_birth));
        }

        if self.require_address_pincodes {
            validate_encoded_addresses(&fields.addresses)?;
        }

        Ok(())
    }
}

/// A plaintext secret must not be blank
///
/// The secret itself never appears in the error.
pub fn validate_secret(secret: &str) -> Result<(), ValidationError> {
    require_non_blank("secret", secret)
}

fn require_non_blank(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::blank(field));
    }
    Ok(())
}

/// Check the `local@domain.tld` shape
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEmail(email.to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() || host.starts_with('.') || host.ends_with('.') {
        return Err(invalid());
    }
    Ok(())
}
