// 📐 Shape Layer - payload validation
// Checks create/update payloads before they reach the backend. Failures are
// field-level data so forms can attach them to the offending input.

use crate::entities::{
    AddressInput, AddressPatch, ClientInput, ClientPatch, ContactInput, ContactPatch,
    HasIdentifiers, SupplierInput, SupplierPatch, DEFAULT_COUNTRY,
};
use crate::error::ServiceError;
use crate::identifiers::{validate_abn, validate_acn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    #[serde(default)]
    pub context: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>, context: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: context.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// `[{field, message}]` for the `details` member of an error response
pub fn to_details(errors: &[ValidationError]) -> Value {
    Value::Array(
        errors
            .iter()
            .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
            .collect(),
    )
}

/// Recover field-level errors from a backend `validation` failure
pub fn from_backend(err: &ServiceError, context: &str) -> Vec<ValidationError> {
    let parsed: Vec<ValidationError> = err
        .details
        .as_ref()
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let field = item.get("field")?.as_str()?;
                    let message = item.get("message")?.as_str()?;
                    Some(ValidationError::new(field, message, context))
                })
                .collect()
        })
        .unwrap_or_default();

    if parsed.is_empty() {
        vec![ValidationError::new("record", err.message.clone(), context)]
    } else {
        parsed
    }
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator {
    /// Australian states and territories
    known_states: Vec<&'static str>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator {
            known_states: vec!["NSW", "VIC", "QLD", "WA", "SA", "TAS", "ACT", "NT"],
        }
    }

    /// Run any payload's checks
    pub fn validate<P: Payload + ?Sized>(&self, payload: &P) -> ValidationResult {
        payload.check(self)
    }

    fn require(&self, errors: &mut Vec<ValidationError>, field: &str, value: Option<&str>, context: &str) {
        if value.map(str::trim).unwrap_or_default().is_empty() {
            errors.push(ValidationError::new(field, "Required field is empty", context));
        }
    }

    fn check_email(&self, errors: &mut Vec<ValidationError>, email: Option<&str>, context: &str) {
        let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
            return;
        };

        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.contains(char::is_whitespace)
            }
            None => false,
        };

        if !valid {
            errors.push(ValidationError::new("email", "Invalid email address", context));
        }
    }

    fn check_phone(&self, errors: &mut Vec<ValidationError>, field: &str, phone: Option<&str>, context: &str) {
        let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) else {
            return;
        };

        let allowed = phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '(' | ')' | '-'));
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();

        if !allowed || !(8..=15).contains(&digits) {
            errors.push(ValidationError::new(
                field,
                "Phone numbers must contain 8 to 15 digits",
                context,
            ));
        }
    }

    fn check_state(&self, errors: &mut Vec<ValidationError>, state: Option<&str>, country: &str, context: &str) {
        let Some(state) = state else { return };
        if country != DEFAULT_COUNTRY || state.trim().is_empty() {
            return;
        }
        let upper = state.trim().to_uppercase();
        if !self.known_states.iter().any(|known| *known == upper) {
            errors.push(ValidationError::new(
                "state",
                format!("Unknown state: {}", state),
                context,
            ));
        }
    }

    fn check_postcode(&self, errors: &mut Vec<ValidationError>, postcode: Option<&str>, country: &str, context: &str) {
        let Some(postcode) = postcode else { return };
        if country != DEFAULT_COUNTRY || postcode.trim().is_empty() {
            return;
        }
        let postcode = postcode.trim();
        if postcode.len() != 4 || !postcode.bytes().all(|b| b.is_ascii_digit()) {
            errors.push(ValidationError::new(
                "postcode",
                "Postcode must be 4 digits",
                context,
            ));
        }
    }

    /// ABN / ACN checksums; absent identifiers pass
    pub fn check_identifiers<T: HasIdentifiers>(&self, errors: &mut Vec<ValidationError>, record: &T, context: &str) {
        let ids = record.identifiers();

        if let Some(error) = validate_abn(ids.abn.as_deref()).error {
            errors.push(ValidationError::new("abn", error, context));
        }
        if let Some(error) = validate_acn(ids.acn.as_deref()).error {
            errors.push(ValidationError::new("acn", error, context));
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// A create/update body the gateway knows how to check
pub trait Payload: Serialize {
    fn check(&self, validator: &SchemaValidator) -> ValidationResult;
}

/// A partial update. Its own check only covers the members it carries;
/// the stored record merged with the patch must then pass `Full`'s check.
pub trait Patch: Payload {
    type Full: Payload + DeserializeOwned;
}

impl Patch for ContactPatch {
    type Full = ContactInput;
}

impl Patch for AddressPatch {
    type Full = AddressInput;
}

impl Payload for ContactInput {
    fn check(&self, v: &SchemaValidator) -> ValidationResult {
        let mut errors = Vec::new();
        let context = "Contact";

        if self.name.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            v.require(&mut errors, "name", self.first_name.as_deref(), context);
        }
        v.check_email(&mut errors, self.email.as_deref(), context);
        v.check_phone(&mut errors, "phone", self.phone.as_deref(), context);
        v.check_phone(&mut errors, "mobile", self.mobile.as_deref(), context);

        finish(errors)
    }
}

impl Payload for ContactPatch {
    fn check(&self, v: &SchemaValidator) -> ValidationResult {
        let mut errors = Vec::new();
        let context = "Contact";

        if self.name.is_some() && self.first_name.is_none() {
            v.require(&mut errors, "name", self.name.as_deref(), context);
        }
        v.check_email(&mut errors, self.email.as_deref(), context);
        v.check_phone(&mut errors, "phone", self.phone.as_deref(), context);
        v.check_phone(&mut errors, "mobile", self.mobile.as_deref(), context);

        finish(errors)
    }
}

impl Payload for AddressInput {
    fn check(&self, v: &SchemaValidator) -> ValidationResult {
        let mut errors = Vec::new();
        let context = "Address";

        v.require(&mut errors, "address_line_1", Some(self.address_line_1.as_str()), context);
        v.require(&mut errors, "suburb", Some(self.suburb.as_str()), context);
        v.require(&mut errors, "state", Some(self.state.as_str()), context);
        v.require(&mut errors, "postcode", Some(self.postcode.as_str()), context);
        v.check_state(&mut errors, Some(self.state.as_str()), &self.country, context);
        v.check_postcode(&mut errors, Some(self.postcode.as_str()), &self.country, context);

        finish(errors)
    }
}

impl Payload for AddressPatch {
    fn check(&self, v: &SchemaValidator) -> ValidationResult {
        let mut errors = Vec::new();
        let context = "Address";

        for (field, value) in [
            ("address_line_1", &self.address_line_1),
            ("suburb", &self.suburb),
            ("state", &self.state),
            ("postcode", &self.postcode),
        ] {
            if value.is_some() {
                v.require(&mut errors, field, value.as_deref(), context);
            }
        }
        // without a country the stored one applies, checked on the merged record
        if let Some(country) = self.country.as_deref() {
            v.check_state(&mut errors, self.state.as_deref(), country, context);
            v.check_postcode(&mut errors, self.postcode.as_deref(), country, context);
        }

        finish(errors)
    }
}

macro_rules! impl_party_payload {
    ($context:literal, create: $input:ty, patch: $patch:ty) => {
        impl Payload for $input {
            fn check(&self, v: &SchemaValidator) -> ValidationResult {
                let mut errors = Vec::new();
                v.require(&mut errors, "name", Some(self.name.as_str()), $context);
                v.check_email(&mut errors, self.email.as_deref(), $context);
                v.check_phone(&mut errors, "phone", self.phone.as_deref(), $context);
                v.check_identifiers(&mut errors, self, $context);
                finish(errors)
            }
        }

        impl Payload for $patch {
            fn check(&self, v: &SchemaValidator) -> ValidationResult {
                let mut errors = Vec::new();
                if self.name.is_some() {
                    v.require(&mut errors, "name", self.name.as_deref(), $context);
                }
                v.check_email(&mut errors, self.email.as_deref(), $context);
                v.check_phone(&mut errors, "phone", self.phone.as_deref(), $context);
                v.check_identifiers(&mut errors, self, $context);
                finish(errors)
            }
        }

        impl Patch for $patch {
            type Full = $input;
        }
    };
}

impl_party_payload!("Client", create: ClientInput, patch: ClientPatch);
impl_party_payload!("Supplier", create: SupplierInput, patch: SupplierPatch);

// ============================================================================
// TESTS
// ============================================================================
