// 🔢 Business Identifiers - ABN / ACN validation and display formatting
//
// ABN: 11 digits, weighted sum (first digit minus one) divisible by 89
// ACN: 9 digits, modulus-10 check digit in the last position
//
// Validation never fails loudly: a missing value is valid (the identifiers are
// optional on every record), a malformed one is reported as data.
// Formatting is lenient: anything that is not the right length passes through.

use serde::{Deserialize, Serialize};

const ABN_WEIGHTS: [u32; 11] = [10, 1, 3, 5, 7, 9, 11, 13, 15, 17, 19];
const ACN_WEIGHTS: [u32; 8] = [8, 7, 6, 5, 4, 3, 2, 1];

// ============================================================================
// IDENTIFIER KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Australian Business Number
    Abn,
    /// Australian Company Number
    Acn,
}

impl IdentifierKind {
    /// Number of digits once whitespace is removed
    pub fn digits(&self) -> usize {
        match self {
            IdentifierKind::Abn => 11,
            IdentifierKind::Acn => 9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::Abn => "ABN",
            IdentifierKind::Acn => "ACN",
        }
    }

    /// Display grouping, e.g. 2-3-3-3 for an ABN
    fn groups(&self) -> &'static [usize] {
        match self {
            IdentifierKind::Abn => &[2, 3, 3, 3],
            IdentifierKind::Acn => &[2, 3, 3, 1],
        }
    }

    pub fn validate(&self, input: Option<&str>) -> IdentifierCheck {
        let raw = match input {
            None => return IdentifierCheck::ok(),
            Some(raw) if raw.is_empty() => return IdentifierCheck::ok(),
            Some(raw) => raw,
        };

        let cleaned = strip_whitespace(raw);
        let digits = match parse_digits(&cleaned, self.digits()) {
            Some(digits) => digits,
            None => {
                return IdentifierCheck::invalid(format!(
                    "Invalid {} format. {} must be {} digits",
                    self.label(),
                    self.label(),
                    self.digits()
                ))
            }
        };

        let passes = match self {
            IdentifierKind::Abn => abn_checksum_passes(&digits),
            IdentifierKind::Acn => acn_checksum_passes(&digits),
        };

        if passes {
            IdentifierCheck::ok()
        } else {
            IdentifierCheck::invalid(format!(
                "Invalid {}. Checksum validation failed",
                self.label()
            ))
        }
    }

    pub fn format(&self, input: &str) -> String {
        let cleaned = strip_whitespace(input);
        let chars: Vec<char> = cleaned.chars().collect();
        if chars.len() != self.digits() {
            return input.to_string();
        }

        let mut parts = Vec::with_capacity(self.groups().len());
        let mut offset = 0;
        for size in self.groups() {
            parts.push(chars[offset..offset + size].iter().collect::<String>());
            offset += size;
        }
        parts.join(" ")
    }
}

// ============================================================================
// CHECK RESULT
// ============================================================================

/// Outcome of validating one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierCheck {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IdentifierCheck {
    pub fn ok() -> Self {
        IdentifierCheck {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        IdentifierCheck {
            valid: false,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

pub fn validate_abn(input: Option<&str>) -> IdentifierCheck {
    IdentifierKind::Abn.validate(input)
}

pub fn validate_acn(input: Option<&str>) -> IdentifierCheck {
    IdentifierKind::Acn.validate(input)
}

fn strip_whitespace(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_digits(cleaned: &str, expected: usize) -> Option<Vec<u32>> {
    if cleaned.len() != expected || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.chars().map(|c| c.to_digit(10)).collect()
}

fn abn_checksum_passes(digits: &[u32]) -> bool {
    // Signed: a leading zero makes the first term negative.
    let sum: i64 = digits
        .iter()
        .zip(ABN_WEIGHTS)
        .enumerate()
        .map(|(i, (&digit, weight))| {
            let digit = if i == 0 { digit as i64 - 1 } else { digit as i64 };
            digit * weight as i64
        })
        .sum();

    sum % 89 == 0
}

fn acn_checksum_passes(digits: &[u32]) -> bool {
    let sum: u32 = digits[..8]
        .iter()
        .zip(ACN_WEIGHTS)
        .map(|(digit, weight)| digit * weight)
        .sum();

    let check_digit = (10 - sum % 10) % 10;
    check_digit == digits[8]
}

// ============================================================================
// FORMATTING
// ============================================================================

/// `51824753556` -> `51 824 753 556`; malformed input is returned unchanged
pub fn format_abn(input: &str) -> String {
    IdentifierKind::Abn.format(input)
}

/// `004085616` -> `00 408 561 6`; malformed input is returned unchanged
pub fn format_acn(input: &str) -> String {
    IdentifierKind::Acn.format(input)
}

/// The ABN/ACN pair carried by parties (clients, suppliers)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessIdentifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acn: Option<String>,
}

pub fn format_business_identifiers(ids: BusinessIdentifiers) -> BusinessIdentifiers {
    BusinessIdentifiers {
        abn: ids.abn.map(|abn| format_abn(&abn)),
        acn: ids.acn.map(|acn| format_acn(&acn)),
    }
}

/// Format the `abn` / `acn` members of a JSON payload in place.
/// Every other member is left exactly as it was.
pub fn format_identifier_fields(payload: &mut serde_json::Map<String, serde_json::Value>) {
    for (key, kind) in [("abn", IdentifierKind::Abn), ("acn", IdentifierKind::Acn)] {
        if let Some(serde_json::Value::String(value)) = payload.get_mut(key) {
            *value = kind.format(value);
        }
    }
}

// ============================================================================
// BUSINESS IDENTIFIER
// ============================================================================

/// A validated identifier, reduced to its bare digits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessIdentifier {
    pub kind: IdentifierKind,
    pub raw_digits: String,
}

impl BusinessIdentifier {
    /// Parse and checksum a non-empty identifier
    pub fn parse(kind: IdentifierKind, input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Err(format!("{} is empty", kind.label()));
        }

        let check = kind.validate(Some(input));
        match check.error {
            None => Ok(BusinessIdentifier {
                kind,
                raw_digits: strip_whitespace(input),
            }),
            Some(error) => Err(error),
        }
    }

    pub fn formatted(&self) -> String {
        self.kind.format(&self.raw_digits)
    }
}

impl std::fmt::Display for BusinessIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.formatted())
    }
}

/// Validation + display form for an ABN/ACN pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierReport {
    pub abn: IdentifierCheck,
    pub acn: IdentifierCheck,
    pub formatted: BusinessIdentifiers,
}

pub fn identifier_report(ids: &BusinessIdentifiers) -> IdentifierReport {
    IdentifierReport {
        abn: validate_abn(ids.abn.as_deref()),
        acn: validate_acn(ids.acn.as_deref()),
        formatted: format_business_identifiers(ids.clone()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
