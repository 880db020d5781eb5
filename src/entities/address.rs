// 🏠 Unified Address - billing / postal / physical addresses of any parent

use super::scope::{EntityType, ScopeKey};
use super::{Record, ScopedRecord};
use crate::db::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COUNTRY: &str = "Australia";

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Billing,
    Postal,
    Physical,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Billing => "billing",
            AddressType::Postal => "postal",
            AddressType::Physical => "physical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAddress {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,

    /// Optional label, e.g. "Head office"
    #[serde(default)]
    pub name: Option<String>,

    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: Option<String>,
    pub suburb: String,
    pub state: String,
    pub postcode: String,
    #[serde(default = "default_country")]
    pub country: String,

    pub address_type: AddressType,
    #[serde(default)]
    pub is_primary: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnifiedAddress {
    /// Single-line form for tables and exports
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.address_line_1.clone()];
        if let Some(line_2) = self.address_line_2.as_deref().filter(|l| !l.is_empty()) {
            parts.push(line_2.to_string());
        }
        parts.push(format!("{} {} {}", self.suburb, self.state, self.postcode));
        parts.join(", ")
    }
}

impl Record for UnifiedAddress {
    const TABLE: Table = Table::UnifiedAddresses;
    const LABEL: &'static str = "Address";

    fn id(&self) -> &str {
        &self.id
    }
}

impl ScopedRecord for UnifiedAddress {
    fn scope(&self) -> ScopeKey {
        ScopeKey::new(self.entity_type, self.entity_id.clone())
    }

    fn is_primary(&self) -> bool {
        self.is_primary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address_line_1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub suburb: String,
    pub state: String,
    pub postcode: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub address_type: AddressType,
    #[serde(default)]
    pub is_primary: bool,
}

impl AddressInput {
    pub fn new(
        address_line_1: impl Into<String>,
        suburb: impl Into<String>,
        state: impl Into<String>,
        postcode: impl Into<String>,
        address_type: AddressType,
    ) -> Self {
        AddressInput {
            name: None,
            address_line_1: address_line_1.into(),
            address_line_2: None,
            suburb: suburb.into(),
            state: state.into(),
            postcode: postcode.into(),
            country: default_country(),
            address_type,
            is_primary: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_type: Option<AddressType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_country_defaults_to_australia() {
        let address: UnifiedAddress = serde_json::from_value(json!({
            "id": "a-1",
            "entity_type": "site",
            "entity_id": "st-3",
            "address_line_1": "12 Harbour St",
            "suburb": "Pyrmont",
            "state": "NSW",
            "postcode": "2009",
            "address_type": "physical",
            "created_at": "2026-03-01T00:00:00Z",
            "updated_at": "2026-03-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(address.country, "Australia");
        assert!(!address.is_primary);
        assert_eq!(address.one_line(), "12 Harbour St, Pyrmont NSW 2009");
    }

    #[test]
    fn test_input_defaults() {
        let input: AddressInput = serde_json::from_value(json!({
            "address_line_1": "1 Queen St",
            "suburb": "Brisbane City",
            "state": "QLD",
            "postcode": "4000",
            "address_type": "billing"
        }))
        .unwrap();

        assert_eq!(input.country, DEFAULT_COUNTRY);
        assert_eq!(input.address_type, AddressType::Billing);
    }
}
