// 👤 Unified Contact - a person attached to any parent entity
//
// One shared table (unified_contacts) holds the contacts of clients, sites,
// suppliers, ... The parent is identified by (entity_type, entity_id).

use super::scope::{EntityType, ScopeKey};
use super::{Record, ScopedRecord};
use crate::db::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONTACT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactType {
    /// Receives invoices and statements
    Billing,

    /// Day-to-day site operations
    Operations,

    /// After-hours / incident contact
    Emergency,

    /// Main point of contact
    Primary,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Billing => "Billing",
            ContactType::Operations => "Operations",
            ContactType::Emergency => "Emergency",
            ContactType::Primary => "Primary",
        }
    }
}

// ============================================================================
// CONTACT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedContact {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,

    // ========================================================================
    // VALUES
    // ========================================================================
    /// Full name; older rows carry first/last name instead
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub position: Option<String>,

    #[serde(default)]
    pub contact_type: Option<ContactType>,

    #[serde(default)]
    pub is_primary: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnifiedContact {
    /// `name` if set, otherwise "first last"
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Record for UnifiedContact {
    const TABLE: Table = Table::UnifiedContacts;
    const LABEL: &'static str = "Contact";

    fn id(&self) -> &str {
        &self.id
    }
}

impl ScopedRecord for UnifiedContact {
    fn scope(&self) -> ScopeKey {
        ScopeKey::new(self.entity_type, self.entity_id.clone())
    }

    fn is_primary(&self) -> bool {
        self.is_primary
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Body of a "create contact" call; the scope is supplied separately
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<ContactType>,
    #[serde(default)]
    pub is_primary: bool,
}

impl ContactInput {
    pub fn named(name: impl Into<String>) -> Self {
        ContactInput {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Partial update; absent members are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<ContactType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> serde_json::Value {
        json!({
            "id": "c-1",
            "entity_type": "client",
            "entity_id": "cl-9",
            "first_name": "Ada",
            "last_name": "Nguyen",
            "email": "ada@example.com.au",
            "contact_type": "Billing",
            "is_primary": true,
            "created_at": "2026-03-01T00:00:00Z",
            "updated_at": "2026-03-01T00:00:00Z"
        })
    }

    #[test]
    fn test_contact_from_row() {
        let contact: UnifiedContact = serde_json::from_value(row()).unwrap();

        assert_eq!(contact.entity_type, EntityType::Client);
        assert_eq!(contact.contact_type, Some(ContactType::Billing));
        assert_eq!(contact.display_name(), "Ada Nguyen");
        assert_eq!(contact.scope(), ScopeKey::new(EntityType::Client, "cl-9"));
        assert!(contact.is_primary());
        assert_eq!(contact.phone, None);
    }

    #[test]
    fn test_display_name_prefers_full_name() {
        let mut value = row();
        value["name"] = json!("Ada N.");
        let contact: UnifiedContact = serde_json::from_value(value).unwrap();
        assert_eq!(contact.display_name(), "Ada N.");
    }

    #[test]
    fn test_patch_serializes_only_present_members() {
        let patch = ContactPatch {
            phone: Some("0400 000 000".to_string()),
            is_primary: Some(false),
            ..Default::default()
        };
        let wire = serde_json::to_value(&patch).unwrap();
        assert_eq!(wire, json!({"phone": "0400 000 000", "is_primary": false}));
    }
}
