// 🧭 Scope - which parent a unified contact/address belongs to
//
// Contacts and addresses live in two shared tables. The pair
// (entity_type, entity_id) picks out the rows owned by one parent and is
// also the read-cache key for that parent.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Client,
    Site,
    Supplier,
    Contract,
    WorkOrder,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Client => "client",
            EntityType::Site => "site",
            EntityType::Supplier => "supplier",
            EntityType::Contract => "contract",
            EntityType::WorkOrder => "work_order",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(EntityType::Client),
            "site" => Ok(EntityType::Site),
            "supplier" => Ok(EntityType::Supplier),
            "contract" => Ok(EntityType::Contract),
            "work_order" | "workorder" => Ok(EntityType::WorkOrder),
            other => Err(ServiceError::validation(format!(
                "Unknown entity type: {}",
                other
            ))),
        }
    }
}

/// (entity_type, entity_id) - the parent a unified record hangs off
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl ScopeKey {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        ScopeKey {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("client".parse::<EntityType>().unwrap(), EntityType::Client);
        assert_eq!(" Site ".parse::<EntityType>().unwrap(), EntityType::Site);
        assert_eq!(
            "work_order".parse::<EntityType>().unwrap(),
            EntityType::WorkOrder
        );

        let err = "invoice".parse::<EntityType>().unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::Validation);
    }

    #[test]
    fn test_entity_type_wire_name_matches_as_str() {
        for ty in [
            EntityType::Client,
            EntityType::Site,
            EntityType::Supplier,
            EntityType::Contract,
            EntityType::WorkOrder,
        ] {
            assert_eq!(serde_json::to_value(ty).unwrap(), ty.as_str());
            assert_eq!(ty.as_str().parse::<EntityType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_scope_display() {
        let scope = ScopeKey::new(EntityType::Supplier, "s-42");
        assert_eq!(scope.to_string(), "supplier:s-42");
    }
}
