// 🏢 Parties - clients and suppliers
//
// Parents of unified contacts/addresses. Both may carry an ABN and ACN,
// which are checksummed before write and stored in display form.

use super::scope::EntityType;
use super::Record;
use crate::db::Table;
use crate::identifiers::BusinessIdentifiers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    #[default]
    Active,
    Inactive,
}

/// Common surface of anything that carries an ABN/ACN pair
pub trait HasIdentifiers {
    fn identifiers(&self) -> BusinessIdentifiers;
}

/// Party tables that own unified records
pub trait Party: Record {
    const ENTITY_TYPE: EntityType;
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub abn: Option<String>,
    #[serde(default)]
    pub acn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: PartyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Client {
    const TABLE: Table = Table::Clients;
    const LABEL: &'static str = "Client";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Party for Client {
    const ENTITY_TYPE: EntityType = EntityType::Client;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: PartyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PartyStatus>,
}

// ============================================================================
// SUPPLIER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub abn: Option<String>,
    #[serde(default)]
    pub acn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Free text, e.g. "Window cleaning, pressure washing"
    #[serde(default)]
    pub services: Option<String>,
    #[serde(default)]
    pub status: PartyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Supplier {
    const TABLE: Table = Table::Suppliers;
    const LABEL: &'static str = "Supplier";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Party for Supplier {
    const ENTITY_TYPE: EntityType = EntityType::Supplier;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplierInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
    #[serde(default)]
    pub status: PartyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplierPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PartyStatus>,
}

macro_rules! impl_has_identifiers {
    ($($ty:ty),*) => {
        $(
            impl HasIdentifiers for $ty {
                fn identifiers(&self) -> BusinessIdentifiers {
                    BusinessIdentifiers {
                        abn: self.abn.clone(),
                        acn: self.acn.clone(),
                    }
                }
            }
        )*
    };
}

impl_has_identifiers!(Client, ClientInput, ClientPatch, Supplier, SupplierInput, SupplierPatch);
