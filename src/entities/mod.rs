// Entity Models
//
// Unified records (contacts, addresses) are rows in shared tables scoped by
// (entity_type, entity_id). Parties (clients, suppliers) own them.

pub mod address;
pub mod contact;
pub mod party;
pub mod scope;

use crate::db::Table;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use address::{AddressInput, AddressPatch, AddressType, UnifiedAddress, DEFAULT_COUNTRY};
pub use contact::{ContactInput, ContactPatch, ContactType, UnifiedContact};
pub use party::{
    Client, ClientInput, ClientPatch, HasIdentifiers, Party, PartyStatus, Supplier,
    SupplierInput, SupplierPatch,
};
pub use scope::{EntityType, ScopeKey};

/// A row type stored in one backend table
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;
    /// Human label used in notifications ("Contact created")
    const LABEL: &'static str;

    fn id(&self) -> &str;
}

/// A record that belongs to a parent through a scope key
pub trait ScopedRecord: Record {
    fn scope(&self) -> ScopeKey;
    fn is_primary(&self) -> bool;
}
