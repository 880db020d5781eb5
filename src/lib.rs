// ERP Core - Library
// Shared by the admin CLI, the API server, and tests

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod identifiers;
pub mod import;
pub mod logging;
pub mod notify;
pub mod schema;

// Re-export commonly used types
pub use cache::{CacheConfig, Lookup, QueryCache, QueryKey};
pub use config::Config;
pub use db::{
    get_events_for_entity, insert_event, setup_database, EdgeFunctions, Event, Filter, Row,
    RowStore, SqliteStore, Table, GET_SCHEMA,
};
pub use entities::{
    AddressInput, AddressPatch, AddressType, Client, ClientInput, ClientPatch, ContactInput,
    ContactPatch, ContactType, EntityType, Party, PartyStatus, Record, ScopeKey, ScopedRecord,
    Supplier, SupplierInput, SupplierPatch, UnifiedAddress, UnifiedContact,
};
pub use error::{ApiResponse, ErrorCategory, ServiceError, ServiceResult};
pub use gateway::{Mutation, UnifiedEntityGateway};
pub use identifiers::{
    format_abn, format_acn, format_business_identifiers, format_identifier_fields,
    identifier_report, validate_abn, validate_acn, BusinessIdentifier, BusinessIdentifiers,
    IdentifierCheck, IdentifierKind, IdentifierReport,
};
pub use import::{import_contacts, load_contacts_csv, ContactRow, ImportSummary};
pub use notify::{ErrorReporter, Notice, NoticeLevel, Notifier, TracingNotifier, TracingReporter};
pub use schema::{Patch, Payload, SchemaValidator, ValidationError, ValidationResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
