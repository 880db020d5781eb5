// 🚪 Unified Entity Gateway - the one place that touches the row store
//
// Every read goes through the query cache keyed by (table, entity_type,
// entity_id). Every write that reaches the store invalidates the keys it
// affects, whether it succeeded or not:
//   create          -> the record's scope key
//   update / delete -> the scope key and the unscoped table key
// Keys are built here and nowhere else.
//
// A mutation settles in one of three ways:
//   Ok(Mutation::Applied(..))   success toast, cache invalidated
//   Ok(Mutation::Rejected(..))  field-level validation errors, cache untouched
//   Err(ServiceError)           logged, reported, generic failure toast

use crate::cache::{CacheConfig, Lookup, QueryCache, QueryKey};
use crate::db::{Filter, Row, RowStore, Table};
use crate::entities::{
    AddressInput, AddressPatch, Client, ClientInput, ClientPatch, ContactInput, ContactPatch,
    EntityType, Party, ScopeKey, ScopedRecord, Supplier, SupplierInput, SupplierPatch,
    UnifiedAddress, UnifiedContact,
};
use crate::error::{ErrorCategory, ServiceError, ServiceResult};
use crate::identifiers::format_identifier_fields;
use crate::notify::{ErrorReporter, Notice, Notifier, TracingNotifier, TracingReporter};
use crate::schema::{self, Patch, Payload, SchemaValidator, ValidationError, ValidationResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// MUTATION OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Mutation<T> {
    Applied(T),
    Rejected(Vec<ValidationError>),
}

impl<T> Mutation<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Mutation::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Mutation::Applied(value) => Some(value),
            Mutation::Rejected(_) => None,
        }
    }

    pub fn rejected(&self) -> Option<&[ValidationError]> {
        match self {
            Mutation::Applied(_) => None,
            Mutation::Rejected(errors) => Some(errors),
        }
    }

    pub fn into_result(self) -> Result<T, Vec<ValidationError>> {
        match self {
            Mutation::Applied(value) => Ok(value),
            Mutation::Rejected(errors) => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    fn verb(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }

    fn past(&self) -> &'static str {
        match self {
            MutationKind::Create => "created",
            MutationKind::Update => "updated",
            MutationKind::Delete => "deleted",
        }
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

pub struct UnifiedEntityGateway<S> {
    store: S,
    cache: QueryCache<Vec<Row>>,
    validator: SchemaValidator,
    notifier: Arc<dyn Notifier>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<S: RowStore> UnifiedEntityGateway<S> {
    pub fn new(store: S) -> Self {
        UnifiedEntityGateway {
            store,
            cache: QueryCache::default(),
            validator: SchemaValidator::new(),
            notifier: Arc::new(TracingNotifier),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = QueryCache::new(config);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &QueryCache<Vec<Row>> {
        &self.cache
    }

    // ========================================================================
    // CONTACTS
    // ========================================================================

    pub fn list_contacts(
        &self,
        entity_type: EntityType,
        entity_id: Option<&str>,
    ) -> ServiceResult<Vec<UnifiedContact>> {
        self.list_scoped(entity_type, entity_id)
    }

    pub fn create_contact(
        &self,
        scope: &ScopeKey,
        input: &ContactInput,
    ) -> ServiceResult<Mutation<UnifiedContact>> {
        self.create_scoped(scope, input)
    }

    pub fn update_contact(
        &self,
        id: &str,
        patch: &ContactPatch,
    ) -> ServiceResult<Mutation<UnifiedContact>> {
        self.update_scoped(id, patch)
    }

    pub fn delete_contact(&self, id: &str) -> ServiceResult<Mutation<()>> {
        self.delete_scoped::<UnifiedContact>(id)
    }

    // ========================================================================
    // ADDRESSES
    // ========================================================================

    pub fn list_addresses(
        &self,
        entity_type: EntityType,
        entity_id: Option<&str>,
    ) -> ServiceResult<Vec<UnifiedAddress>> {
        self.list_scoped(entity_type, entity_id)
    }

    pub fn create_address(
        &self,
        scope: &ScopeKey,
        input: &AddressInput,
    ) -> ServiceResult<Mutation<UnifiedAddress>> {
        self.create_scoped(scope, input)
    }

    pub fn update_address(
        &self,
        id: &str,
        patch: &AddressPatch,
    ) -> ServiceResult<Mutation<UnifiedAddress>> {
        self.update_scoped(id, patch)
    }

    pub fn delete_address(&self, id: &str) -> ServiceResult<Mutation<()>> {
        self.delete_scoped::<UnifiedAddress>(id)
    }

    // ========================================================================
    // PARTIES
    // ========================================================================

    pub fn list_clients(&self) -> ServiceResult<Vec<Client>> {
        self.list_parties()
    }

    pub fn create_client(&self, input: &ClientInput) -> ServiceResult<Mutation<Client>> {
        self.create_party(input)
    }

    pub fn update_client(&self, id: &str, patch: &ClientPatch) -> ServiceResult<Mutation<Client>> {
        self.update_party(id, patch)
    }

    pub fn delete_client(&self, id: &str) -> ServiceResult<Mutation<()>> {
        self.delete_party::<Client>(id)
    }

    pub fn list_suppliers(&self) -> ServiceResult<Vec<Supplier>> {
        self.list_parties()
    }

    pub fn create_supplier(&self, input: &SupplierInput) -> ServiceResult<Mutation<Supplier>> {
        self.create_party(input)
    }

    pub fn update_supplier(
        &self,
        id: &str,
        patch: &SupplierPatch,
    ) -> ServiceResult<Mutation<Supplier>> {
        self.update_party(id, patch)
    }

    pub fn delete_supplier(&self, id: &str) -> ServiceResult<Mutation<()>> {
        self.delete_party::<Supplier>(id)
    }

    // ========================================================================
    // GENERIC SCOPED RECORDS
    // ========================================================================

    /// Records of one parent. No parent id yet means nothing to show, not an error.
    pub fn list_scoped<R: ScopedRecord>(
        &self,
        entity_type: EntityType,
        entity_id: Option<&str>,
    ) -> ServiceResult<Vec<R>> {
        let Some(entity_id) = entity_id.filter(|id| !id.trim().is_empty()) else {
            return Ok(Vec::new());
        };

        let scope = ScopeKey::new(entity_type, entity_id);
        let rows = self.read(
            QueryKey::scoped(R::TABLE, &scope),
            R::TABLE,
            &Filter::scope(&scope),
        )?;
        decode_rows(rows)
    }

    pub fn create_scoped<R: ScopedRecord, P: Payload>(
        &self,
        scope: &ScopeKey,
        payload: &P,
    ) -> ServiceResult<Mutation<R>> {
        self.settle(R::LABEL, MutationKind::Create, || {
            if scope.entity_id.trim().is_empty() {
                return Ok(Mutation::Rejected(vec![ValidationError::new(
                    "entity_id",
                    "Required field is empty",
                    R::LABEL,
                )]));
            }
            if let Err(errors) = self.validator.validate(payload) {
                return Ok(Mutation::Rejected(errors));
            }

            let mut values = to_row(payload)?;
            values.insert("entity_type".to_string(), json!(scope.entity_type));
            values.insert("entity_id".to_string(), json!(scope.entity_id));
            let wants_primary = take_primary(&mut values);
            values.insert("is_primary".to_string(), json!(false));

            let keys = [QueryKey::scoped(R::TABLE, scope)];
            let record = self.invalidating(&keys, || {
                let record: R = decode_row(self.store.insert(R::TABLE, values)?)?;
                if wants_primary {
                    self.promote(record)
                } else {
                    Ok(record)
                }
            })?;

            tracing::info!(table = %R::TABLE, id = record.id(), scope = %scope, "record created");
            Ok(Mutation::Applied(record))
        })
    }

    pub fn update_scoped<R: ScopedRecord, P: Patch>(
        &self,
        id: &str,
        patch: &P,
    ) -> ServiceResult<Mutation<R>> {
        self.settle(R::LABEL, MutationKind::Update, || {
            let stored = self.load(R::TABLE, id)?;
            if let Err(errors) = self.check_patch(patch, &stored)? {
                return Ok(Mutation::Rejected(errors));
            }
            let scope = decode_row::<R>(stored)?.scope();

            let mut changes = to_row(patch)?;
            // a record never moves to another parent
            changes.remove("entity_type");
            changes.remove("entity_id");
            let wants_primary = take_primary(&mut changes);

            let keys = [QueryKey::scoped(R::TABLE, &scope), QueryKey::table(R::TABLE)];
            let record = self.invalidating(&keys, || {
                let record: R = decode_row(self.store.update(R::TABLE, id, changes)?)?;
                if wants_primary {
                    self.promote(record)
                } else {
                    Ok(record)
                }
            })?;

            tracing::info!(table = %R::TABLE, id, scope = %scope, "record updated");
            Ok(Mutation::Applied(record))
        })
    }

    /// Deleting something that is already gone still succeeds
    pub fn delete_scoped<R: ScopedRecord>(&self, id: &str) -> ServiceResult<Mutation<()>> {
        self.settle(R::LABEL, MutationKind::Delete, || {
            let existing = self
                .store
                .select(R::TABLE, &Filter::by_id(id))?
                .into_iter()
                .next();

            let removed = self.store.delete(R::TABLE, id)?;

            if let Some(row) = existing {
                let record: R = decode_row(row)?;
                self.cache.invalidate(&QueryKey::scoped(R::TABLE, &record.scope()));
            }
            self.cache.invalidate(&QueryKey::table(R::TABLE));

            if removed {
                tracing::info!(table = %R::TABLE, id, "record deleted");
            } else {
                tracing::debug!(table = %R::TABLE, id, "delete of missing record");
            }
            Ok(Mutation::Applied(()))
        })
    }

    // ========================================================================
    // GENERIC PARTIES
    // ========================================================================

    pub fn list_parties<R: Party>(&self) -> ServiceResult<Vec<R>> {
        let rows = self.read(QueryKey::table(R::TABLE), R::TABLE, &Filter::all())?;
        decode_rows(rows)
    }

    /// ABN/ACN are checksummed by the payload checks, then stored formatted
    pub fn create_party<R: Party, P: Payload>(&self, payload: &P) -> ServiceResult<Mutation<R>> {
        self.settle(R::LABEL, MutationKind::Create, || {
            if let Err(errors) = self.validator.validate(payload) {
                return Ok(Mutation::Rejected(errors));
            }

            let mut values = to_row(payload)?;
            format_identifier_fields(&mut values);

            let record: R = decode_row(self.store.insert(R::TABLE, values)?)?;

            self.cache.invalidate(&QueryKey::table(R::TABLE));
            tracing::info!(table = %R::TABLE, id = record.id(), "record created");
            Ok(Mutation::Applied(record))
        })
    }

    pub fn update_party<R: Party, P: Patch>(
        &self,
        id: &str,
        patch: &P,
    ) -> ServiceResult<Mutation<R>> {
        self.settle(R::LABEL, MutationKind::Update, || {
            let stored = self.load(R::TABLE, id)?;
            if let Err(errors) = self.check_patch(patch, &stored)? {
                return Ok(Mutation::Rejected(errors));
            }

            let mut changes = to_row(patch)?;
            format_identifier_fields(&mut changes);

            let keys = [QueryKey::table(R::TABLE)];
            let record: R = self.invalidating(&keys, || {
                decode_row(self.store.update(R::TABLE, id, changes)?)
            })?;

            tracing::info!(table = %R::TABLE, id, "record updated");
            Ok(Mutation::Applied(record))
        })
    }

    /// Removes the party together with its contacts and addresses
    pub fn delete_party<R: Party>(&self, id: &str) -> ServiceResult<Mutation<()>> {
        self.settle(R::LABEL, MutationKind::Delete, || {
            let scope = ScopeKey::new(R::ENTITY_TYPE, id);
            let owned = [Table::UnifiedContacts, Table::UnifiedAddresses]
                .map(|table| (table, Filter::scope(&scope)));
            let keys = [
                QueryKey::scoped(Table::UnifiedContacts, &scope),
                QueryKey::scoped(Table::UnifiedAddresses, &scope),
                QueryKey::table(R::TABLE),
            ];

            let removed = self.invalidating(&keys, || {
                self.store.delete_with_owned(R::TABLE, id, &owned)
            })?;

            if removed {
                tracing::info!(table = %R::TABLE, id, "record deleted with its contacts and addresses");
            } else {
                tracing::debug!(table = %R::TABLE, id, "delete of missing record");
            }
            Ok(Mutation::Applied(()))
        })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Cached read with one retry on transient failure. When the retry also
    /// fails, a retained (stale) copy is served instead of the error.
    fn read(&self, key: QueryKey, table: Table, filter: &Filter) -> ServiceResult<Vec<Row>> {
        let stale = match self.cache.lookup(&key) {
            Lookup::Fresh(rows) => {
                tracing::debug!(key = %key, "cache hit");
                return Ok(rows);
            }
            Lookup::Stale(rows) => Some(rows),
            Lookup::Miss => None,
        };
        tracing::debug!(key = %key, stale = stale.is_some(), "cache miss");

        let fetched = match self.store.select(table, filter) {
            Err(err) if err.is_transient() => {
                tracing::warn!(key = %key, error = %err, "read failed, retrying once");
                self.store.select(table, filter)
            }
            other => other,
        };

        match fetched {
            Ok(rows) => {
                self.cache.store(key, rows.clone());
                Ok(rows)
            }
            Err(err) => match stale {
                Some(rows) if err.is_transient() => {
                    tracing::warn!(key = %key, error = %err, "serving stale data");
                    Ok(rows)
                }
                _ => {
                    tracing::error!(key = %key, category = %err.category, error = %err.message, "read failed");
                    self.reporter.capture(&err, &format!("read {}", key));
                    self.notifier
                        .notify(Notice::error("Error", "Failed to load data. Please try again."));
                    Err(err)
                }
            },
        }
    }

    /// Runs a write, then drops `keys` whatever the outcome: a write that
    /// failed part way may still have changed rows
    fn invalidating<T>(
        &self,
        keys: &[QueryKey],
        write: impl FnOnce() -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let outcome = write();
        for key in keys {
            self.cache.invalidate(key);
        }
        outcome
    }

    /// Demote the other primaries of the record's scope, then mark this one.
    /// Each step leaves at most one primary, so a failure part way never
    /// leaves two.
    fn promote<R: ScopedRecord>(&self, record: R) -> ServiceResult<R> {
        let scope = record.scope();
        let filter = Filter::scope(&scope).field_eq("is_primary", true);

        let mut demoted = 0;
        for row in self.store.select(R::TABLE, &filter)? {
            match row.get("id").and_then(Value::as_str) {
                Some(other) if other != record.id() => {
                    self.store.update(R::TABLE, other, primary_flag(false))?;
                    demoted += 1;
                }
                _ => {}
            }
        }
        if demoted > 0 {
            tracing::info!(table = %R::TABLE, scope = %scope, demoted, "previous primary demoted");
        }

        decode_row(self.store.update(R::TABLE, record.id(), primary_flag(true))?)
    }

    fn load(&self, table: Table, id: &str) -> ServiceResult<Row> {
        self.store
            .select(table, &Filter::by_id(id))?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found(format!("No row {} in {}", id, table)))
    }

    /// The patch on its own, then the stored record with the patch applied
    fn check_patch<P: Patch>(&self, patch: &P, stored: &Row) -> ServiceResult<ValidationResult> {
        if let Err(errors) = self.validator.validate(patch) {
            return Ok(Err(errors));
        }

        let mut merged = stored.clone();
        merged.extend(to_row(patch)?);
        let full: P::Full = decode_row(merged)?;
        Ok(self.validator.validate(&full))
    }

    fn settle<T>(
        &self,
        label: &str,
        kind: MutationKind,
        op: impl FnOnce() -> ServiceResult<Mutation<T>>,
    ) -> ServiceResult<Mutation<T>> {
        match op() {
            Ok(Mutation::Applied(value)) => {
                self.notifier.notify(Notice::success(
                    "Success",
                    format!("{} {} successfully", label, kind.past()),
                ));
                Ok(Mutation::Applied(value))
            }
            Ok(Mutation::Rejected(errors)) => Ok(self.rejected(label, kind, errors)),
            Err(err) if err.category == ErrorCategory::Validation => {
                let errors = schema::from_backend(&err, label);
                Ok(self.rejected(label, kind, errors))
            }
            Err(err) => {
                let context = format!("{} {}", kind.verb(), label.to_lowercase());
                tracing::error!(category = %err.category, error = %err.message, "failed to {}", context);
                self.reporter.capture(&err, &context);
                self.notifier.notify(Notice::error(
                    "Error",
                    format!("Failed to {}. Please try again.", context),
                ));
                Err(err)
            }
        }
    }

    fn rejected<T>(
        &self,
        label: &str,
        kind: MutationKind,
        errors: Vec<ValidationError>,
    ) -> Mutation<T> {
        tracing::warn!(
            record = label,
            action = kind.verb(),
            fields = ?errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
            "validation failed"
        );
        let summary = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        self.notifier
            .notify(Notice::warning("Validation failed", summary));
        Mutation::Rejected(errors)
    }
}

fn to_row<P: Serialize + ?Sized>(payload: &P) -> ServiceResult<Row> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(ServiceError::validation("Payload must be a JSON object")),
    }
}

fn decode_row<R: DeserializeOwned>(row: Row) -> ServiceResult<R> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn decode_rows<R: DeserializeOwned>(rows: Vec<Row>) -> ServiceResult<Vec<R>> {
    rows.into_iter().map(decode_row).collect()
}

/// Strips a requested `is_primary: true`; the flag is set by `promote` instead
fn take_primary(values: &mut Row) -> bool {
    let wants = values.get("is_primary") == Some(&Value::Bool(true));
    if wants {
        values.remove("is_primary");
    }
    wants
}

fn primary_flag(is_primary: bool) -> Row {
    let mut changes = Row::new();
    changes.insert("is_primary".to_string(), json!(is_primary));
    changes
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::entities::{AddressType, ContactType};
    use crate::notify::{NoticeLevel, RecordingNotifier, RecordingReporter};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// SQLite underneath, with scripted failures on top
    struct FlakyStore {
        inner: SqliteStore,
        select_failures: Mutex<VecDeque<ServiceError>>,
        /// (write number, error)
        write_failures: Mutex<Vec<(usize, ServiceError)>>,
        selects: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            FlakyStore {
                inner: SqliteStore::open_in_memory().unwrap(),
                select_failures: Mutex::new(VecDeque::new()),
                write_failures: Mutex::new(Vec::new()),
                selects: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }
        }

        fn fail_selects(&self, errors: Vec<ServiceError>) {
            self.select_failures.lock().unwrap().extend(errors);
        }

        fn fail_next_write(&self, error: ServiceError) {
            self.fail_write_at(1, error);
        }

        /// `nth` counts writes from now, starting at 1
        fn fail_write_at(&self, nth: usize, error: ServiceError) {
            let at = self.writes.load(Ordering::SeqCst) + nth;
            self.write_failures.lock().unwrap().push((at, error));
        }

        fn select_count(&self) -> usize {
            self.selects.load(Ordering::SeqCst)
        }

        fn next_write_failure(&self) -> ServiceResult<()> {
            let number = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            let mut failures = self.write_failures.lock().unwrap();
            match failures.iter().position(|(at, _)| *at == number) {
                Some(index) => Err(failures.remove(index).1),
                None => Ok(()),
            }
        }
    }

    impl RowStore for FlakyStore {
        fn select(&self, table: Table, filter: &Filter) -> ServiceResult<Vec<Row>> {
            self.selects.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.select_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.inner.select(table, filter)
        }

        fn insert(&self, table: Table, values: Row) -> ServiceResult<Row> {
            self.next_write_failure()?;
            self.inner.insert(table, values)
        }

        fn update(&self, table: Table, id: &str, changes: Row) -> ServiceResult<Row> {
            self.next_write_failure()?;
            self.inner.update(table, id, changes)
        }

        fn delete(&self, table: Table, id: &str) -> ServiceResult<bool> {
            self.next_write_failure()?;
            self.inner.delete(table, id)
        }
    }

    struct Harness {
        gateway: UnifiedEntityGateway<FlakyStore>,
        notifier: Arc<RecordingNotifier>,
        reporter: Arc<RecordingReporter>,
    }

    fn harness() -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Arc::new(RecordingReporter::default());
        let gateway = UnifiedEntityGateway::new(FlakyStore::new())
            .with_notifier(notifier.clone())
            .with_reporter(reporter.clone());
        Harness {
            gateway,
            notifier,
            reporter,
        }
    }

    fn client_scope(id: &str) -> ScopeKey {
        ScopeKey::new(EntityType::Client, id)
    }

    fn create_contact(h: &Harness, scope: &ScopeKey, name: &str) -> UnifiedContact {
        h.gateway
            .create_contact(scope, &ContactInput::named(name))
            .unwrap()
            .applied()
            .unwrap()
    }

    #[test]
    fn test_create_then_read_same_scope() {
        let h = harness();
        let scope = client_scope("cl-1");

        let created = create_contact(&h, &scope, "Ada Nguyen");
        assert_eq!(created.entity_type, EntityType::Client);
        assert_eq!(created.entity_id, "cl-1");

        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, created.id);

        let other = h.gateway.list_contacts(EntityType::Client, Some("cl-2")).unwrap();
        assert!(other.is_empty());

        let other_type = h.gateway.list_contacts(EntityType::Site, Some("cl-1")).unwrap();
        assert!(other_type.is_empty());
    }

    #[test]
    fn test_missing_parent_id_skips_the_backend() {
        let h = harness();

        assert!(h.gateway.list_contacts(EntityType::Client, None).unwrap().is_empty());
        assert!(h.gateway.list_addresses(EntityType::Site, Some("  ")).unwrap().is_empty());
        assert_eq!(h.gateway.store().select_count(), 0);
    }

    #[test]
    fn test_reads_are_cached_until_a_mutation() {
        let h = harness();
        let scope = client_scope("cl-1");
        create_contact(&h, &scope, "Ada");

        h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        let after_reads = h.gateway.store().select_count();

        create_contact(&h, &scope, "Ben");
        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(contacts.len(), 2);
        assert!(h.gateway.store().select_count() > after_reads);
    }

    #[test]
    fn test_create_invalidates_only_its_scope() {
        let h = harness();
        h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        h.gateway.list_contacts(EntityType::Client, Some("cl-2")).unwrap();

        create_contact(&h, &client_scope("cl-1"), "Ada");

        let cache = h.gateway.cache();
        assert!(!cache.contains(&QueryKey::scoped(Table::UnifiedContacts, &client_scope("cl-1"))));
        assert!(cache.contains(&QueryKey::scoped(Table::UnifiedContacts, &client_scope("cl-2"))));
    }

    #[test]
    fn test_update_invalidates_scope_and_table() {
        let h = harness();
        let created = create_contact(&h, &client_scope("cl-1"), "Ada");
        h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        h.gateway.list_contacts(EntityType::Client, Some("cl-2")).unwrap();

        let patch = ContactPatch {
            phone: Some("02 9000 1234".to_string()),
            contact_type: Some(ContactType::Billing),
            ..Default::default()
        };
        let updated = h.gateway.update_contact(&created.id, &patch).unwrap().applied().unwrap();
        assert_eq!(updated.phone.as_deref(), Some("02 9000 1234"));
        assert_eq!(updated.contact_type, Some(ContactType::Billing));
        assert_eq!(updated.name.as_deref(), Some("Ada"));

        assert!(h.gateway.cache().is_empty());

        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(contacts[0].phone.as_deref(), Some("02 9000 1234"));
    }

    #[test]
    fn test_delete_then_read_omits_record() {
        let h = harness();
        let scope = client_scope("cl-1");
        let ada = create_contact(&h, &scope, "Ada");
        create_contact(&h, &scope, "Ben");
        assert_eq!(h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap().len(), 2);

        assert!(h.gateway.delete_contact(&ada.id).unwrap().is_applied());

        let remaining = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name.as_deref(), Some("Ben"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let h = harness();
        let ada = create_contact(&h, &client_scope("cl-1"), "Ada");

        assert!(h.gateway.delete_contact(&ada.id).unwrap().is_applied());
        assert!(h.gateway.delete_contact(&ada.id).unwrap().is_applied());
        assert!(h.gateway.delete_contact("never-existed").unwrap().is_applied());
        assert!(h.reporter.captured().is_empty());
    }

    #[test]
    fn test_success_notifications() {
        let h = harness();
        create_contact(&h, &client_scope("cl-1"), "Ada");

        let notice = h.notifier.last().unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, "Contact created successfully");
    }

    #[test]
    fn test_local_validation_failure_is_data() {
        let h = harness();
        let input = ContactInput {
            name: Some("Ada".to_string()),
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };

        let outcome = h.gateway.create_contact(&client_scope("cl-1"), &input).unwrap();
        let errors = outcome.rejected().unwrap();
        assert_eq!(errors[0].field, "email");

        assert_eq!(h.notifier.last().unwrap().level, NoticeLevel::Warning);
        assert!(h.reporter.captured().is_empty());
        assert!(h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap().is_empty());
    }

    #[test]
    fn test_backend_validation_failure_is_data() {
        let h = harness();
        h.gateway.store().fail_next_write(
            ServiceError::validation("email already used")
                .with_details(json!([{ "field": "email", "message": "Already in use" }])),
        );

        let outcome = h
            .gateway
            .create_contact(&client_scope("cl-1"), &ContactInput::named("Ada"))
            .unwrap();
        let errors = outcome.rejected().unwrap();
        assert_eq!(errors[0].field, "email");
        assert_eq!(errors[0].message, "Already in use");
    }

    #[test]
    fn test_hard_failure_is_reported_and_returned() {
        let h = harness();
        h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        h.gateway
            .store()
            .fail_next_write(ServiceError::new(ErrorCategory::Network, "connection reset"));

        let err = h
            .gateway
            .create_contact(&client_scope("cl-1"), &ContactInput::named("Ada"))
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Network);

        assert_eq!(
            h.reporter.captured(),
            vec![(ErrorCategory::Network, "create contact".to_string())]
        );
        let notice = h.notifier.last().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(!h
            .gateway
            .cache()
            .contains(&QueryKey::scoped(Table::UnifiedContacts, &client_scope("cl-1"))));
    }

    #[test]
    fn test_create_without_parent_id_is_rejected() {
        let h = harness();
        let outcome = h
            .gateway
            .create_contact(&client_scope("  "), &ContactInput::named("Ada"))
            .unwrap();

        assert_eq!(
            outcome.rejected().unwrap().to_vec(),
            vec![ValidationError::new("entity_id", "Required field is empty", "Contact")]
        );
        assert_eq!(h.gateway.store().inner.count(Table::UnifiedContacts).unwrap(), 0);
        assert!(h.reporter.captured().is_empty());
    }

    #[test]
    fn test_update_cannot_blank_every_name() {
        let h = harness();
        let ada = create_contact(&h, &client_scope("cl-1"), "Ada");

        let blank = ContactPatch {
            name: Some(String::new()),
            first_name: Some(String::new()),
            ..Default::default()
        };
        let outcome = h.gateway.update_contact(&ada.id, &blank).unwrap();
        assert_eq!(outcome.rejected().unwrap()[0].field, "name");

        let renamed = ContactPatch {
            name: Some(String::new()),
            first_name: Some("Ada".to_string()),
            ..Default::default()
        };
        let updated = h.gateway.update_contact(&ada.id, &renamed).unwrap().applied().unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_update_of_missing_record_is_not_found() {
        let h = harness();
        let err = h
            .gateway
            .update_contact("missing", &ContactPatch::default())
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::NotFound);
    }

    #[test]
    fn test_read_retries_once_on_transient_failure() {
        let h = harness();
        create_contact(&h, &client_scope("cl-1"), "Ada");
        h.gateway
            .store()
            .fail_selects(vec![ServiceError::new(ErrorCategory::Network, "timeout")]);

        let before = h.gateway.store().select_count();
        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(h.gateway.store().select_count() - before, 2);
    }

    #[test]
    fn test_read_gives_up_after_one_retry() {
        let h = harness();
        h.gateway.store().fail_selects(vec![
            ServiceError::new(ErrorCategory::Server, "503"),
            ServiceError::new(ErrorCategory::Server, "503"),
        ]);

        let err = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Server);
        assert_eq!(h.gateway.store().select_count(), 2);
        assert_eq!(h.reporter.captured().len(), 1);
    }

    #[test]
    fn test_read_does_not_retry_permission_errors() {
        let h = harness();
        h.gateway
            .store()
            .fail_selects(vec![ServiceError::new(ErrorCategory::Permission, "denied")]);

        let err = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Permission);
        assert_eq!(h.gateway.store().select_count(), 1);
    }

    #[test]
    fn test_stale_copy_served_when_refetch_fails() {
        let h = UnifiedEntityGateway::new(FlakyStore::new())
            .with_cache_config(CacheConfig::from_secs(0, 600))
            .with_notifier(Arc::new(RecordingNotifier::default()));
        h.create_contact(&client_scope("cl-1"), &ContactInput::named("Ada"))
            .unwrap();
        assert_eq!(h.list_contacts(EntityType::Client, Some("cl-1")).unwrap().len(), 1);

        h.store().fail_selects(vec![
            ServiceError::new(ErrorCategory::Network, "offline"),
            ServiceError::new(ErrorCategory::Network, "offline"),
        ]);
        let contacts = h.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn test_single_primary_per_scope() {
        let h = harness();
        let scope = client_scope("cl-1");
        let first = ContactInput {
            is_primary: true,
            ..ContactInput::named("Ada")
        };
        let second = ContactInput {
            is_primary: true,
            ..ContactInput::named("Ben")
        };
        let elsewhere = ContactInput {
            is_primary: true,
            ..ContactInput::named("Cy")
        };

        h.gateway.create_contact(&scope, &first).unwrap();
        h.gateway.create_contact(&scope, &second).unwrap();
        h.gateway.create_contact(&client_scope("cl-2"), &elsewhere).unwrap();

        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        let primaries: Vec<&str> = contacts
            .iter()
            .filter(|c| c.is_primary)
            .filter_map(|c| c.name.as_deref())
            .collect();
        assert_eq!(primaries, vec!["Ben"]);

        let other = h.gateway.list_contacts(EntityType::Client, Some("cl-2")).unwrap();
        assert!(other[0].is_primary);
    }

    #[test]
    fn test_primary_moves_on_update() {
        let h = harness();
        let scope = client_scope("cl-1");
        let ada = h
            .gateway
            .create_contact(&scope, &ContactInput { is_primary: true, ..ContactInput::named("Ada") })
            .unwrap()
            .applied()
            .unwrap();
        let ben = create_contact(&h, &scope, "Ben");

        let patch = ContactPatch {
            is_primary: Some(true),
            ..Default::default()
        };
        h.gateway.update_contact(&ben.id, &patch).unwrap();

        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        let ada_now = contacts.iter().find(|c| c.id == ada.id).unwrap();
        let ben_now = contacts.iter().find(|c| c.id == ben.id).unwrap();
        assert!(!ada_now.is_primary);
        assert!(ben_now.is_primary);
    }

    #[test]
    fn test_failed_demotion_keeps_the_old_primary() {
        let h = harness();
        let scope = client_scope("cl-1");
        let primary = |name: &str| ContactInput {
            is_primary: true,
            ..ContactInput::named(name)
        };
        h.gateway.create_contact(&scope, &primary("Ada")).unwrap();
        assert_eq!(h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap().len(), 1);

        // insert Ben, demote Ada (fails), promote Ben
        h.gateway
            .store()
            .fail_write_at(2, ServiceError::new(ErrorCategory::Network, "connection reset"));
        let err = h.gateway.create_contact(&scope, &primary("Ben")).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Network);

        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert_eq!(contacts.len(), 2);
        let primaries: Vec<&str> = contacts
            .iter()
            .filter(|c| c.is_primary)
            .filter_map(|c| c.name.as_deref())
            .collect();
        assert_eq!(primaries, vec!["Ada"]);
    }

    #[test]
    fn test_failed_promotion_never_leaves_two_primaries() {
        let h = harness();
        let scope = client_scope("cl-1");
        h.gateway
            .create_contact(&scope, &ContactInput { is_primary: true, ..ContactInput::named("Ada") })
            .unwrap();
        let ben = create_contact(&h, &scope, "Ben");
        h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();

        // update Ben, demote Ada, promote Ben (fails)
        h.gateway
            .store()
            .fail_write_at(3, ServiceError::new(ErrorCategory::Server, "503"));
        let patch = ContactPatch {
            is_primary: Some(true),
            position: Some("Site manager".to_string()),
            ..Default::default()
        };
        h.gateway.update_contact(&ben.id, &patch).unwrap_err();

        let contacts = h.gateway.list_contacts(EntityType::Client, Some("cl-1")).unwrap();
        assert!(contacts.iter().all(|c| !c.is_primary));
        let ben_now = contacts.iter().find(|c| c.id == ben.id).unwrap();
        assert_eq!(ben_now.position.as_deref(), Some("Site manager"));
    }

    #[test]
    fn test_cache_does_not_grow_past_retention() {
        let gateway = UnifiedEntityGateway::new(FlakyStore::new())
            .with_cache_config(CacheConfig::from_secs(0, 0));

        for n in 0..100 {
            let id = format!("cl-{}", n);
            gateway.list_contacts(EntityType::Client, Some(id.as_str())).unwrap();
        }
        assert_eq!(gateway.cache().len(), 1);
    }

    #[test]
    fn test_overseas_address_patch_keeps_stored_country() {
        let h = harness();
        let scope = ScopeKey::new(EntityType::Site, "st-9");
        let input = AddressInput {
            country: "New Zealand".to_string(),
            ..AddressInput::new("1 Queen St", "Auckland Central", "Auckland", "1010", AddressType::Physical)
        };
        let address = h.gateway.create_address(&scope, &input).unwrap().applied().unwrap();

        let patch = AddressPatch {
            state: Some("Wellington".to_string()),
            postcode: Some("6011".to_string()),
            ..Default::default()
        };
        let updated = h.gateway.update_address(&address.id, &patch).unwrap().applied().unwrap();
        assert_eq!(updated.state, "Wellington");
        assert_eq!(updated.country, "New Zealand");

        // moving it to Australia brings the state rule back
        let home = AddressPatch {
            country: Some("Australia".to_string()),
            ..Default::default()
        };
        let outcome = h.gateway.update_address(&address.id, &home).unwrap();
        assert!(outcome.rejected().unwrap().iter().any(|e| e.field == "state"));
    }

    #[test]
    fn test_address_lifecycle() {
        let h = harness();
        let scope = ScopeKey::new(EntityType::Site, "st-1");
        let input = AddressInput::new("12 Harbour St", "Pyrmont", "NSW", "2009", AddressType::Physical);

        let address = h.gateway.create_address(&scope, &input).unwrap().applied().unwrap();
        assert_eq!(address.country, "Australia");

        let patch = AddressPatch {
            address_line_2: Some("Level 3".to_string()),
            ..Default::default()
        };
        let updated = h.gateway.update_address(&address.id, &patch).unwrap().applied().unwrap();
        assert_eq!(updated.one_line(), "12 Harbour St, Level 3, Pyrmont NSW 2009");

        let bad = AddressPatch {
            state: Some("Sydney".to_string()),
            ..Default::default()
        };
        assert!(!h.gateway.update_address(&address.id, &bad).unwrap().is_applied());

        h.gateway.delete_address(&address.id).unwrap();
        assert!(h.gateway.list_addresses(EntityType::Site, Some("st-1")).unwrap().is_empty());
    }

    #[test]
    fn test_client_identifiers_checked_and_formatted() {
        let h = harness();
        let bad = ClientInput {
            name: "Harbourside Offices".to_string(),
            abn: Some("51824753557".to_string()),
            ..Default::default()
        };
        let rejected = h.gateway.create_client(&bad).unwrap();
        assert_eq!(rejected.rejected().unwrap()[0].field, "abn");

        let good = ClientInput {
            name: "Harbourside Offices".to_string(),
            abn: Some("51824753556".to_string()),
            acn: Some("004085616".to_string()),
            ..Default::default()
        };
        let client = h.gateway.create_client(&good).unwrap().applied().unwrap();
        assert_eq!(client.abn.as_deref(), Some("51 824 753 556"));
        assert_eq!(client.acn.as_deref(), Some("00 408 561 6"));

        let patch = ClientPatch {
            acn: Some("004 085 616".to_string()),
            ..Default::default()
        };
        let updated = h.gateway.update_client(&client.id, &patch).unwrap().applied().unwrap();
        assert_eq!(updated.acn.as_deref(), Some("00 408 561 6"));
        assert_eq!(updated.name, "Harbourside Offices");

        assert_eq!(h.gateway.list_clients().unwrap().len(), 1);
    }

    #[test]
    fn test_party_list_refreshes_after_create() {
        let h = harness();
        assert!(h.gateway.list_suppliers().unwrap().is_empty());

        let supplier = SupplierInput {
            name: "Glass Co".to_string(),
            services: Some("Window cleaning".to_string()),
            ..Default::default()
        };
        h.gateway.create_supplier(&supplier).unwrap();

        let suppliers = h.gateway.list_suppliers().unwrap();
        assert_eq!(suppliers.len(), 1);
        assert_eq!(suppliers[0].services.as_deref(), Some("Window cleaning"));
    }

    #[test]
    fn test_delete_party_removes_owned_records() {
        let h = harness();
        let client = h
            .gateway
            .create_client(&ClientInput {
                name: "Harbourside Offices".to_string(),
                ..Default::default()
            })
            .unwrap()
            .applied()
            .unwrap();
        let scope = ScopeKey::new(EntityType::Client, client.id.clone());
        create_contact(&h, &scope, "Ada");
        h.gateway
            .create_address(
                &scope,
                &AddressInput::new("1 Queen St", "Brisbane City", "QLD", "4000", AddressType::Billing),
            )
            .unwrap();
        let unrelated = create_contact(&h, &client_scope("someone-else"), "Zed");

        assert_eq!(h.gateway.list_contacts(EntityType::Client, Some(client.id.as_str())).unwrap().len(), 1);
        assert!(h.gateway.delete_client(&client.id).unwrap().is_applied());

        assert!(h.gateway.list_clients().unwrap().is_empty());
        assert!(h.gateway.list_contacts(EntityType::Client, Some(client.id.as_str())).unwrap().is_empty());
        assert!(h.gateway.list_addresses(EntityType::Client, Some(client.id.as_str())).unwrap().is_empty());

        let survivors = h
            .gateway
            .list_contacts(EntityType::Client, Some("someone-else"))
            .unwrap();
        assert_eq!(survivors[0].id, unrelated.id);
    }

    #[test]
    fn test_failed_party_delete_still_drops_cached_lists() {
        let h = harness();
        let client = h
            .gateway
            .create_client(&ClientInput {
                name: "Harbourside Offices".to_string(),
                ..Default::default()
            })
            .unwrap()
            .applied()
            .unwrap();
        let scope = ScopeKey::new(EntityType::Client, client.id.clone());
        create_contact(&h, &scope, "Ada");
        create_contact(&h, &scope, "Ben");
        assert_eq!(h.gateway.list_contacts(EntityType::Client, Some(client.id.as_str())).unwrap().len(), 2);

        // the first contact goes, the second delete fails
        h.gateway
            .store()
            .fail_write_at(2, ServiceError::new(ErrorCategory::Network, "connection reset"));
        h.gateway.delete_client(&client.id).unwrap_err();

        assert!(!h.gateway.cache().contains(&QueryKey::scoped(Table::UnifiedContacts, &scope)));
        let left = h.gateway.list_contacts(EntityType::Client, Some(client.id.as_str())).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(h.gateway.list_clients().unwrap().len(), 1);
    }

    #[test]
    fn test_mutation_wire_shape() {
        let applied: Mutation<u32> = Mutation::Applied(7);
        assert_eq!(
            serde_json::to_value(&applied).unwrap(),
            json!({"status": "applied", "result": 7})
        );
        let rejected: Mutation<u32> =
            Mutation::Rejected(vec![ValidationError::new("name", "Required field is empty", "Contact")]);
        let wire = serde_json::to_value(&rejected).unwrap();
        assert_eq!(wire["status"], "rejected");
        assert_eq!(wire["result"][0]["field"], "name");
    }
}
