// 🗄️ Row store - the backend boundary
//
// The backend is a generic select / insert / update / delete row store
// scoped by table name and a filter, plus named callable functions.
// SqliteStore is the local implementation: one JSON document per row,
// filters evaluated with json_extract, every write journaled to `events`.

use crate::entities::ScopeKey;
use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// One backend row
pub type Row = Map<String, Value>;

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    UnifiedContacts,
    UnifiedAddresses,
    Clients,
    Suppliers,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::UnifiedContacts,
        Table::UnifiedAddresses,
        Table::Clients,
        Table::Suppliers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::UnifiedContacts => "unified_contacts",
            Table::UnifiedAddresses => "unified_addresses",
            Table::Clients => "clients",
            Table::Suppliers => "suppliers",
        }
    }

    /// Members the backend refuses to store without
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Table::UnifiedContacts => &["entity_type", "entity_id"],
            Table::UnifiedAddresses => &[
                "entity_type",
                "entity_id",
                "address_line_1",
                "suburb",
                "state",
                "postcode",
            ],
            Table::Clients | Table::Suppliers => &["name"],
        }
    }

    fn is_scoped(&self) -> bool {
        matches!(self, Table::UnifiedContacts | Table::UnifiedAddresses)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ServiceError::not_found(format!("Unknown table: {}", s)))
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Equality filter over row members (AND-ed together)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn by_id(id: &str) -> Self {
        Filter::all().field_eq("id", id)
    }

    pub fn scope(scope: &ScopeKey) -> Self {
        Filter::all()
            .field_eq("entity_type", scope.entity_type.as_str())
            .field_eq("entity_id", scope.entity_id.as_str())
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// In-process evaluation, same semantics as the SQL form
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| row.get(field).unwrap_or(&Value::Null) == expected)
    }
}

fn is_safe_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

/// `WHERE ...` over json_extract plus its positional parameters
fn where_clause(filter: &Filter) -> ServiceResult<(String, Vec<rusqlite::types::Value>)> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for (field, value) in filter.conditions() {
        if !is_safe_field(field) {
            return Err(ServiceError::validation(format!(
                "Invalid filter field: {}",
                field
            )));
        }
        if value.is_null() {
            clauses.push(format!("json_extract(data, '$.{}') IS NULL", field));
        } else {
            values.push(to_sql_value(value));
            clauses.push(format!(
                "json_extract(data, '$.{}') = ?{}",
                field,
                values.len()
            ));
        }
    }

    if clauses.is_empty() {
        Ok((String::new(), values))
    } else {
        Ok((format!("WHERE {}", clauses.join(" AND ")), values))
    }
}

// ============================================================================
// BACKEND CONTRACT
// ============================================================================

/// select / insert / update / delete by table + filter
pub trait RowStore: Send + Sync {
    fn select(&self, table: Table, filter: &Filter) -> ServiceResult<Vec<Row>>;

    /// Assigns `id`, `created_at` and `updated_at`; returns the stored row
    fn insert(&self, table: Table, values: Row) -> ServiceResult<Row>;

    /// Merges `changes` into the row; `not_found` if there is no such row
    fn update(&self, table: Table, id: &str, changes: Row) -> ServiceResult<Row>;

    /// Returns whether a row was actually removed
    fn delete(&self, table: Table, id: &str) -> ServiceResult<bool>;

    /// Removes `id` and every row of the `owned` tables matching their filter.
    /// Row by row here; stores with transactions override this to make it atomic.
    fn delete_with_owned(&self, table: Table, id: &str, owned: &[(Table, Filter)]) -> ServiceResult<bool> {
        for (owned_table, filter) in owned {
            for row in self.select(*owned_table, filter)? {
                if let Some(owned_id) = row.get("id").and_then(Value::as_str) {
                    self.delete(*owned_table, owned_id)?;
                }
            }
        }
        self.delete(table, id)
    }
}

/// Remote callables ("edge functions") invoked by name with a JSON body
pub trait EdgeFunctions: Send + Sync {
    fn invoke(&self, name: &str, body: &Value) -> ServiceResult<Value>;
}

pub const GET_SCHEMA: &str = "get-schema";

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail - every write is an event
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> ServiceResult<()> {
    // ==========================================================================
    // Row tables: one JSON document per row
    // ==========================================================================
    for table in Table::ALL {
        let checks: Vec<String> = table
            .required_fields()
            .iter()
            .map(|field| {
                format!(
                    "CONSTRAINT {field}_required CHECK (json_extract(data, '$.{field}') IS NOT NULL)"
                )
            })
            .collect();

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    data TEXT NOT NULL CHECK (json_valid(data)),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    {checks}
                )",
                table = table.as_str(),
                checks = checks.join(",\n"),
            ),
            [],
        )?;

        if table.is_scoped() {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_scope ON {table} (
                        json_extract(data, '$.entity_type'),
                        json_extract(data, '$.entity_id')
                    )",
                    table = table.as_str()
                ),
                [],
            )?;
        }
    }

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> ServiceResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> ServiceResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
    actor: String,
}

impl SqliteStore {
    /// Open (or create) a database file, WAL mode, schema applied
    pub fn open(path: &Path) -> ServiceResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> ServiceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> ServiceResult<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            actor: "erp-core".to_string(),
        })
    }

    /// Name recorded as the actor of audit events
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    fn lock(&self) -> ServiceResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ServiceError::poisoned("database"))
    }

    /// Audit trail of one row
    pub fn events_for(&self, table: Table, id: &str) -> ServiceResult<Vec<Event>> {
        let conn = self.lock()?;
        get_events_for_entity(&conn, table.as_str(), id)
    }

    pub fn count(&self, table: Table) -> ServiceResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn load(conn: &Connection, table: Table, id: &str) -> ServiceResult<Option<Row>> {
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE id = ?1", table.as_str()),
                [id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|json| parse_row(&json)).transpose()
    }

    /// Describe every table: SQL columns, row count, JSON members seen
    fn describe_schema(&self) -> ServiceResult<Value> {
        let conn = self.lock()?;
        let mut tables = Vec::new();

        for table in Table::ALL {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.as_str()))?;
            let columns = stmt
                .query_map([], |row| {
                    let name: String = row.get(1)?;
                    let ty: String = row.get(2)?;
                    let not_null: i64 = row.get(3)?;
                    let pk: i64 = row.get(5)?;
                    Ok(json!({
                        "name": name,
                        "type": ty,
                        "nullable": not_null == 0,
                        "primary_key": pk > 0,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let row_count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table.as_str()),
                [],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT j.key FROM {table}, json_each({table}.data) AS j ORDER BY j.key",
                table = table.as_str()
            ))?;
            let fields = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            tables.push(json!({
                "name": table.as_str(),
                "columns": columns,
                "row_count": row_count,
                "fields": fields,
            }));
        }

        Ok(json!({ "tables": tables }))
    }
}

fn parse_row(json: &str) -> ServiceResult<Row> {
    match serde_json::from_str(json)? {
        Value::Object(map) => Ok(map),
        _ => Err(ServiceError::server("Stored row is not a JSON object")),
    }
}

/// `CHECK constraint failed: entity_id_required` -> field-level validation error
fn map_write_error(err: rusqlite::Error) -> ServiceError {
    let message = err.to_string();
    let mapped = ServiceError::from(err);
    if mapped.category != crate::error::ErrorCategory::Validation {
        return mapped;
    }

    match message
        .split("CHECK constraint failed: ")
        .nth(1)
        .and_then(|rest| rest.trim().strip_suffix("_required"))
    {
        Some(field) => ServiceError::validation(format!("{} is required", field)).with_details(
            json!([{ "field": field, "message": "Required field is empty" }]),
        ),
        None => mapped,
    }
}

impl RowStore for SqliteStore {
    fn select(&self, table: Table, filter: &Filter) -> ServiceResult<Vec<Row>> {
        let (where_clause, values) = where_clause(filter)?;

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT data FROM {} {} ORDER BY rowid",
            table.as_str(),
            where_clause
        ))?;

        let raw = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter().map(|json| parse_row(json)).collect()
    }

    fn insert(&self, table: Table, mut values: Row) -> ServiceResult<Row> {
        let now = Utc::now().to_rfc3339();
        let id = match values.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        values.insert("id".to_string(), json!(id));
        values.insert("created_at".to_string(), json!(now));
        values.insert("updated_at".to_string(), json!(now));
        let data = serde_json::to_string(&values)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                table.as_str()
            ),
            params![id, data, now],
        )
        .map_err(map_write_error)?;

        insert_event(
            &tx,
            &Event::new("row_inserted", table.as_str(), &id, Value::Object(values.clone()), &self.actor),
        )?;
        tx.commit()?;

        Ok(values)
    }

    fn update(&self, table: Table, id: &str, changes: Row) -> ServiceResult<Row> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut row = Self::load(&tx, table, id)?.ok_or_else(|| {
            ServiceError::not_found(format!("No row {} in {}", id, table.as_str()))
        })?;

        for (key, value) in changes.iter() {
            if key == "id" || key == "created_at" {
                continue;
            }
            row.insert(key.clone(), value.clone());
        }

        let now = Utc::now().to_rfc3339();
        row.insert("updated_at".to_string(), json!(now));
        let data = serde_json::to_string(&row)?;

        tx.execute(
            &format!(
                "UPDATE {} SET data = ?1, updated_at = ?2 WHERE id = ?3",
                table.as_str()
            ),
            params![data, now, id],
        )
        .map_err(map_write_error)?;

        insert_event(
            &tx,
            &Event::new("row_updated", table.as_str(), id, Value::Object(changes), &self.actor),
        )?;
        tx.commit()?;

        Ok(row)
    }

    fn delete(&self, table: Table, id: &str) -> ServiceResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE id = ?1", table.as_str()),
            [id],
        )?;

        if removed > 0 {
            insert_event(
                &tx,
                &Event::new("row_deleted", table.as_str(), id, json!({}), &self.actor),
            )?;
        }
        tx.commit()?;

        Ok(removed > 0)
    }

    fn delete_with_owned(&self, table: Table, id: &str, owned: &[(Table, Filter)]) -> ServiceResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for (owned_table, filter) in owned {
            let (where_clause, values) = where_clause(filter)?;
            let ids = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id FROM {} {}",
                    owned_table.as_str(),
                    where_clause
                ))?;
                let ids = stmt
                    .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            };

            for owned_id in &ids {
                tx.execute(
                    &format!("DELETE FROM {} WHERE id = ?1", owned_table.as_str()),
                    [owned_id],
                )?;
                insert_event(
                    &tx,
                    &Event::new("row_deleted", owned_table.as_str(), owned_id, json!({}), &self.actor),
                )?;
            }
        }

        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE id = ?1", table.as_str()),
            [id],
        )?;
        if removed > 0 {
            insert_event(
                &tx,
                &Event::new("row_deleted", table.as_str(), id, json!({}), &self.actor),
            )?;
        }
        tx.commit()?;

        Ok(removed > 0)
    }
}

impl EdgeFunctions for SqliteStore {
    fn invoke(&self, name: &str, _body: &Value) -> ServiceResult<Value> {
        match name {
            GET_SCHEMA => self.describe_schema(),
            other => Err(ServiceError::not_found(format!(
                "Unknown function: {}",
                other
            ))),
        }
    }
}
