// 📥 Contact import - CSV -> unified_contacts
//
// Rows go through the gateway like any other create, so validation, primary
// demotion and cache invalidation all apply. Re-importing the same file is a
// no-op: a row whose fingerprint already exists in its scope is skipped.

use crate::db::RowStore;
use crate::entities::{ContactInput, ContactType, EntityType, ScopeKey, ScopedRecord, UnifiedContact};
use crate::error::ServiceResult;
use crate::gateway::{Mutation, UnifiedEntityGateway};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

/// One CSV line, loosely typed; parsing happens per row so a bad row is
/// rejected instead of failing the whole file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContactRow {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub is_primary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// "line 4: email: Invalid email address"
    pub problems: Vec<String>,
}

pub fn load_contacts_csv(csv_path: &Path) -> Result<Vec<ContactRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    read_contacts(file)
}

pub fn read_contacts<R: Read>(reader: R) -> Result<Vec<ContactRow>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: ContactRow = result.context("Failed to deserialize contact row")?;
        rows.push(row);
    }
    Ok(rows)
}

/// SHA-256 over the fields that identify a person within a scope
pub fn fingerprint(scope: &ScopeKey, name: &str, email: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}",
        scope.entity_type,
        scope.entity_id,
        name.trim().to_lowercase(),
        email.unwrap_or_default().trim().to_lowercase()
    ));
    format!("{:x}", hasher.finalize())
}

fn contact_fingerprint(contact: &UnifiedContact) -> String {
    fingerprint(
        &contact.scope(),
        &contact.display_name(),
        contact.email.as_deref(),
    )
}

fn parse_contact_type(raw: Option<&str>) -> Result<Option<ContactType>, String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    match raw.to_lowercase().as_str() {
        "billing" => Ok(Some(ContactType::Billing)),
        "operations" => Ok(Some(ContactType::Operations)),
        "emergency" => Ok(Some(ContactType::Emergency)),
        "primary" => Ok(Some(ContactType::Primary)),
        _ => Err(format!("contact_type: Unknown contact type {}", raw)),
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|r| r.trim().to_lowercase()).as_deref(),
        Some("true" | "yes" | "y" | "1")
    )
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl ContactRow {
    fn scope(&self) -> Result<ScopeKey, String> {
        let entity_type: EntityType = self
            .entity_type
            .parse()
            .map_err(|_| format!("entity_type: Unknown entity type {}", self.entity_type))?;
        if self.entity_id.trim().is_empty() {
            return Err("entity_id: Required field is empty".to_string());
        }
        Ok(ScopeKey::new(entity_type, self.entity_id.trim()))
    }

    fn to_input(&self) -> Result<ContactInput, String> {
        Ok(ContactInput {
            name: non_empty(&self.name),
            email: non_empty(&self.email),
            phone: non_empty(&self.phone),
            mobile: non_empty(&self.mobile),
            position: non_empty(&self.position),
            contact_type: parse_contact_type(self.contact_type.as_deref())?,
            is_primary: parse_flag(self.is_primary.as_deref()),
            ..Default::default()
        })
    }
}

/// Create every row through the gateway. Hard failures abort the import;
/// rows that fail validation are counted and described.
pub fn import_contacts<S: RowStore>(
    gateway: &UnifiedEntityGateway<S>,
    rows: &[ContactRow],
) -> ServiceResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut seen: HashMap<ScopeKey, HashSet<String>> = HashMap::new();

    for (index, row) in rows.iter().enumerate() {
        // header is line 1
        let line = index + 2;

        let (scope, input) = match row.scope().and_then(|scope| Ok((scope, row.to_input()?))) {
            Ok(parsed) => parsed,
            Err(problem) => {
                summary.rejected += 1;
                summary.problems.push(format!("line {}: {}", line, problem));
                continue;
            }
        };

        if !seen.contains_key(&scope) {
            let existing = gateway
                .list_contacts(scope.entity_type, Some(scope.entity_id.as_str()))?
                .iter()
                .map(contact_fingerprint)
                .collect();
            seen.insert(scope.clone(), existing);
        }

        let print = fingerprint(
            &scope,
            input.name.as_deref().unwrap_or_default(),
            input.email.as_deref(),
        );
        if seen.get(&scope).is_some_and(|prints| prints.contains(&print)) {
            summary.duplicates += 1;
            continue;
        }

        match gateway.create_contact(&scope, &input)? {
            Mutation::Applied(_) => {
                summary.inserted += 1;
                seen.entry(scope).or_default().insert(print);
            }
            Mutation::Rejected(errors) => {
                summary.rejected += 1;
                for error in errors {
                    summary
                        .problems
                        .push(format!("line {}: {}: {}", line, error.field, error.message));
                }
            }
        }
    }

    tracing::info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "contact import finished"
    );
    Ok(summary)
}
