use crate::catalog::{
    CatalogStore, FieldCatalog, ID_COLUMN, OWNER_KEY, ROLE_KEY, TENANT_KEY, is_reserved,
};
use crate::config::FieldStoreConfig;
use crate::error::FieldStoreError;
use crate::migration::verify_layout;
use crate::permission::Principal;
use crate::query::build_list_query;
use crate::query::plan::{Order, Query, col};
use crate::query::planner::{CompiledQuery, compile_select, quote_ident};
use crate::query::scope::{AccessScope, VisibilityPredicate};
use crate::{HookRegistry, LifecycleEvent};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub type RecordId = i64;

/// Raw caller input, keyed by field key. Values are opaque text.
pub type FieldValues = HashMap<String, String>;

/// One stored row, shaped to the catalog it was read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub values: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn owner(&self) -> &str {
        self.get(OWNER_KEY).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    pub fn into_map(self) -> FieldValues {
        self.values.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    fn offset(&self) -> Result<usize, FieldStoreError> {
        match &self.cursor {
            None => Ok(0),
            Some(cursor) => cursor
                .parse()
                .map_err(|_| FieldStoreError::Validation(format!("invalid page cursor '{cursor}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Re-issue the same listing with this cursor to continue. No state is
    /// kept between calls.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListOrder {
    Sequence,
    Identifier,
}

/// CRUD and scoped listing over the record table. The catalog is re-read at
/// the start of every operation so a reconciled schema shows up immediately.
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    catalog: CatalogStore,
    table_name: String,
    max_items_per_owner: usize,
    required_field: String,
    sequence_field: String,
    hooks: Arc<HookRegistry>,
}

impl RecordStore {
    pub(crate) fn new(
        conn: Arc<Mutex<Connection>>,
        catalog: CatalogStore,
        config: &FieldStoreConfig,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            conn,
            catalog,
            table_name: config.table_name.clone(),
            max_items_per_owner: config.max_items_per_owner,
            required_field: config.required_field.clone(),
            sequence_field: config.sequence_field.clone(),
            hooks,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn max_items_per_owner(&self) -> usize {
        self.max_items_per_owner
    }

    pub fn create(
        &self,
        principal: &Principal,
        values: &FieldValues,
    ) -> Result<RecordId, FieldStoreError> {
        let catalog = self.catalog.load()?;
        let row = catalog
            .keys()
            .map(|key| match key {
                OWNER_KEY => principal.identity.clone(),
                ROLE_KEY => principal.role.as_str().to_string(),
                TENANT_KEY => principal.tenant_label.clone(),
                other => input_value(values, other),
            })
            .collect::<Vec<_>>();
        if let Some(idx) = catalog.position(&self.required_field)
            && row[idx].is_empty()
        {
            return Err(FieldStoreError::Validation(format!(
                "field '{}' is required",
                self.required_field
            )));
        }

        let id = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            verify_layout(&tx, &self.table_name, &catalog)?;
            if !principal.is_elevated() {
                let owned = count_owned(&tx, &self.table_name, &principal.identity)?;
                if owned >= self.max_items_per_owner {
                    return Err(FieldStoreError::QuotaExceeded {
                        owner: principal.identity.clone(),
                        limit: self.max_items_per_owner,
                    });
                }
            }
            let columns = catalog
                .keys()
                .map(quote_ident)
                .collect::<Result<Vec<_>, _>>()?;
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>();
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote_ident(&self.table_name)?,
                    columns.join(", "),
                    placeholders.join(", ")
                ),
                params_from_iter(row.iter()),
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            id
        };

        info!(
            record_id = id,
            owner = %principal.identity,
            role = %principal.role,
            "record created"
        );
        self.hooks.dispatch(LifecycleEvent::RecordCreated {
            record_id: id,
            owner: principal.identity.clone(),
        });
        Ok(id)
    }

    /// Overwrites every non-reserved field. Reserved fields keep the values
    /// captured at creation, so ownership never moves.
    pub fn update(
        &self,
        principal: &Principal,
        id: RecordId,
        values: &FieldValues,
    ) -> Result<(), FieldStoreError> {
        let catalog = self.catalog.load()?;
        let editable = catalog
            .keys()
            .filter(|key| !is_reserved(key))
            .map(str::to_string)
            .collect::<Vec<_>>();
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            verify_layout(&tx, &self.table_name, &catalog)?;
            self.authorize(&tx, principal, id)?;
            if !editable.is_empty() {
                let assignments = editable
                    .iter()
                    .enumerate()
                    .map(|(i, key)| Ok(format!("{} = ?{}", quote_ident(key)?, i + 1)))
                    .collect::<Result<Vec<_>, FieldStoreError>>()?;
                let mut params = editable
                    .iter()
                    .map(|key| input_value(values, key))
                    .collect::<Vec<_>>();
                params.push(id.to_string());
                tx.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE {} = ?{}",
                        quote_ident(&self.table_name)?,
                        assignments.join(", "),
                        quote_ident(ID_COLUMN)?,
                        params.len()
                    ),
                    params_from_iter(params.iter()),
                )?;
            }
            tx.commit()?;
        }

        info!(record_id = id, actor = %principal.identity, "record updated");
        self.hooks.dispatch(LifecycleEvent::RecordUpdated {
            record_id: id,
            actor: principal.identity.clone(),
        });
        Ok(())
    }

    pub fn delete(&self, principal: &Principal, id: RecordId) -> Result<(), FieldStoreError> {
        let catalog = self.catalog.load()?;
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            verify_layout(&tx, &self.table_name, &catalog)?;
            self.authorize(&tx, principal, id)?;
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote_ident(&self.table_name)?,
                    quote_ident(ID_COLUMN)?
                ),
                params![id],
            )?;
            tx.commit()?;
        }

        info!(record_id = id, actor = %principal.identity, "record deleted");
        self.hooks.dispatch(LifecycleEvent::RecordDeleted {
            record_id: id,
            actor: principal.identity.clone(),
        });
        Ok(())
    }

    pub fn get(&self, principal: &Principal, id: RecordId) -> Result<Record, FieldStoreError> {
        let catalog = self.catalog.load()?;
        let conn = self.conn.lock();
        verify_layout(&conn, &self.table_name, &catalog)?;
        let query = Query::select_all()
            .from(&self.table_name)
            .where_(col(ID_COLUMN).eq(id.to_string()));
        let mut found = None;
        run_query(&conn, &compile_select(&query)?, &catalog, |record| {
            found = Some(record);
            Ok(())
        })?;
        let record = found.ok_or_else(|| FieldStoreError::record_not_found(id))?;
        if !VisibilityPredicate::for_principal(principal).admits(record.owner()) {
            return Err(FieldStoreError::PermissionDenied(format!(
                "record {id} belongs to another owner"
            )));
        }
        Ok(record)
    }

    /// Every record visible to `principal` whose searchable fields contain
    /// `term`, ordered by the sequence field. An empty term lists everything
    /// visible.
    pub fn list(&self, principal: &Principal, term: &str) -> Result<Vec<Record>, FieldStoreError> {
        let mut out = Vec::new();
        self.for_each(principal, term, |record| {
            out.push(record);
            Ok(())
        })?;
        Ok(out)
    }

    /// Streams the same rows as [`RecordStore::list`] without collecting them.
    pub fn for_each<F>(&self, principal: &Principal, term: &str, f: F) -> Result<(), FieldStoreError>
    where
        F: FnMut(Record) -> Result<(), FieldStoreError>,
    {
        self.scan(principal, term, ListOrder::Sequence, None, f)
            .map(|_| ())
    }

    pub fn list_page(
        &self,
        principal: &Principal,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<Record>, FieldStoreError> {
        let offset = page.offset()?;
        let mut items = Vec::with_capacity(page.limit + 1);
        self.scan(
            principal,
            term,
            ListOrder::Sequence,
            Some((page.limit + 1, offset)),
            |record| {
                items.push(record);
                Ok(())
            },
        )?;
        let next_cursor = if items.len() > page.limit {
            items.truncate(page.limit);
            Some((offset + page.limit).to_string())
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    pub fn owned_count(&self, principal: &Principal) -> Result<usize, FieldStoreError> {
        let catalog = self.catalog.load()?;
        let conn = self.conn.lock();
        verify_layout(&conn, &self.table_name, &catalog)?;
        count_owned(&conn, &self.table_name, &principal.identity)
    }

    /// `None` for elevated principals, which have no quota.
    pub fn remaining_quota(&self, principal: &Principal) -> Result<Option<usize>, FieldStoreError> {
        if principal.is_elevated() {
            return Ok(None);
        }
        let owned = self.owned_count(principal)?;
        Ok(Some(self.max_items_per_owner.saturating_sub(owned)))
    }

    /// Runs a scoped listing and returns the catalog it was shaped with.
    pub(crate) fn scan<F>(
        &self,
        principal: &Principal,
        term: &str,
        order: ListOrder,
        window: Option<(usize, usize)>,
        f: F,
    ) -> Result<FieldCatalog, FieldStoreError>
    where
        F: FnMut(Record) -> Result<(), FieldStoreError>,
    {
        let catalog = self.catalog.load()?;
        let scope = AccessScope::resolve(principal, &catalog);
        let mut query = match order {
            ListOrder::Sequence => {
                build_list_query(&self.table_name, &self.sequence_field, &catalog, &scope, term)
            }
            ListOrder::Identifier => {
                let mut q = Query::select_all().from(&self.table_name);
                if let Some(visibility) = scope.visibility.to_expr() {
                    q = q.where_(visibility);
                }
                q.order_by(ID_COLUMN, Order::Asc)
            }
        };
        if let Some((limit, offset)) = window {
            query = query.limit(limit).offset(offset);
        }
        let compiled = compile_select(&query)?;
        debug!(sql = %compiled.sql, params = compiled.params.len(), "listing records");

        let conn = self.conn.lock();
        verify_layout(&conn, &self.table_name, &catalog)?;
        run_query(&conn, &compiled, &catalog, f)?;
        Ok(catalog)
    }

    fn authorize(
        &self,
        tx: &Transaction<'_>,
        principal: &Principal,
        id: RecordId,
    ) -> Result<(), FieldStoreError> {
        let owner: Option<String> = tx
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    quote_ident(OWNER_KEY)?,
                    quote_ident(&self.table_name)?,
                    quote_ident(ID_COLUMN)?
                ),
                params![id],
                |row| Ok(value_to_string(row.get_ref(0)?)),
            )
            .optional()?;
        let owner = owner.ok_or_else(|| FieldStoreError::record_not_found(id))?;
        if !principal.may_modify(&owner) {
            return Err(FieldStoreError::PermissionDenied(format!(
                "record {id} belongs to another owner"
            )));
        }
        Ok(())
    }
}

fn input_value(values: &FieldValues, key: &str) -> String {
    values
        .get(key)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn count_owned(conn: &Connection, table_name: &str, owner: &str) -> Result<usize, FieldStoreError> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(table_name)?,
            quote_ident(OWNER_KEY)?
        ),
        params![owner],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Executes `compiled` and hands each row, shaped to `catalog`, to `f`.
/// Catalog fields missing from the result come back as empty strings.
fn run_query<F>(
    conn: &Connection,
    compiled: &CompiledQuery,
    catalog: &FieldCatalog,
    mut f: F,
) -> Result<(), FieldStoreError>
where
    F: FnMut(Record) -> Result<(), FieldStoreError>,
{
    let mut stmt = conn.prepare(&compiled.sql)?;
    let names = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let id_idx = names
        .iter()
        .position(|n| n == ID_COLUMN)
        .ok_or_else(|| FieldStoreError::Storage("record table has no identifier column".into()))?;
    let field_idx = catalog
        .keys()
        .map(|key| (key.to_string(), names.iter().position(|n| n == key)))
        .collect::<Vec<_>>();

    let mut rows = stmt.query(params_from_iter(compiled.params.iter()))?;
    while let Some(row) = rows.next()? {
        let id: RecordId = row.get(id_idx)?;
        let mut values = Vec::with_capacity(field_idx.len());
        for (key, idx) in &field_idx {
            let value = match idx {
                Some(idx) => value_to_string(row.get_ref(*idx)?),
                None => String::new(),
            };
            values.push((key.clone(), value));
        }
        f(Record { id, values })?;
    }
    Ok(())
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{PageRequest, Record, value_to_string};
    use rusqlite::types::ValueRef;

    #[test]
    fn record_accessors() {
        let record = Record {
            id: 4,
            values: vec![
                ("name".into(), "Ravi".into()),
                ("owner_email".into(), "a@x".into()),
            ],
        };
        assert_eq!(record.get("name"), Some("Ravi"));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.owner(), "a@x");
        assert_eq!(record.keys().collect::<Vec<_>>(), ["name", "owner_email"]);
        assert_eq!(record.into_map().get("name").map(String::as_str), Some("Ravi"));
    }

    #[test]
    fn sqlite_values_render_as_text() {
        assert_eq!(value_to_string(ValueRef::Null), "");
        assert_eq!(value_to_string(ValueRef::Integer(12)), "12");
        assert_eq!(value_to_string(ValueRef::Text(b"Chennai")), "Chennai");
    }

    #[test]
    fn page_cursor_is_an_offset() {
        assert_eq!(PageRequest::new(0).limit, 1);
        assert_eq!(PageRequest::new(5).offset().expect("offset"), 0);
        assert_eq!(
            PageRequest::new(5).with_cursor("10").offset().expect("offset"),
            10
        );
        assert!(PageRequest::new(5).with_cursor("abc").offset().is_err());
    }
}
