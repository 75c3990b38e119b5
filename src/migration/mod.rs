use crate::catalog::{FieldCatalog, FieldKind, ID_COLUMN};
use crate::error::FieldStoreError;
use crate::query::planner::quote_ident;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Physical layout derived from a catalog: the surrogate identifier followed
/// by one column per field, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableLayout {
    pub fn from_catalog(table_name: &str, catalog: &FieldCatalog) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: catalog
                .fields()
                .iter()
                .map(|f| ColumnDef {
                    name: f.key.clone(),
                    kind: f.kind(),
                })
                .collect(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn create_table_sql(&self) -> Result<String, FieldStoreError> {
        let mut cols = vec![format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(ID_COLUMN)?
        )];
        for column in &self.columns {
            cols.push(format!(
                "{} {}",
                quote_ident(&column.name)?,
                column.kind.sql_type()
            ));
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table_name)?,
            cols.join(", ")
        ))
    }

    pub fn drop_table_sql(&self) -> Result<String, FieldStoreError> {
        Ok(format!("DROP TABLE {}", quote_ident(&self.table_name)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationAction {
    /// No table existed; one was created.
    Create,
    /// Live columns already equal the catalog keys, in order.
    Unchanged,
    /// Columns diverged; the table was dropped and recreated empty. Both lists
    /// are empty when only the order changed.
    Rebuild {
        dropped_columns: Vec<String>,
        added_columns: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub table_name: String,
    pub action: MigrationAction,
    /// Rows destroyed by a rebuild.
    pub discarded_rows: u64,
    pub columns: Vec<String>,
}

impl MigrationReport {
    pub fn is_destructive(&self) -> bool {
        matches!(self.action, MigrationAction::Rebuild { .. })
    }
}

/// Data columns of the live table (identifier excluded), or `None` when the
/// table does not exist. A table whose first column is not the identifier is
/// reported with that column included so it never matches a catalog.
pub fn live_columns(
    conn: &Connection,
    table_name: &str,
) -> Result<Option<Vec<String>>, FieldStoreError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table_name)?))?;
    let mut names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if names.first().map(String::as_str) == Some(ID_COLUMN) {
        names.remove(0);
    }
    Ok(Some(names))
}

/// Decides what reconciliation has to do. Any difference in names or order
/// is a rebuild.
pub fn plan_migration(live: Option<&[String]>, layout: &TableLayout) -> MigrationAction {
    let wanted = layout.column_names();
    match live {
        None => MigrationAction::Create,
        Some(live) if live == wanted.as_slice() => MigrationAction::Unchanged,
        Some(live) => MigrationAction::Rebuild {
            dropped_columns: live
                .iter()
                .filter(|c| !wanted.contains(c))
                .cloned()
                .collect(),
            added_columns: wanted
                .iter()
                .filter(|c| !live.contains(c))
                .cloned()
                .collect(),
        },
    }
}

/// Makes the live table match `catalog`. Runs as one transaction: either the
/// table ends up shaped like the catalog or nothing changes. Any failure is a
/// [`FieldStoreError::SchemaMigration`].
pub fn ensure_schema(
    conn: &mut Connection,
    table_name: &str,
    catalog: &FieldCatalog,
) -> Result<MigrationReport, FieldStoreError> {
    reconcile(conn, table_name, catalog).map_err(|e| match e {
        FieldStoreError::SchemaMigration { .. } => e,
        other => FieldStoreError::migration(format!("table '{table_name}': {other}")),
    })
}

fn reconcile(
    conn: &mut Connection,
    table_name: &str,
    catalog: &FieldCatalog,
) -> Result<MigrationReport, FieldStoreError> {
    catalog.validate()?;
    let layout = TableLayout::from_catalog(table_name, catalog);
    let tx = conn.transaction()?;
    let live = live_columns(&tx, table_name)?;
    let action = plan_migration(live.as_deref(), &layout);
    let mut discarded_rows = 0u64;

    match &action {
        MigrationAction::Unchanged => {}
        MigrationAction::Create => {
            tx.execute_batch(&layout.create_table_sql()?)?;
            info!(
                table = table_name,
                columns = layout.columns.len(),
                "created record table"
            );
        }
        MigrationAction::Rebuild {
            dropped_columns,
            added_columns,
        } => {
            discarded_rows = tx.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(table_name)?),
                [],
                |row| row.get::<_, i64>(0),
            )? as u64;
            tx.execute_batch(&layout.drop_table_sql()?)?;
            tx.execute_batch(&layout.create_table_sql()?)?;
            warn!(
                table = table_name,
                discarded_rows,
                dropped_columns = ?dropped_columns,
                added_columns = ?added_columns,
                "field catalog diverged from record table; table rebuilt and all records discarded"
            );
        }
    }
    tx.commit()?;

    Ok(MigrationReport {
        table_name: table_name.to_string(),
        action,
        discarded_rows,
        columns: layout.column_names(),
    })
}

/// Fails unless the live table already matches `catalog`. Record operations
/// call this so they never run against an unreconciled table.
pub fn verify_layout(
    conn: &Connection,
    table_name: &str,
    catalog: &FieldCatalog,
) -> Result<(), FieldStoreError> {
    let layout = TableLayout::from_catalog(table_name, catalog);
    match plan_migration(live_columns(conn, table_name)?.as_deref(), &layout) {
        MigrationAction::Unchanged => Ok(()),
        MigrationAction::Create => Err(FieldStoreError::migration(format!(
            "table '{table_name}' does not exist; reconcile the schema first"
        ))),
        MigrationAction::Rebuild { .. } => Err(FieldStoreError::migration(format!(
            "table '{table_name}' does not match the field catalog; reconcile the schema first"
        ))),
    }
}
