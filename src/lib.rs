pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod migration;
pub mod permission;
pub mod query;
pub mod repository;

use crate::catalog::{CatalogEdit, CatalogStore, FieldCatalog};
use crate::config::{FieldStoreConfig, RecordLocation, validate_config};
use crate::error::FieldStoreError;
use crate::migration::{
    MigrationAction, MigrationReport, TableLayout, ensure_schema, live_columns, plan_migration,
};
use crate::repository::{RecordId, RecordStore};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Creates a directory with restrictive permissions (0o700 on Unix); the
/// catalog and the record database both live in it.
fn create_private_dir_all(path: &Path) -> Result<(), FieldStoreError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
        if !fs::metadata(path)?.is_dir() {
            return Err(FieldStoreError::Validation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    TableCreated {
        table_name: String,
    },
    /// Destructive rebuild after the catalog diverged. Distinct from record
    /// deletion: nobody asked for these rows to go.
    TableRebuilt {
        table_name: String,
        discarded_rows: u64,
        dropped_columns: Vec<String>,
        added_columns: Vec<String>,
    },
    CatalogEdited {
        edit: CatalogEdit,
    },
    RecordCreated {
        record_id: RecordId,
        owner: String,
    },
    RecordUpdated {
        record_id: RecordId,
        actor: String,
    },
    RecordDeleted {
        record_id: RecordId,
        actor: String,
    },
}

pub trait LifecycleHook: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

#[derive(Default)]
pub(crate) struct HookRegistry {
    hooks: Mutex<Vec<Arc<dyn LifecycleHook>>>,
}

impl HookRegistry {
    /// Runs after the change has committed. A panicking hook is logged and
    /// skipped.
    pub(crate) fn dispatch(&self, event: LifecycleEvent) {
        let hooks = self.hooks.lock().clone();
        for hook in &hooks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.on_event(&event)))
                .is_err()
            {
                warn!("lifecycle hook panicked while handling event");
            }
        }
    }
}

/// Outcome of [`FieldStore::edit_catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReport {
    pub catalog: FieldCatalog,
    pub migration: MigrationReport,
}

pub struct FieldStore {
    config: FieldStoreConfig,
    dir: PathBuf,
    conn: Arc<Mutex<Connection>>,
    catalog: CatalogStore,
    records: RecordStore,
    hooks: Arc<HookRegistry>,
    startup_migration: MigrationReport,
}

impl FieldStore {
    /// Opens the store under `dir` and reconciles the record table with the
    /// current catalog. A reconciliation failure is returned as
    /// [`FieldStoreError::SchemaMigration`] and the store is not usable.
    pub fn open(config: FieldStoreConfig, dir: &Path) -> Result<Self, FieldStoreError> {
        validate_config(&config)?;
        create_private_dir_all(dir)?;
        info!(
            data_dir = %dir.display(),
            table = %config.table_name,
            max_items_per_owner = config.max_items_per_owner,
            required_field = %config.required_field,
            sequence_field = %config.sequence_field,
            journal_mode = ?config.journal_mode,
            "opening field store"
        );

        let conn = open_connection(&config, dir).map_err(FieldStoreError::migration)?;
        let catalog = CatalogStore::new(config.catalog_path(dir));
        let hooks = Arc::new(HookRegistry::default());
        let conn = Arc::new(Mutex::new(conn));
        let records = RecordStore::new(conn.clone(), catalog.clone(), &config, hooks.clone());
        let catalog_now = catalog.load().map_err(FieldStoreError::migration)?;
        let startup_migration = {
            let mut guard = conn.lock();
            ensure_schema(&mut guard, &config.table_name, &catalog_now)?
        };
        Ok(Self {
            config,
            dir: dir.to_path_buf(),
            conn,
            catalog,
            records,
            hooks,
            startup_migration,
        })
    }

    /// What reconciliation did while the store was opening.
    pub fn startup_migration(&self) -> &MigrationReport {
        &self.startup_migration
    }

    pub fn config(&self) -> &FieldStoreConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn load_catalog(&self) -> Result<FieldCatalog, FieldStoreError> {
        self.catalog.load()
    }

    /// Brings the record table in line with the persisted catalog. Any
    /// divergence drops and recreates the table, discarding every record.
    pub fn ensure_schema(&self) -> Result<MigrationReport, FieldStoreError> {
        let report = self.reconcile()?;
        self.announce(&report);
        Ok(report)
    }

    fn reconcile(&self) -> Result<MigrationReport, FieldStoreError> {
        let catalog = self.catalog.load().map_err(FieldStoreError::migration)?;
        let mut conn = self.conn.lock();
        ensure_schema(&mut conn, &self.config.table_name, &catalog)
    }

    fn announce(&self, report: &MigrationReport) {
        match &report.action {
            MigrationAction::Unchanged => {}
            MigrationAction::Create => self.hooks.dispatch(LifecycleEvent::TableCreated {
                table_name: report.table_name.clone(),
            }),
            MigrationAction::Rebuild {
                dropped_columns,
                added_columns,
            } => self.hooks.dispatch(LifecycleEvent::TableRebuilt {
                table_name: report.table_name.clone(),
                discarded_rows: report.discarded_rows,
                dropped_columns: dropped_columns.clone(),
                added_columns: added_columns.clone(),
            }),
        }
    }

    /// What [`FieldStore::ensure_schema`] would do right now, without doing it.
    pub fn pending_migration(&self) -> Result<MigrationAction, FieldStoreError> {
        let catalog = self.catalog.load()?;
        let layout = TableLayout::from_catalog(&self.config.table_name, &catalog);
        let conn = self.conn.lock();
        let live = live_columns(&conn, &self.config.table_name)?;
        Ok(plan_migration(live.as_deref(), &layout))
    }

    /// Persists `edit`, then reconciles. Edits that change keys or their
    /// order discard every record. If reconciliation fails the previous
    /// catalog file is put back and the table is left as it was.
    pub fn edit_catalog(&self, edit: CatalogEdit) -> Result<EditReport, FieldStoreError> {
        let previous = if self.catalog.exists() {
            Some(self.catalog.load()?)
        } else {
            None
        };
        let catalog = self.catalog.apply(edit.clone())?;
        let migration = match self.reconcile() {
            Ok(migration) => migration,
            Err(err) => {
                warn!(
                    edit = ?edit,
                    error = %err,
                    "reconciliation failed; restoring previous field catalog"
                );
                self.catalog.restore(previous.as_ref())?;
                return Err(err);
            }
        };
        self.hooks.dispatch(LifecycleEvent::CatalogEdited { edit });
        self.announce(&migration);
        Ok(EditReport { catalog, migration })
    }

    pub fn add_lifecycle_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.hooks.lock().push(hook);
    }

    pub fn remove_lifecycle_hook(&self, hook: &Arc<dyn LifecycleHook>) {
        let mut hooks = self.hooks.hooks.lock();
        hooks.retain(|existing| !Arc::ptr_eq(existing, hook));
    }
}

fn open_connection(config: &FieldStoreConfig, dir: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = match &config.records {
        RecordLocation::File(_) => match config.database_path(dir) {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        },
        RecordLocation::InMemory => Connection::open_in_memory()?,
    };
    if matches!(config.records, RecordLocation::File(_)) {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            config.journal_mode.pragma_value()
        ))?;
    }
    conn.execute_batch("PRAGMA case_sensitive_like = OFF;")?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(conn)
}
