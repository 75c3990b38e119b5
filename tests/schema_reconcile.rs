use fieldstore::catalog::{CatalogEdit, CatalogStore};
use fieldstore::config::FieldStoreConfig;
use fieldstore::error::ErrorCode;
use fieldstore::migration::MigrationAction;
use fieldstore::permission::{Principal, Role};
use fieldstore::repository::FieldValues;
use rusqlite::Connection;
use fieldstore::{FieldStore, LifecycleEvent, LifecycleHook};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Default)]
struct EventLog(Mutex<Vec<LifecycleEvent>>);

impl LifecycleHook for EventLog {
    fn on_event(&self, event: &LifecycleEvent) {
        self.0.lock().push(event.clone());
    }
}

fn owner() -> Principal {
    Principal::new("clerk@unit.example", Role::C, "Trichy")
}

fn named(name: &str) -> FieldValues {
    FieldValues::from([
        ("name".to_string(), name.to_string()),
        ("remarks".to_string(), "keep".to_string()),
    ])
}

#[test]
fn reopening_with_same_catalog_keeps_records() {
    let dir = tempdir().expect("temp dir");
    {
        let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("open");
        store.records().create(&owner(), &named("Kavya")).expect("create");
    }
    let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("reopen");
    let report = store.ensure_schema().expect("ensure");
    assert_eq!(report.action, MigrationAction::Unchanged);
    assert_eq!(report.discarded_rows, 0);
    let records = store.records().list(&owner(), "").expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("remarks"), Some("keep"));
}

#[test]
fn removing_a_field_discards_all_records() {
    let dir = tempdir().expect("temp dir");
    let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("open");
    let log = Arc::new(EventLog::default());
    store.add_lifecycle_hook(log.clone());
    store.records().create(&owner(), &named("Kavya")).expect("create");
    store.records().create(&owner(), &named("Meena")).expect("create");

    let remarks = store
        .load_catalog()
        .expect("catalog")
        .position("remarks")
        .expect("remarks field");
    let report = store
        .edit_catalog(CatalogEdit::Remove { index: remarks })
        .expect("remove");

    assert!(!report.catalog.contains("remarks"));
    assert_eq!(report.migration.discarded_rows, 2);
    assert_eq!(
        report.migration.action,
        MigrationAction::Rebuild {
            dropped_columns: vec!["remarks".into()],
            added_columns: vec![],
        }
    );
    assert!(store.records().list(&owner(), "").expect("list").is_empty());
    assert_eq!(store.records().owned_count(&owner()).expect("count"), 0);

    let events = log.0.lock().clone();
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::TableRebuilt {
            discarded_rows: 2,
            ..
        }
    )));
}

#[test]
fn new_field_is_available_after_rebuild() {
    let dir = tempdir().expect("temp dir");
    let store = FieldStore::open(FieldStoreConfig::in_memory(), dir.path()).expect("open");
    store
        .edit_catalog(CatalogEdit::InsertAt {
            position: 2,
            key: "posting".into(),
            label: "Posting".into(),
        })
        .expect("insert");

    let mut values = named("Arun");
    values.insert("posting".into(), "Coimbatore".into());
    let id = store.records().create(&owner(), &values).expect("create");
    let record = store.records().get(&owner(), id).expect("get");
    assert_eq!(record.get("posting"), Some("Coimbatore"));
    assert_eq!(record.keys().nth(2), Some("posting"));
    assert_eq!(store.records().list(&owner(), "coimbatore").expect("search").len(), 1);
}

#[test]
fn catalog_edited_out_of_band_blocks_record_operations() {
    let dir = tempdir().expect("temp dir");
    let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("open");
    store.records().create(&owner(), &named("Kavya")).expect("create");

    // Another process appends a field without reconciling.
    let side = CatalogStore::new(store.catalog().path());
    side.append("unit_code", "Unit Code").expect("append");

    let err = store.records().list(&owner(), "").expect_err("stale table");
    assert_eq!(err.code(), ErrorCode::SchemaMigration);
    assert!(err.is_fatal());
    let err = store
        .records()
        .create(&owner(), &named("Late"))
        .expect_err("stale table");
    assert_eq!(err.code(), ErrorCode::SchemaMigration);
    let err = store.records().owned_count(&owner()).expect_err("stale table");
    assert_eq!(err.code(), ErrorCode::SchemaMigration);

    assert_eq!(
        store.pending_migration().expect("status"),
        MigrationAction::Rebuild {
            dropped_columns: vec![],
            added_columns: vec!["unit_code".into()],
        }
    );
    let report = store.ensure_schema().expect("reconcile");
    assert_eq!(report.discarded_rows, 1);
    assert!(store.records().list(&owner(), "").expect("list").is_empty());
}

#[test]
fn label_changes_do_not_touch_the_table() {
    let dir = tempdir().expect("temp dir");
    let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("open");
    store.records().create(&owner(), &named("Kavya")).expect("create");
    let name = store
        .load_catalog()
        .expect("catalog")
        .position("name")
        .expect("name field");

    let report = store
        .edit_catalog(CatalogEdit::RenameLabel {
            index: name,
            label: "Full Name".into(),
        })
        .expect("rename");
    assert!(!report.migration.is_destructive());
    assert_eq!(
        report.catalog.get("name").map(|f| f.label.as_str()),
        Some("Full Name")
    );
    assert_eq!(store.records().list(&owner(), "").expect("list").len(), 1);
}

#[test]
fn rejected_edit_leaves_catalog_and_records_alone() {
    let dir = tempdir().expect("temp dir");
    let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("open");
    store.records().create(&owner(), &named("Kavya")).expect("create");
    let owner_idx = store
        .load_catalog()
        .expect("catalog")
        .position("owner_email")
        .expect("owner field");

    let err = store
        .edit_catalog(CatalogEdit::Remove { index: owner_idx })
        .expect_err("reserved");
    assert_eq!(err.code(), ErrorCode::Validation);
    let err = store
        .edit_catalog(CatalogEdit::MoveUp { index: 0 })
        .expect_err("boundary");
    assert_eq!(err.code(), ErrorCode::Validation);
    let err = store
        .edit_catalog(CatalogEdit::MoveDown { index: 999 })
        .expect_err("out of range");
    assert_eq!(err.code(), ErrorCode::FieldNotFound);

    assert!(!store.catalog().exists());
    assert_eq!(store.records().list(&owner(), "").expect("list").len(), 1);
}

#[test]
fn case_variant_keys_are_rejected_and_store_reopens() {
    let dir = tempdir().expect("temp dir");
    {
        let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("open");
        store.records().create(&owner(), &named("Kavya")).expect("create");
        for key in ["NAME", "ID"] {
            let err = store
                .edit_catalog(CatalogEdit::Append {
                    key: key.into(),
                    label: "Shadow".into(),
                })
                .expect_err("column name collides");
            assert_eq!(err.code(), ErrorCode::Validation);
        }
        assert!(!store.catalog().exists());
    }

    let store = FieldStore::open(FieldStoreConfig::development(), dir.path()).expect("reopen");
    assert_eq!(store.startup_migration().action, MigrationAction::Unchanged);
    assert_eq!(store.records().list(&owner(), "").expect("list").len(), 1);
}

#[test]
fn failed_reconciliation_restores_previous_catalog() {
    let dir = tempdir().expect("temp dir");
    let mut config = FieldStoreConfig::development();
    config.busy_timeout_ms = 10;
    let store = FieldStore::open(config.clone(), dir.path()).expect("open");
    store
        .edit_catalog(CatalogEdit::Append {
            key: "grade".into(),
            label: "Grade".into(),
        })
        .expect("append");
    let before = store.load_catalog().expect("catalog");
    let log = Arc::new(EventLog::default());
    store.add_lifecycle_hook(log.clone());

    let blocker = Connection::open(dir.path().join("records.db")).expect("second connection");
    blocker
        .execute_batch("BEGIN EXCLUSIVE;")
        .expect("hold write lock");
    let err = store
        .edit_catalog(CatalogEdit::Append {
            key: "unit".into(),
            label: "Unit".into(),
        })
        .expect_err("database is locked");
    assert!(err.is_fatal());
    assert_eq!(store.load_catalog().expect("catalog"), before);
    assert!(log.0.lock().is_empty());
    blocker.execute_batch("ROLLBACK;").expect("release lock");
    drop(blocker);
    drop(store);

    let store = FieldStore::open(config, dir.path()).expect("reopen");
    assert_eq!(store.startup_migration().action, MigrationAction::Unchanged);
    assert!(store.load_catalog().expect("catalog").contains("grade"));
    assert!(!store.load_catalog().expect("catalog").contains("unit"));
}
