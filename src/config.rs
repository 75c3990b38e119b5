use crate::catalog::validate_key;
use crate::error::FieldStoreError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Wal,
    Delete,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLocation {
    /// Database file, relative to the data directory unless absolute.
    File(PathBuf),
    InMemory,
}

/// Runtime configuration for a field store.
#[derive(Debug, Clone)]
pub struct FieldStoreConfig {
    pub catalog_file: PathBuf,
    pub records: RecordLocation,
    pub table_name: String,
    pub max_items_per_owner: usize,
    /// Field that must be non-empty on create.
    pub required_field: String,
    /// Field the record listing is sorted by.
    pub sequence_field: String,
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
}

impl Default for FieldStoreConfig {
    fn default() -> Self {
        Self {
            catalog_file: PathBuf::from("fields.json"),
            records: RecordLocation::File(PathBuf::from("records.db")),
            table_name: "records".to_string(),
            max_items_per_owner: 30,
            required_field: "name".to_string(),
            sequence_field: "sno".to_string(),
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl FieldStoreConfig {
    pub fn development() -> Self {
        Self {
            journal_mode: JournalMode::Delete,
            ..Self::default()
        }
    }

    /// Records live only as long as the store; the catalog is still persisted.
    pub fn in_memory() -> Self {
        Self {
            records: RecordLocation::InMemory,
            journal_mode: JournalMode::Delete,
            ..Self::default()
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_max_items_per_owner(mut self, max_items: usize) -> Self {
        self.max_items_per_owner = max_items;
        self
    }

    pub fn with_required_field(mut self, field: impl Into<String>) -> Self {
        self.required_field = field.into();
        self
    }

    pub fn with_sequence_field(mut self, field: impl Into<String>) -> Self {
        self.sequence_field = field.into();
        self
    }

    pub fn catalog_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.catalog_file)
    }

    pub fn database_path(&self, data_dir: &Path) -> Option<PathBuf> {
        match &self.records {
            RecordLocation::File(file) => Some(data_dir.join(file)),
            RecordLocation::InMemory => None,
        }
    }
}

pub fn validate_config(config: &FieldStoreConfig) -> Result<(), FieldStoreError> {
    if config.max_items_per_owner == 0 {
        return Err(FieldStoreError::InvalidConfig {
            message: "max_items_per_owner must be > 0".into(),
        });
    }
    for (name, value) in [
        ("table_name", &config.table_name),
        ("required_field", &config.required_field),
        ("sequence_field", &config.sequence_field),
    ] {
        if !validate_key(value) {
            return Err(FieldStoreError::InvalidConfig {
                message: format!("{name} '{value}' is not a valid identifier"),
            });
        }
    }
    if config.catalog_file.as_os_str().is_empty() {
        return Err(FieldStoreError::InvalidConfig {
            message: "catalog_file must not be empty".into(),
        });
    }
    Ok(())
}
