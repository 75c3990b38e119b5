use crate::catalog::normalize_key;
use crate::catalog::schema::{CatalogEdit, FieldCatalog};
use crate::catalog::types::FieldDefinition;
use crate::error::FieldStoreError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// File-backed field catalog. Every edit re-reads the file, applies the
/// change and writes the whole catalog back before returning.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted catalog, or the built-in default when none has
    /// been saved yet.
    pub fn load(&self) -> Result<FieldCatalog, FieldStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FieldCatalog::default()),
            Err(err) => return Err(err.into()),
        };
        let pairs: Vec<(String, String)> =
            serde_json::from_slice(&bytes).map_err(|e| FieldStoreError::Decode(e.to_string()))?;
        let fields = pairs
            .into_iter()
            .map(|(key, label)| FieldDefinition::new(normalize_key(&key), label))
            .collect();
        FieldCatalog::new(fields).map_err(|e| {
            FieldStoreError::Decode(format!("catalog {}: {e}", self.path.display()))
        })
    }

    /// Replaces the persisted catalog. Readers see either the old or the new
    /// file, never a partial write.
    pub fn save(&self, catalog: &FieldCatalog) -> Result<(), FieldStoreError> {
        catalog.validate()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let bytes =
            serde_json::to_vec_pretty(catalog).map_err(|e| FieldStoreError::Encode(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| FieldStoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Puts back a catalog captured before an edit. `None` means no file
    /// existed, so the file is removed and loads fall back to the default.
    pub fn restore(&self, previous: Option<&FieldCatalog>) -> Result<(), FieldStoreError> {
        match previous {
            Some(catalog) => self.save(catalog),
            None => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            },
        }
    }

    pub fn apply(&self, edit: CatalogEdit) -> Result<FieldCatalog, FieldStoreError> {
        let mut catalog = self.load()?;
        catalog.apply(edit.clone())?;
        self.save(&catalog)?;
        info!(edit = ?edit, fields = catalog.len(), "field catalog updated");
        Ok(catalog)
    }

    pub fn append(
        &self,
        key: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<FieldCatalog, FieldStoreError> {
        self.apply(CatalogEdit::Append {
            key: key.into(),
            label: label.into(),
        })
    }

    pub fn insert_at(
        &self,
        position: usize,
        key: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<FieldCatalog, FieldStoreError> {
        self.apply(CatalogEdit::InsertAt {
            position,
            key: key.into(),
            label: label.into(),
        })
    }

    pub fn rename_label(
        &self,
        index: usize,
        label: impl Into<String>,
    ) -> Result<FieldCatalog, FieldStoreError> {
        self.apply(CatalogEdit::RenameLabel {
            index,
            label: label.into(),
        })
    }

    pub fn remove(&self, index: usize) -> Result<FieldCatalog, FieldStoreError> {
        self.apply(CatalogEdit::Remove { index })
    }

    pub fn move_up(&self, index: usize) -> Result<FieldCatalog, FieldStoreError> {
        self.apply(CatalogEdit::MoveUp { index })
    }

    pub fn move_down(&self, index: usize) -> Result<FieldCatalog, FieldStoreError> {
        self.apply(CatalogEdit::MoveDown { index })
    }
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> Result<(), FieldStoreError> {
    let dir = fs::File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> Result<(), FieldStoreError> {
    Ok(())
}
