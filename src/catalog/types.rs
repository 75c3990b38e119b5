use serde::{Deserialize, Serialize};

/// Storage class of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Integer,
}

impl FieldKind {
    /// Column type keyword used in `CREATE TABLE`.
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Integer => "INTEGER",
        }
    }

    /// Derives the storage class from the key alone. Renaming a key can
    /// therefore change its column type.
    pub fn infer(key: &str) -> FieldKind {
        if key.contains("notify") || key == "sno" || key == "prefix" {
            FieldKind::Integer
        } else {
            FieldKind::Text
        }
    }
}

/// One entry of the field catalog. Persisted as a `[key, label]` pair; the
/// kind is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
}

impl FieldDefinition {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    pub fn kind(&self) -> FieldKind {
        FieldKind::infer(&self.key)
    }
}

impl From<(String, String)> for FieldDefinition {
    fn from((key, label): (String, String)) -> Self {
        Self { key, label }
    }
}

impl From<FieldDefinition> for (String, String) {
    fn from(field: FieldDefinition) -> Self {
        (field.key, field.label)
    }
}
