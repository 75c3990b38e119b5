use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Record,
    Field,
    Table,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Record => write!(f, "record"),
            ResourceType::Field => write!(f, "field"),
            ResourceType::Table => write!(f, "table"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    Storage,
    RecordNotFound,
    FieldNotFound,
    TableNotFound,
    PermissionDenied,
    QuotaExceeded,
    SchemaMigration,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Io => "io",
            ErrorCode::Encode => "encode",
            ErrorCode::Decode => "decode",
            ErrorCode::Validation => "validation",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::Storage => "storage",
            ErrorCode::RecordNotFound => "record_not_found",
            ErrorCode::FieldNotFound => "field_not_found",
            ErrorCode::TableNotFound => "table_not_found",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::QuotaExceeded => "quota_exceeded",
            ErrorCode::SchemaMigration => "schema_migration",
        }
    }
}

#[derive(Debug, Error)]
pub enum FieldStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("quota exceeded: '{owner}' already owns the maximum of {limit} records")]
    QuotaExceeded { owner: String, limit: usize },
    #[error("schema migration failed: {message}")]
    SchemaMigration { message: String },
}

impl From<rusqlite::Error> for FieldStoreError {
    fn from(err: rusqlite::Error) -> Self {
        FieldStoreError::Storage(err.to_string())
    }
}

impl FieldStoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FieldStoreError::Io(_) => ErrorCode::Io,
            FieldStoreError::Encode(_) => ErrorCode::Encode,
            FieldStoreError::Decode(_) => ErrorCode::Decode,
            FieldStoreError::Validation(_) => ErrorCode::Validation,
            FieldStoreError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            FieldStoreError::Storage(_) => ErrorCode::Storage,
            FieldStoreError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Record => ErrorCode::RecordNotFound,
                ResourceType::Field => ErrorCode::FieldNotFound,
                ResourceType::Table => ErrorCode::TableNotFound,
            },
            FieldStoreError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            FieldStoreError::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            FieldStoreError::SchemaMigration { .. } => ErrorCode::SchemaMigration,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Only a failed reconciliation stops the process; everything else is
    /// reported to the caller and leaves stored state untouched.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FieldStoreError::SchemaMigration { .. })
    }

    pub(crate) fn record_not_found(id: i64) -> Self {
        FieldStoreError::NotFound {
            resource_type: ResourceType::Record,
            resource_id: id.to_string(),
        }
    }

    pub(crate) fn migration(err: impl std::fmt::Display) -> Self {
        FieldStoreError::SchemaMigration {
            message: err.to_string(),
        }
    }
}
