use platforms::PlatformError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not open database: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("no project found for {0}")]
    NotFound(String),

    #[error("upstream unavailable, try again later: {0}")]
    Unavailable(PlatformError),

    #[error("upstream error: {0}")]
    Upstream(PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PlatformError> for RegistryError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound { identifier, .. } => RegistryError::NotFound(identifier),
            err @ PlatformError::Unavailable { .. } => RegistryError::Unavailable(err),
            err => RegistryError::Upstream(err),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("tenant {tenant_id} already tracks the maximum of {max} projects")]
    QuotaExceeded { tenant_id: String, max: u32 },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    #[error("changelog length must be between {min} and {max}, got {value}")]
    ChangelogLengthOutOfRange { value: u32, min: u32, max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
