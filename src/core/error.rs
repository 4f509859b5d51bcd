use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RwcError {
    #[error("Default read/write concern commands are not supported on a standalone node")]
    RegistryUnsupportedOnStandalone,

    #[error("Default read/write concern commands are not supported on shard nodes; run them against a router or the config server")]
    RegistryUnsupportedOnShardMember,

    #[error("Not writable primary: {0}")]
    NotWritable(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Illegal operation: {0}")]
    IllegalState(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("No such command: '{0}'")]
    CommandNotFound(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, RwcError>;

impl RwcError {
    /// Numeric code reported at the command boundary.
    pub fn code(&self) -> i32 {
        match self {
            Self::RegistryUnsupportedOnStandalone => 51300,
            Self::RegistryUnsupportedOnShardMember => 51301,
            Self::NotWritable(_) => 10107,
            Self::TypeMismatch(_) => 14,
            Self::MissingArgument(_) | Self::InvalidValue(_) => 2,
            Self::ParseError(_) => 9,
            Self::IllegalState(_) => 20,
            Self::PersistenceUnavailable(_) => 64,
            Self::CommandNotFound(_) => 59,
            Self::ExecutionError(_) | Self::LockError(_) | Self::IoError(_) => 1,
        }
    }

    /// Stable name of the error identity.
    pub fn code_name(&self) -> &'static str {
        match self {
            Self::RegistryUnsupportedOnStandalone => "RegistryUnsupportedOnStandalone",
            Self::RegistryUnsupportedOnShardMember => "RegistryUnsupportedOnShardMember",
            Self::NotWritable(_) => "NotWritablePrimary",
            Self::TypeMismatch(_) => "TypeMismatch",
            Self::MissingArgument(_) => "MissingArgument",
            Self::InvalidValue(_) => "BadValue",
            Self::ParseError(_) => "FailedToParse",
            Self::IllegalState(_) => "IllegalOperation",
            Self::PersistenceUnavailable(_) => "WriteConcernFailed",
            Self::CommandNotFound(_) => "CommandNotFound",
            Self::ExecutionError(_) | Self::LockError(_) | Self::IoError(_) => "InternalError",
        }
    }

    /// Only a durable write that missed its durability contract may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch(_)
                | Self::MissingArgument(_)
                | Self::InvalidValue(_)
                | Self::ParseError(_)
                | Self::IllegalState(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for RwcError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for RwcError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
