use firm_types::TypeError;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested path or block does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The destination of a create or copy is already occupied.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A path component that must be a directory is a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A directory was targeted by an operation that needs `recursive`
    /// or expects a file.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// A CAR bundle could not be parsed or failed verification.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// A block could not be decoded as dag-pb or UnixFS.
    #[error("corrupt block {cid}: {reason}")]
    CorruptBlock { cid: String, reason: String },

    /// The remote store answered with an error.
    #[error("remote store error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The remote store could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
