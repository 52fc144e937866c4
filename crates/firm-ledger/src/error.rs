use firm_types::{Address, TypeError};

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The node answered a JSON-RPC call with an error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A log could not be decoded as the expected event.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// No account is available to send from.
    #[error("no sender account available")]
    NoSender,

    /// A contract expected at an address has no code.
    #[error("no contract at {0}")]
    ContractMissing(Address),

    /// The factory has no code and no deployment transaction is configured.
    #[error("factory {0} is not deployed and no deployment transaction is configured")]
    FactoryUnavailable(Address),

    #[error("call data too short for a factory deployment: {0} bytes")]
    InvalidCallData(usize),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
