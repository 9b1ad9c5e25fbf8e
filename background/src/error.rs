use thiserror::Error;
use wallet_keyring::KeyringError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to a port as `{ id, error }`.
///
/// `Clone` so a rejection can be handed to the waiting caller through its
/// responder channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Unable to find request")]
    RequestNotFound,

    #[error("Request {0} already exists")]
    DuplicateRequest(String),

    #[error("Invalid url {0}, expected to start with http: or https: or ipfs: or ipns:")]
    InvalidUrl(String),

    #[error("Unable to handle message of type {0}")]
    UnhandledMessage(String),

    #[error("Message {0} is not allowed from this port")]
    WrongPort(String),

    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    #[error("Unable to find pair")]
    PairNotFound,

    #[error("Password needed to unlock the account")]
    PasswordNeeded,

    #[error("oldPass is invalid")]
    InvalidOldPassword,

    #[error("invalid password")]
    InvalidPassword,

    #[error("\"{0}\" is not a valid derivation path")]
    InvalidDerivationPath(String),

    #[error("Rejected")]
    Rejected,

    #[error("Cancelled")]
    Cancelled,

    #[error("The source {0} is not allowed to interact with this extension")]
    SourceNotAllowed(String),

    #[error("The source {0} has a pending authorization request")]
    AuthorizationPending(String),

    #[error("The source {0} has not been enabled yet")]
    SourceNotEnabled(String),

    #[error("Account {0} is not authorized for {1}")]
    AccountNotAuthorized(String, String),

    #[error("Unknown metadata for chain {0}")]
    MetadataNotFound(String),

    #[error("Unable to encode payload: {0}")]
    Encoding(String),

    /// The request was dropped without an answer (authorize.ignore)
    #[error("Request dismissed")]
    Dismissed,

    #[error("{0}")]
    Keyring(#[from] KeyringError),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidPayload(e.to_string())
    }
}
