use smol_str::SmolStr;
use van_common::config::ConfigStoreError;
use van_common::error::{ClientError, DecodeError};

use crate::entity::EntityType;

/// Error type for client operations
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// Transport, service or decoding failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    /// Loading or saving a profile failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] ConfigStoreError),

    /// Caller misuse, rejected before any request is made
    #[error("invalid argument: {0}")]
    #[diagnostic(code(van::invalid_argument))]
    InvalidArgument(SmolStr),

    /// The service does not know the entity being hydrated
    #[error("{kind} {id} not found")]
    #[diagnostic(
        code(van::not_found),
        help("the entity stays unpopulated; accessing it again retries the fetch")
    )]
    NotFound {
        /// Entity type
        kind: EntityType,
        /// Identifier that was rejected
        id: SmolStr,
    },

    /// A payload lacks a field the operation depends on
    #[error("{kind} payload has no `{field}`")]
    #[diagnostic(code(van::missing_field))]
    MissingField {
        /// Entity type
        kind: EntityType,
        /// Missing field
        field: &'static str,
    },

    /// The `Van` this object was created by has been dropped
    #[error("client context was dropped")]
    #[diagnostic(code(van::detached))]
    Detached,
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<SmolStr>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Whether a retry could succeed: the network failed, not the request.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Client(e) if e.is_network())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Client(ClientError::from(e))
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Client(ClientError::Decode(e))
    }
}

/// Result type for client operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
