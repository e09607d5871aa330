//! Shared plumbing for the van Fanfou client: configuration, errors, and the
//! HTTP transport the client core talks through.

#![warn(missing_docs)]
pub use smol_str;
pub use url;

/// Client configuration and config stores.
pub mod config;
pub mod error;
/// HTTP client abstraction used by the transport.
pub mod http_client;
pub mod stream;
pub mod transport;

pub use config::{ClientConfig, ConfigStore, MAX_PAGE_SIZE};
pub use error::{ApiError, ClientError, ClientResult, DecodeError, EncodeError, TransportError};
pub use http_client::{HttpClient, HttpClientExt};
pub use stream::{ByteStream, StreamError};
pub use transport::{
    FilePart, HttpTransport, ParamValue, Params, RequestSigner, StreamingTransport, Transport,
    TransportOptions, Unsigned,
};
