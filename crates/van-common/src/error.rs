//! Error types for transport operations

use bytes::Bytes;
use smol_str::SmolStr;

/// Client error type wrapping all possible error conditions of a transport call
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// Network-level failure, reported after retries were exhausted
    #[error("network error: {0}")]
    Network(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// Request parameters could not be encoded
    #[error("{0}")]
    Encode(
        #[from]
        #[diagnostic_source]
        EncodeError,
    ),

    /// Response deserialization failed
    #[error("{0}")]
    Decode(
        #[from]
        #[diagnostic_source]
        DecodeError,
    ),

    /// The service answered with a non-success status
    #[error("{0}")]
    Api(
        #[from]
        #[diagnostic_source]
        ApiError,
    ),
}

impl ClientError {
    /// Whether this error came from the network rather than the service.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// The service's error response, if that is what this is.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(api) => Some(api),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(DecodeError::Json(e))
    }
}

/// Transport-level errors that occur during HTTP communication
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// Failed to establish connection to server
    #[error("Connection error: {0}")]
    Connect(String),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Request construction failed (malformed URI, headers, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other transport error
    #[error("Transport error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Request encoding errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EncodeError {
    /// Form or query string serialization failed
    #[error("Failed to encode request parameters: {0}")]
    #[diagnostic(code(van::encode::form))]
    Form(String),
}

/// Response deserialization errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DecodeError {
    /// JSON deserialization failed
    #[error("Failed to deserialize JSON: {0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),

    /// The JSON was valid but not the shape the endpoint promises
    #[error("Unexpected response shape: expected {expected}")]
    #[diagnostic(code(van::decode::shape))]
    Shape {
        /// What the caller expected to find
        expected: &'static str,
    },
}

/// Error response returned by the service
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[diagnostic(code(van::api))]
pub struct ApiError {
    /// HTTP status code
    pub status: http::StatusCode,
    /// Endpoint the request was sent to
    pub endpoint: SmolStr,
    /// The `error` field of the response payload, if it had one
    pub message: Option<SmolStr>,
    /// Raw response body
    pub body: Option<Bytes>,
}

impl ApiError {
    /// Build an error from a failed response body.
    ///
    /// The service reports failures as `{"request": "...", "error": "..."}`.
    pub fn from_body(status: http::StatusCode, endpoint: &str, body: Bytes) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(SmolStr::from));
        Self {
            status,
            endpoint: endpoint.into(),
            message,
            body: Some(body),
        }
    }

    /// Whether the service rejected the addressed object as nonexistent
    pub fn is_not_found(&self) -> bool {
        self.status == http::StatusCode::NOT_FOUND
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} from {}", self.status, self.endpoint)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        } else if let Some(body) = &self.body {
            if let Ok(s) = std::str::from_utf8(body) {
                write!(f, ":\n{}", s)?;
            }
        }
        Ok(())
    }
}

/// Result type for transport operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_reads_error_field() {
        let body = Bytes::from_static(br#"{"request":"/users/show.json","error":"no such user"}"#);
        let err = ApiError::from_body(http::StatusCode::NOT_FOUND, "users/show", body);

        assert!(err.is_not_found());
        assert_eq!(err.message.as_deref(), Some("no such user"));
        assert_eq!(err.to_string(), "HTTP 404 Not Found from users/show: no such user");
    }

    #[test]
    fn api_error_falls_back_to_body() {
        let body = Bytes::from_static(b"bad gateway");
        let err = ApiError::from_body(http::StatusCode::BAD_GATEWAY, "statuses/mentions", body);

        assert!(err.message.is_none());
        assert!(err.to_string().ends_with("bad gateway"));
    }
}
