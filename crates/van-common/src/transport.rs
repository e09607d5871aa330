//! The transport capability the client core is written against, and its
//! HTTP implementation.
//!
//! The core only ever needs two verbs: `get(endpoint, params)` and
//! `post(endpoint, data, files)`, both answering with a JSON document. Endpoints
//! are named the way the service names them (`statuses/home_timeline`,
//! `users/show`, ...).

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, Request};
use serde::ser::{Serialize, SerializeMap, Serializer};
use smol_str::SmolStr;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError, ClientResult, DecodeError, EncodeError, TransportError};
use crate::http_client::{HttpClient, HttpClientExt};
use crate::stream::{ByteStream, StreamError};

/// A single request parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// String parameter
    Str(SmolStr),
    /// Integer parameter
    Int(i64),
    /// Boolean parameter, sent as `true`/`false`
    Bool(bool),
}

impl ParamValue {
    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn to_text(&self) -> SmolStr {
        match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::Int(i) => SmolStr::from(i.to_string()),
            ParamValue::Bool(b) => SmolStr::new_static(if *b { "true" } else { "false" }),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Str(s) => serializer.serialize_str(s),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.into())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s.into())
    }
}

impl From<SmolStr> for ParamValue {
    fn from(s: SmolStr) -> Self {
        ParamValue::Str(s)
    }
}

impl From<&SmolStr> for ParamValue {
    fn from(s: &SmolStr) -> Self {
        ParamValue::Str(s.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Request parameters, kept sorted so encoded requests are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<SmolStr, ParamValue>);

impl Params {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any previous value for the key.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a parameter only when there is a value for it.
    pub fn maybe<V: Into<ParamValue>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    /// Insert a parameter in place.
    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Fill in every default whose key is not already present.
    pub fn merge_defaults(&mut self, defaults: &Params) {
        for (key, value) in &defaults.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Look up a string parameter.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    /// Look up an integer parameter.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ParamValue::as_int)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode as `application/x-www-form-urlencoded`.
    pub fn to_form(&self) -> Result<String, EncodeError> {
        serde_html_form::to_string(self).map_err(|e| EncodeError::Form(e.to_string()))
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key.as_str(), value)?;
        }
        map.end()
    }
}

/// A file uploaded alongside a POST.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilePart {
    /// Form field name, e.g. `photo`
    pub field: SmolStr,
    /// File name reported to the server
    pub file_name: SmolStr,
    /// MIME type of the content
    pub content_type: SmolStr,
    /// File content
    pub bytes: Bytes,
}

impl FilePart {
    /// A file part with a generic binary content type.
    pub fn new(field: impl Into<SmolStr>, file_name: impl Into<SmolStr>, bytes: Bytes) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: SmolStr::new_static("application/octet-stream"),
            bytes,
        }
    }

    /// Override the content type.
    pub fn content_type(mut self, content_type: impl Into<SmolStr>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Everything the client core needs from the network.
///
/// Implementations own retries and timeouts; a returned error is final.
pub trait Transport: Send + Sync {
    /// Fetch `endpoint` with query parameters.
    fn get(
        &self,
        endpoint: &str,
        params: &Params,
    ) -> impl Future<Output = ClientResult<serde_json::Value>> + Send;

    /// Post form data, plus optional file uploads, to `endpoint`.
    fn post(
        &self,
        endpoint: &str,
        data: &Params,
        files: &[FilePart],
    ) -> impl Future<Output = ClientResult<serde_json::Value>> + Send;
}

/// A transport that can also open the long-lived event stream.
pub trait StreamingTransport: Transport {
    /// Open the event stream and hand back its body.
    fn open_stream(&self) -> impl Future<Output = ClientResult<ByteStream>> + Send;
}

/// Produces the `Authorization` header for an outgoing request.
///
/// Obtaining the credentials (PIN, xAuth or browser flows) happens elsewhere;
/// a signer only turns them into a header. `params` holds the parameters that
/// take part in the signature: the query for a GET, the form for a plain POST,
/// and nothing for a multipart upload.
pub trait RequestSigner: Send + Sync {
    /// Header value for the request, or `None` to send it unsigned.
    fn authorization(
        &self,
        method: &Method,
        url: &Url,
        params: &Params,
    ) -> Result<Option<HeaderValue>, TransportError>;
}

/// Signer that leaves requests unsigned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsigned;

impl RequestSigner for Unsigned {
    fn authorization(
        &self,
        _method: &Method,
        _url: &Url,
        _params: &Params,
    ) -> Result<Option<HeaderValue>, TransportError> {
        Ok(None)
    }
}

/// Retry and encoding behaviour of an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Pause before the first retry
    pub retry_delay: Duration,
    /// Growth of timeout and delay after each failure
    pub retry_backoff: Duration,
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// Parameters added to every request that does not set them
    pub defaults: Params,
}

impl From<&ClientConfig> for TransportOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: config.timeout,
            retry_delay: config.retry_delay,
            retry_backoff: config.retry_backoff,
            max_attempts: config.max_attempts.max(1),
            defaults: Params::new()
                .with("mode", &config.mode)
                .with("format", &config.text_format),
        }
    }
}

/// [`Transport`] over any [`HttpClient`].
///
/// ```ignore
/// use van_common::config::ClientConfig;
/// use van_common::transport::HttpTransport;
///
/// let config = ClientConfig::default();
/// let transport = HttpTransport::new(reqwest::Client::new(), &config);
/// ```
pub struct HttpTransport<C, S = Unsigned> {
    client: C,
    signer: S,
    api_base: Url,
    stream_url: Url,
    options: TransportOptions,
}

impl<C: HttpClient> HttpTransport<C, Unsigned> {
    /// Create an unsigned transport from a client configuration.
    pub fn new(client: C, config: &ClientConfig) -> Self {
        Self {
            client,
            signer: Unsigned,
            api_base: config.api_base.clone(),
            stream_url: config.stream_url.clone(),
            options: TransportOptions::from(config),
        }
    }
}

impl<C: HttpClient, S: RequestSigner> HttpTransport<C, S> {
    /// Replace the request signer.
    pub fn with_signer<S2: RequestSigner>(self, signer: S2) -> HttpTransport<C, S2> {
        HttpTransport {
            client: self.client,
            signer,
            api_base: self.api_base,
            stream_url: self.stream_url,
            options: self.options,
        }
    }

    /// Replace the retry and encoding options.
    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Access the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Current options.
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Full URL of an endpoint, `{api_base}/{endpoint}.json`.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, TransportError> {
        let raw = format!(
            "{}/{}.json",
            self.api_base.as_str().trim_end_matches('/'),
            endpoint.trim_matches('/')
        );
        Url::parse(&raw).map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }

    fn build_get(&self, endpoint: &str, params: &Params) -> ClientResult<Request<Vec<u8>>> {
        let mut url = self.endpoint_url(endpoint)?;
        let query = params.to_form()?;
        url.set_query(if query.is_empty() { None } else { Some(&query) });

        let mut builder = Request::builder().method(Method::GET).uri(url.as_str());
        if let Some(auth) = self.signer.authorization(&Method::GET, &url, params)? {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder
            .body(Vec::new())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()).into())
    }

    fn build_post(
        &self,
        endpoint: &str,
        data: &Params,
        files: &[FilePart],
    ) -> ClientResult<Request<Vec<u8>>> {
        let url = self.endpoint_url(endpoint)?;
        let mut builder = Request::builder().method(Method::POST).uri(url.as_str());

        let body = if files.is_empty() {
            if let Some(auth) = self.signer.authorization(&Method::POST, &url, data)? {
                builder = builder.header(AUTHORIZATION, auth);
            }
            builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            data.to_form()?.into_bytes()
        } else {
            if let Some(auth) = self.signer.authorization(&Method::POST, &url, &Params::new())? {
                builder = builder.header(AUTHORIZATION, auth);
            }
            let boundary = multipart_boundary();
            builder = builder.header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            );
            multipart_body(&boundary, data, files)
        };

        builder
            .body(body)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()).into())
    }

    /// Send a request, retrying network failures with growing pauses.
    ///
    /// Error responses from the service are returned immediately.
    async fn execute(
        &self,
        endpoint: &str,
        mut build: impl FnMut() -> ClientResult<Request<Vec<u8>>>,
    ) -> ClientResult<serde_json::Value> {
        let mut timeout = self.options.timeout;
        let mut delay = self.options.retry_delay;
        let mut attempt = 1;

        loop {
            let request = build()?;
            let failure = match tokio::time::timeout(timeout, self.client.send_http(request)).await
            {
                Ok(Ok(response)) => return interpret(endpoint, response),
                Ok(Err(e)) => C::classify(e),
                Err(_) => TransportError::Timeout,
            };

            if attempt >= self.options.max_attempts {
                return Err(failure.into());
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(endpoint, attempt, error = %failure, "request failed, retrying");

            tokio::time::sleep(delay).await;
            timeout += self.options.retry_backoff;
            delay += self.options.retry_backoff;
            attempt += 1;
        }
    }
}

fn interpret(endpoint: &str, response: http::Response<Vec<u8>>) -> ClientResult<serde_json::Value> {
    let status = response.status();
    let body = Bytes::from(response.into_body());

    if !status.is_success() {
        return Err(ApiError::from_body(status, endpoint, body).into());
    }

    serde_json::from_slice(&body).map_err(|e| DecodeError::Json(e).into())
}

impl<C, S> Transport for HttpTransport<C, S>
where
    C: HttpClient + Send + Sync,
    S: RequestSigner,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, params)))]
    async fn get(&self, endpoint: &str, params: &Params) -> ClientResult<serde_json::Value> {
        let mut params = params.clone();
        params.merge_defaults(&self.options.defaults);
        self.execute(endpoint, || self.build_get(endpoint, &params))
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, data, files), fields(files = files.len())))]
    async fn post(
        &self,
        endpoint: &str,
        data: &Params,
        files: &[FilePart],
    ) -> ClientResult<serde_json::Value> {
        let mut data = data.clone();
        data.merge_defaults(&self.options.defaults);
        self.execute(endpoint, || self.build_post(endpoint, &data, files))
            .await
    }
}

impl<C, S> StreamingTransport for HttpTransport<C, S>
where
    C: HttpClientExt + Send + Sync,
    S: RequestSigner,
{
    async fn open_stream(&self) -> ClientResult<ByteStream> {
        let url = self.stream_url.clone();
        let mut builder = Request::builder().method(Method::POST).uri(url.as_str());
        if let Some(auth) = self
            .signer
            .authorization(&Method::POST, &url, &Params::new())?
        {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let request = builder
            .body(Vec::new())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .send_http_streaming(request)
            .await
            .map_err(C::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Other(Box::new(StreamError::rejected(format!(
                "event stream answered HTTP {}",
                status
            ))))
            .into());
        }
        Ok(response.into_body())
    }
}

fn multipart_boundary() -> String {
    format!("van-boundary-{}", uuid::Uuid::new_v4().simple())
}

/// Quoted-string value for a part header. Quotes and line breaks are
/// percent-encoded the way browsers encode them in form submissions.
fn header_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn multipart_body(boundary: &str, data: &Params, files: &[FilePart]) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in data.iter() {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name={}\r\n\r\n",
                header_quoted(key)
            )
            .as_bytes(),
        );
        body.extend_from_slice(value.to_text().as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for file in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name={}; filename={}\r\n",
                header_quoted(&file.field),
                header_quoted(&file.file_name)
            )
            .as_bytes(),
        );
        let content_type = file.content_type.replace(['\r', '\n'], "");
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

impl From<ClientError> for StreamError {
    fn from(e: ClientError) -> Self {
        StreamError::transport(e)
    }
}
