//! Minimal HTTP client abstraction the transport is built on.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::error::TransportError;
use crate::stream::ByteStream;

/// Sends fully built requests and hands back buffered responses.
///
/// The transport builds every request itself (URL, query, form or multipart
/// body, `Authorization`), so an implementation only has to move bytes.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Display + Send + Sync + 'static;

    /// Send a request and read the whole response body.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<Vec<u8>>, Self::Error>>;

    /// Sort a client error into timeouts, connect failures and the rest.
    /// Without an override every error is [`TransportError::Other`].
    fn classify(error: Self::Error) -> TransportError {
        TransportError::Other(Box::new(error))
    }
}

/// Clients that can also hand back a response body as it arrives, for the
/// event stream.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClientExt: HttpClient {
    /// Send a request and return the body unbuffered.
    fn send_http_streaming(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<ByteStream>, Self::Error>>;
}

#[cfg(feature = "reqwest-client")]
mod reqwest_client {
    use futures::TryStreamExt;

    use super::{HttpClient, HttpClientExt};
    use crate::error::TransportError;
    use crate::stream::{ByteStream, StreamError};

    fn prepare(client: &reqwest::Client, request: http::Request<Vec<u8>>) -> reqwest::RequestBuilder {
        let (parts, body) = request.into_parts();
        client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
    }

    fn with_head<B>(resp: &reqwest::Response, body: B) -> http::Response<B> {
        let mut out = http::Response::new(body);
        *out.status_mut() = resp.status();
        *out.headers_mut() = resp.headers().clone();
        out
    }

    impl HttpClient for reqwest::Client {
        type Error = reqwest::Error;

        async fn send_http(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<http::Response<Vec<u8>>, Self::Error> {
            let resp = prepare(self, request).send().await?;
            let head = with_head(&resp, ());
            let body = resp.bytes().await?.to_vec();
            Ok(head.map(|()| body))
        }

        fn classify(error: reqwest::Error) -> TransportError {
            TransportError::from(error)
        }
    }

    impl HttpClientExt for reqwest::Client {
        async fn send_http_streaming(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<http::Response<ByteStream>, Self::Error> {
            // no whole-request timeout, the stream stays open indefinitely
            let resp = prepare(self, request).send().await?;
            let head = with_head(&resp, ());
            let body = ByteStream::new(resp.bytes_stream().map_err(StreamError::transport));
            Ok(head.map(|()| body))
        }
    }

}

#[cfg(not(target_arch = "wasm32"))]
impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<Vec<u8>>, Self::Error>> + Send {
        self.as_ref().send_http(request)
    }

    fn classify(error: Self::Error) -> TransportError {
        T::classify(error)
    }
}

#[cfg(target_arch = "wasm32")]
impl<T: HttpClient> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<Vec<u8>>, Self::Error>> {
        self.as_ref().send_http(request)
    }

    fn classify(error: Self::Error) -> TransportError {
        T::classify(error)
    }
}
