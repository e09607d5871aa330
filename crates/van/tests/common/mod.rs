#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use van::van_common::error::{ApiError, ClientError, ClientResult, TransportError};
use van::van_common::stream::{ByteStream, StreamError};
use van::{ClientConfig, FilePart, Params, StreamingTransport, Transport, Van};

const COLLECTIONS: &[&str] = &[
    "statuses/user_timeline",
    "statuses/home_timeline",
    "statuses/mentions",
    "statuses/replies",
    "statuses/public_timeline",
    "photos/user_timeline",
    "favorites/id",
];

/// A request the mock answered.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub endpoint: String,
    pub params: Params,
    pub files: Vec<FilePart>,
}

#[derive(Default)]
struct State {
    /// Newest first, ids are `s{rawid}`
    collection: Vec<Value>,
    users: HashMap<String, Value>,
    me: Option<Value>,
    canned: HashMap<String, Result<Value, (u16, String)>>,
    stream: Vec<Bytes>,
    failures: usize,
    calls: Vec<Call>,
}

/// In-memory service: one remote collection served newest first
/// (`since_id` exclusive, `max_id` inclusive), `users/show`,
/// `statuses/show`, and canned answers for everything else.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

pub fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{} name", id),
        "screen_name": format!("{}_sn", id),
        "location": "",
        "protected": false,
        "followers_count": 3,
        "created_at": "Sat Jun 02 10:00:00 +0000 2018",
    })
}

pub fn status_json(rawid: i64, user: &str) -> Value {
    json!({
        "id": format!("s{}", rawid),
        "rawid": rawid,
        "text": format!("status {}", rawid),
        "created_at": "Sat Jun 02 10:00:00 +0000 2018",
        "source": "web",
        "in_reply_to_status_id": "",
        "favorited": false,
        "user": user_json(user),
    })
}

fn rawid_of(id: &str) -> Option<i64> {
    id.strip_prefix('s')?.parse().ok()
}

fn api_error(status: u16, endpoint: &str, message: &str) -> ClientError {
    let body = json!({"request": format!("/{}.json", endpoint), "error": message});
    ClientError::Api(ApiError::from_body(
        StatusCode::from_u16(status).unwrap(),
        endpoint,
        Bytes::from(body.to_string()),
    ))
}

impl State {
    fn answer(
        &mut self,
        method: &'static str,
        endpoint: &str,
        params: &Params,
        files: &[FilePart],
    ) -> ClientResult<Value> {
        self.calls.push(Call {
            method,
            endpoint: endpoint.to_string(),
            params: params.clone(),
            files: files.to_vec(),
        });

        if self.failures > 0 {
            self.failures -= 1;
            return Err(TransportError::Timeout.into());
        }
        if let Some(canned) = self.canned.get(endpoint) {
            return canned
                .clone()
                .map_err(|(status, message)| api_error(status, endpoint, &message));
        }

        match endpoint {
            "users/show" => match params.str("id") {
                None => self
                    .me
                    .clone()
                    .ok_or_else(|| api_error(401, endpoint, "not logged in")),
                Some(id) => self
                    .users
                    .get(id)
                    .cloned()
                    .ok_or_else(|| api_error(404, endpoint, "no such user")),
            },
            "statuses/show" => {
                let id = params.str("id").unwrap_or_default();
                self.collection
                    .iter()
                    .find(|s| s["id"] == id)
                    .cloned()
                    .ok_or_else(|| api_error(404, endpoint, "no such status"))
            }
            _ if COLLECTIONS.contains(&endpoint) => Ok(self.page(params)),
            _ => Err(api_error(404, endpoint, "no such endpoint")),
        }
    }

    fn page(&self, params: &Params) -> Value {
        let since = params.str("since_id").and_then(rawid_of).unwrap_or(i64::MIN);
        let max = params.str("max_id").and_then(rawid_of).unwrap_or(i64::MAX);
        let count = params.int("count").unwrap_or(20) as usize;
        let page: Vec<Value> = self
            .collection
            .iter()
            .filter(|s| {
                let rawid = s["rawid"].as_i64().unwrap();
                rawid > since && rawid <= max
            })
            .take(count)
            .cloned()
            .collect();
        Value::Array(page)
    }
}

impl MockTransport {
    /// A collection of `n` statuses by `alice`, rawids `n` down to 1.
    pub fn with_statuses(n: i64) -> Self {
        let mock = Self::default();
        {
            let mut state = mock.state.try_lock().unwrap();
            state.collection = (1..=n).rev().map(|rawid| status_json(rawid, "alice")).collect();
            state.users.insert("alice".into(), user_json("alice"));
        }
        mock
    }

    /// Post `k` statuses newer than everything in the collection.
    pub async fn post_newer(&self, k: i64) {
        let mut state = self.state.lock().await;
        let top = state
            .collection
            .first()
            .and_then(|s| s["rawid"].as_i64())
            .unwrap_or(0);
        let newer: Vec<Value> = (top + 1..=top + k)
            .rev()
            .map(|rawid| status_json(rawid, "alice"))
            .collect();
        state.collection.splice(0..0, newer);
    }

    pub async fn add_user(&self, user: Value) {
        let id = user["id"].as_str().unwrap().to_string();
        self.state.lock().await.users.insert(id, user);
    }

    pub async fn set_me(&self, user: Value) {
        self.state.lock().await.me = Some(user);
    }

    pub async fn respond(&self, endpoint: &str, value: Value) {
        self.state
            .lock()
            .await
            .canned
            .insert(endpoint.to_string(), Ok(value));
    }

    pub async fn reject(&self, endpoint: &str, status: u16, message: &str) {
        self.state
            .lock()
            .await
            .canned
            .insert(endpoint.to_string(), Err((status, message.to_string())));
    }

    /// The next `n` requests fail as if the network timed out.
    pub async fn fail_next(&self, n: usize) {
        self.state.lock().await.failures = n;
    }

    pub async fn set_stream(&self, chunks: &[&str]) {
        self.state.lock().await.stream = chunks
            .iter()
            .map(|c| Bytes::copy_from_slice(c.as_bytes()))
            .collect();
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    pub async fn last_call(&self) -> Call {
        self.state
            .lock()
            .await
            .calls
            .last()
            .cloned()
            .expect("no requests were made")
    }
}

impl Transport for MockTransport {
    async fn get(&self, endpoint: &str, params: &Params) -> ClientResult<Value> {
        let outcome = self.state.lock().await.answer("GET", endpoint, params, &[]);
        tokio::task::yield_now().await;
        outcome
    }

    async fn post(&self, endpoint: &str, data: &Params, files: &[FilePart]) -> ClientResult<Value> {
        let outcome = self.state.lock().await.answer("POST", endpoint, data, files);
        tokio::task::yield_now().await;
        outcome
    }
}

impl StreamingTransport for MockTransport {
    async fn open_stream(&self) -> ClientResult<ByteStream> {
        let chunks: Vec<Result<Bytes, StreamError>> =
            self.state.lock().await.stream.drain(..).map(Ok).collect();
        Ok(ByteStream::new(futures::stream::iter(chunks)))
    }
}

pub fn van(transport: MockTransport) -> Van<MockTransport> {
    Van::new(transport, ClientConfig::default())
}

pub fn van_with_page_size(transport: MockTransport, page_size: u32) -> Van<MockTransport> {
    let config = ClientConfig {
        page_size,
        ..Default::default()
    };
    Van::new(transport, config)
}

/// Rawids of the buffered statuses, in buffer order.
pub fn rawids<T>(timeline: &van::Timeline<T>) -> Vec<i64> {
    timeline
        .buffered()
        .iter()
        .map(|s| s.cached().expect("buffered statuses are populated").rawid)
        .collect()
}
