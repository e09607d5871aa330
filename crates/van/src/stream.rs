//! Account event stream.
//!
//! The stream endpoint sends one JSON document per line, separated by
//! `\r\n`, and a bare `\r\n` as a heartbeat. Listeners register for a set of
//! [`EventKind`]s and are called for every matching event.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use chrono::{DateTime, FixedOffset};
use futures::{Stream, StreamExt};
use serde_json::Value;
use smol_str::SmolStr;
use van_common::error::{ClientError, TransportError};
use van_common::stream::StreamError;
use van_common::transport::StreamingTransport;

use crate::cache::Seed;
use crate::client::Shared;
use crate::client::error::Result;
use crate::entity::{Status, StatusData, User, UserData};

/// Set of event kinds. Combine with `|`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventKind(u16);

impl EventKind {
    /// Keep-alive line
    pub const HEARTBEAT: EventKind = EventKind(1 << 0);
    /// A line that could not be understood
    pub const ERROR: EventKind = EventKind(1 << 1);
    /// The user posted a status
    pub const MESSAGE_CREATE: EventKind = EventKind(1 << 2);
    /// The user deleted a status
    pub const MESSAGE_DELETE: EventKind = EventKind(1 << 3);
    /// The user followed someone
    pub const FRIENDS_CREATE: EventKind = EventKind(1 << 4);
    /// The user unfollowed someone
    pub const FRIENDS_DELETE: EventKind = EventKind(1 << 5);
    /// The user asked to follow a protected account
    pub const FRIENDS_REQUEST: EventKind = EventKind(1 << 6);
    /// A status was favorited
    pub const FAV_CREATE: EventKind = EventKind(1 << 7);
    /// A status was unfavorited
    pub const FAV_DELETE: EventKind = EventKind(1 << 8);
    /// The user updated their profile
    pub const USER_UPDATE_PROFILE: EventKind = EventKind(1 << 9);

    /// Every message event
    pub const MESSAGE: EventKind = EventKind(Self::MESSAGE_CREATE.0 | Self::MESSAGE_DELETE.0);
    /// Every friendship event
    pub const FRIENDS: EventKind =
        EventKind(Self::FRIENDS_CREATE.0 | Self::FRIENDS_DELETE.0 | Self::FRIENDS_REQUEST.0);
    /// Every favorite event
    pub const FAV: EventKind = EventKind(Self::FAV_CREATE.0 | Self::FAV_DELETE.0);
    /// Every profile event
    pub const USER: EventKind = Self::USER_UPDATE_PROFILE;
    /// Everything, heartbeats and errors included
    pub const ALL: EventKind = EventKind(
        Self::MESSAGE.0 | Self::FRIENDS.0 | Self::FAV.0 | Self::USER.0 | Self::HEARTBEAT.0 | Self::ERROR.0,
    );

    const NAMES: [(&'static str, EventKind); 10] = [
        ("heartbeat", Self::HEARTBEAT),
        ("error", Self::ERROR),
        ("message.create", Self::MESSAGE_CREATE),
        ("message.delete", Self::MESSAGE_DELETE),
        ("friends.create", Self::FRIENDS_CREATE),
        ("friends.delete", Self::FRIENDS_DELETE),
        ("friends.request", Self::FRIENDS_REQUEST),
        ("fav.create", Self::FAV_CREATE),
        ("fav.delete", Self::FAV_DELETE),
        ("user.updateprofile", Self::USER_UPDATE_PROFILE),
    ];

    /// Kind for an `event` field such as `message.create`.
    pub fn from_event_name(name: &str) -> Option<EventKind> {
        let name = name.to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, kind)| *kind)
    }

    /// Whether the two sets share a kind.
    pub fn intersects(self, other: EventKind) -> bool {
        self.0 & other.0 != 0
    }

    /// Raw bits.
    pub fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for EventKind {
    type Output = EventKind;

    fn bitor(self, rhs: EventKind) -> EventKind {
        EventKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventKind {
    fn bitor_assign(&mut self, rhs: EventKind) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, kind)| self.intersects(*kind))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "EventKind({})", names.join(" | "))
    }
}

/// One event from the stream.
#[derive(Debug)]
pub struct Event<T> {
    /// What happened
    pub kind: EventKind,
    /// The `event` field as sent
    pub name: Option<SmolStr>,
    /// Who did it
    pub source: Option<User<T>>,
    /// Who it was done to
    pub target: Option<User<T>>,
    /// The status involved
    pub object: Option<Status<T>>,
    /// When it happened
    pub created_at: Option<DateTime<FixedOffset>>,
    /// Why the line was not understood, for [`EventKind::ERROR`]
    pub error: Option<SmolStr>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            name: self.name.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            object: self.object.clone(),
            created_at: self.created_at,
            error: self.error.clone(),
        }
    }
}

impl<T> Event<T> {
    fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            name: None,
            source: None,
            target: None,
            object: None,
            created_at: None,
            error: None,
        }
    }

    fn error(message: impl fmt::Display) -> Self {
        Self {
            error: Some(SmolStr::from(message.to_string())),
            ..Self::bare(EventKind::ERROR)
        }
    }
}

type Handler<T> = Arc<dyn Fn(&Event<T>) + Send + Sync>;

struct Listener<T> {
    on: EventKind,
    ttl: Option<u32>,
    handler: Handler<T>,
}

/// Listener registry and reader for the event stream.
pub struct EventStream<T> {
    shared: Arc<Shared<T>>,
    listeners: Arc<Mutex<Vec<Listener<T>>>>,
    running: Arc<AtomicBool>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            listeners: self.listeners.clone(),
            running: self.running.clone(),
        }
    }
}

impl<T> EventStream<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self {
            shared,
            listeners: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener<T>>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Call `handler` for events in `on`. With a `ttl` the listener is removed
    /// after that many calls.
    pub fn on<F>(&self, on: EventKind, ttl: Option<u32>, handler: F)
    where
        F: Fn(&Event<T>) + Send + Sync + 'static,
    {
        if ttl == Some(0) {
            return;
        }
        self.lock().push(Listener {
            on,
            ttl,
            handler: Arc::new(handler),
        });
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Ask [`EventStream::consume`] to return after the current line.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether [`EventStream::stop`] has not been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Turn one line of the stream into an event. Users and statuses in it
    /// are resolved through the client's cache.
    pub fn parse_message(&self, line: &str) -> Event<T> {
        let line = line.trim();
        if line.is_empty() {
            return Event::bare(EventKind::HEARTBEAT);
        }

        let data: Value = match serde_json::from_str(line) {
            Ok(data) => data,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "unparseable event");
                return Event::error(e);
            }
        };
        match self.build_event(&data) {
            Ok(event) => event,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "malformed event");
                Event::error(e)
            }
        }
    }

    fn build_event(&self, data: &Value) -> Result<Event<T>> {
        let name = data.get("event").and_then(Value::as_str).map(SmolStr::from);
        let kind = name
            .as_deref()
            .and_then(EventKind::from_event_name)
            .unwrap_or(EventKind::ERROR);
        let cache = &self.shared.cache;

        let user = |field: &str| -> Result<Option<User<T>>> {
            match data.get(field) {
                Some(payload @ Value::Object(_)) => Ok(Some(
                    cache.get_or_create(Seed::Payload(serde_json::from_value::<UserData>(payload.clone())?)),
                )),
                _ => Ok(None),
            }
        };
        let source = user("source")?;
        let target = user("target")?;
        let object = match data.get("object") {
            Some(payload @ Value::Object(_)) => Some(cache.get_or_create(Seed::Payload(
                serde_json::from_value::<StatusData>(payload.clone())?,
            ))),
            _ => None,
        };
        let created_at = data
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok());

        Ok(Event {
            kind,
            error: (kind == EventKind::ERROR).then(|| SmolStr::new_static("unknown event")),
            name,
            source,
            target,
            object,
            created_at,
        })
    }

    /// Call every listener interested in `event`. Returns how many ran.
    ///
    /// Listeners are picked under the registry lock but called after it is
    /// released, so a handler may register further listeners.
    pub fn dispatch(&self, event: &Event<T>) -> usize {
        let picked: Vec<Handler<T>> = {
            let mut listeners = self.lock();
            let mut picked = Vec::new();
            for listener in listeners.iter_mut() {
                if !listener.on.intersects(event.kind) {
                    continue;
                }
                picked.push(listener.handler.clone());
                if let Some(ttl) = listener.ttl.as_mut() {
                    *ttl = ttl.saturating_sub(1);
                }
            }
            let before = listeners.len();
            listeners.retain(|l| l.ttl != Some(0));
            #[cfg(feature = "tracing")]
            {
                let removed = before - listeners.len();
                if removed > 0 {
                    tracing::debug!(removed, "listeners expired");
                }
            }
            #[cfg(not(feature = "tracing"))]
            let _ = before;
            picked
        };
        for handler in &picked {
            handler(event);
        }
        picked.len()
    }

    /// Read a byte stream to its end, dispatching each line.
    pub async fn consume<S>(&self, stream: S) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<bytes::Bytes, StreamError>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut pending = BytesMut::new();

        while self.is_running() {
            let Some(chunk) = stream.next().await else {
                break;
            };
            pending.extend_from_slice(&chunk?);

            while let Some(end) = find_crlf(&pending) {
                let line = pending.split_to(end);
                pending.advance(2);
                let event = self.parse_message(&String::from_utf8_lossy(&line));
                self.dispatch(&event);
                if !self.is_running() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

impl<T: StreamingTransport + 'static> EventStream<T> {
    /// Open the stream endpoint and dispatch events until it closes or
    /// [`EventStream::stop`] is called.
    pub async fn run(&self) -> Result<()> {
        let body = self.shared.transport.open_stream().await?;
        self.consume(body)
            .await
            .map_err(|e| ClientError::Network(TransportError::Other(Box::new(e))))?;
        Ok(())
    }

    /// Run on a tokio task.
    pub fn spawn(&self) -> tokio::task::JoinHandle<Result<()>> {
        let stream = self.clone();
        tokio::spawn(async move { stream.run().await })
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("listeners", &self.listener_count())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_map_to_kinds() {
        assert_eq!(
            EventKind::from_event_name("message.create"),
            Some(EventKind::MESSAGE_CREATE)
        );
        assert_eq!(
            EventKind::from_event_name("user.updateprofile"),
            Some(EventKind::USER_UPDATE_PROFILE)
        );
        assert_eq!(
            EventKind::from_event_name("FAV.CREATE"),
            Some(EventKind::FAV_CREATE)
        );
        assert_eq!(EventKind::from_event_name("dm.create"), None);
    }

    #[test]
    fn kinds_are_disjoint() {
        assert!(EventKind::MESSAGE.intersects(EventKind::MESSAGE_DELETE));
        assert!(!EventKind::MESSAGE_CREATE.intersects(EventKind::FRIENDS_CREATE));
        assert!(!(EventKind::MESSAGE | EventKind::FRIENDS_CREATE).intersects(EventKind::FRIENDS_DELETE));
        assert!(EventKind::ALL.intersects(EventKind::HEARTBEAT));
    }

    #[test]
    fn crlf_search() {
        assert_eq!(find_crlf(b"{}\r\n"), Some(2));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"{\r"), None);
    }
}
