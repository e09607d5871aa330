//! Cached remote objects.
//!
//! An [`Entity`] is either populated, holding the payload the service returned
//! for it, or unpopulated, holding nothing but its id. Accessing the payload of
//! an unpopulated entity fetches it from the type's show endpoint exactly once;
//! every holder of the entity sees the result, because the [`EntityCache`]
//! never hands out two instances for the same id.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use van_common::error::ApiError;
use van_common::transport::{Params, Transport};

use crate::cache::{EntityCache, Slot};
use crate::client::Shared;
use crate::client::error::{Error, Result};

pub mod status;
pub mod user;

pub use status::{Photo, Status, StatusData};
pub use user::{Relationship, User, UserData};

/// Kind of remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// An account
    User,
    /// A posted message
    Status,
}

impl EntityType {
    /// Lowercase name, as used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Status => "status",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload type of an entity.
///
/// Binds a payload to the endpoint that hydrates it and the cache slot that
/// stores it.
pub trait EntityData: DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Entity type the payload describes.
    const KIND: EntityType;
    /// Endpoint answering `id` with a single payload.
    const SHOW_ENDPOINT: &'static str;

    /// Service-assigned identifier.
    fn id(&self) -> &SmolStr;

    #[doc(hidden)]
    fn slot<T>(cache: &EntityCache<T>) -> &Slot<Self, T>;

    /// Put payloads embedded in this one into the cache.
    #[doc(hidden)]
    fn register_nested<T>(&self, _cache: &EntityCache<T>) {}
}

/// A payload embedded in another one, either in full or by id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Embedded<D> {
    /// Full payload
    Payload(Box<D>),
    /// Bare identifier
    Id(SmolStr),
}

impl<D: EntityData> Embedded<D> {
    /// Identifier of the embedded object.
    pub fn id(&self) -> &SmolStr {
        match self {
            Embedded::Payload(data) => data.id(),
            Embedded::Id(id) => id,
        }
    }
}

/// A remote object, shared by everyone who looked up its id.
pub struct Entity<D, T> {
    id: SmolStr,
    data: RwLock<Option<Arc<D>>>,
    hydrating: tokio::sync::Mutex<()>,
    shared: Weak<Shared<T>>,
}

impl<D, T> Entity<D, T> {
    pub(crate) fn unpopulated(id: SmolStr, shared: Weak<Shared<T>>) -> Self {
        Self {
            id,
            data: RwLock::new(None),
            hydrating: tokio::sync::Mutex::new(()),
            shared,
        }
    }

    /// Service-assigned identifier.
    pub fn id(&self) -> &SmolStr {
        &self.id
    }

    /// Whether the payload has been loaded.
    pub fn is_populated(&self) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The payload if it is already loaded. Never touches the network.
    pub fn cached(&self) -> Option<Arc<D>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Populate if still empty. Returns whether the payload was taken.
    pub(crate) fn fill(&self, data: Arc<D>) -> bool {
        let mut slot = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(data);
        true
    }

    /// Swap in a fresh payload wholesale.
    pub(crate) fn replace(&self, data: Arc<D>) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
    }

    pub(crate) fn shared(&self) -> Result<Arc<Shared<T>>> {
        self.shared.upgrade().ok_or(Error::Detached)
    }
}

impl<D: EntityData, T> Entity<D, T> {
    pub(crate) fn populated(data: Arc<D>, shared: Weak<Shared<T>>) -> Self {
        Self {
            id: data.id().clone(),
            data: RwLock::new(Some(data)),
            hydrating: tokio::sync::Mutex::new(()),
            shared,
        }
    }
}

impl<D: EntityData, T: Transport> Entity<D, T> {
    /// The payload, fetching it first if this entity is unpopulated.
    ///
    /// Concurrent callers share a single fetch. A failed fetch leaves the
    /// entity unpopulated, so the next call tries again.
    pub async fn data(&self) -> Result<Arc<D>> {
        if let Some(data) = self.cached() {
            return Ok(data);
        }
        let _guard = self.hydrating.lock().await;
        if let Some(data) = self.cached() {
            return Ok(data);
        }
        self.fetch().await
    }

    /// Refetch the payload from the service, replacing what is cached.
    pub async fn hydrate(&self) -> Result<Arc<D>> {
        let _guard = self.hydrating.lock().await;
        self.fetch().await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self), fields(kind = %D::KIND, id = %self.id)))]
    async fn fetch(&self) -> Result<Arc<D>> {
        let shared = self.shared()?;
        let params = Params::new().with("id", &self.id);
        let payload = match shared.transport.get(D::SHOW_ENDPOINT, &params).await {
            Ok(payload) => payload,
            Err(e) if e.as_api().is_some_and(ApiError::is_not_found) => {
                return Err(Error::NotFound {
                    kind: D::KIND,
                    id: self.id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let data: D = serde_json::from_value(payload)?;
        data.register_nested(&shared.cache);
        let data = Arc::new(data);
        self.replace(data.clone());
        Ok(data)
    }
}

impl<D: fmt::Debug, T> fmt::Debug for Entity<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field(
                "data",
                &*self.data.read().unwrap_or_else(PoisonError::into_inner),
            )
            .finish_non_exhaustive()
    }
}

/// Serde helpers for the service's field conventions.
pub(crate) mod fields {
    use chrono::{DateTime, FixedOffset};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use smol_str::SmolStr;

    /// Timestamp layout used by REST payloads, e.g. `Sat Jun 02 10:00:00 +0000 2018`.
    pub const TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

    pub fn timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<FixedOffset>>, D::Error> {
        match Option::<String>::deserialize(deserializer)?.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_str(raw, TIME_FORMAT)
                .map(Some)
                .map_err(D::Error::custom),
        }
    }

    /// The service sends `""` for unset string fields.
    pub fn empty_as_none<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SmolStr>, D::Error> {
        Ok(Option::<SmolStr>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
    }
}
