//! Identity map for entities.
//!
//! Every lookup goes through [`EntityCache::get_or_create`], so a given
//! `(type, id)` pair maps to one [`Entity`] for the lifetime of the client.
//! Entries are never evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use smol_str::SmolStr;
use van_common::error::DecodeError;

use crate::client::Shared;
use crate::client::error::Result;
use crate::entity::{Embedded, Entity, EntityData, Status, StatusData, User, UserData};

/// What an entity is built from.
#[derive(Debug, Clone)]
pub enum Seed<D> {
    /// Only the id; the entity starts unpopulated
    Id(SmolStr),
    /// A payload the service already returned
    Payload(D),
}

impl<D> Seed<D> {
    /// Seed from a bare id.
    pub fn id(id: impl Into<SmolStr>) -> Self {
        Seed::Id(id.into())
    }
}

/// Entities of one type, keyed by id.
pub struct Slot<D, T> {
    entries: Mutex<HashMap<SmolStr, Arc<Entity<D, T>>>>,
}

impl<D, T> Default for Slot<D, T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<D, T> Slot<D, T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<SmolStr, Arc<Entity<D, T>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The per-client entity cache.
pub struct EntityCache<T> {
    pub(crate) users: Slot<UserData, T>,
    pub(crate) statuses: Slot<StatusData, T>,
    owner: Weak<Shared<T>>,
}

impl<T> EntityCache<T> {
    pub(crate) fn new(owner: Weak<Shared<T>>) -> Self {
        Self {
            users: Slot::default(),
            statuses: Slot::default(),
            owner,
        }
    }

    /// The single live entity for this seed.
    ///
    /// A bare id never touches the network. A payload for an id that is not
    /// cached yet creates a populated entity; for a cached but unpopulated
    /// entity it populates that entity; for a populated one it is ignored and
    /// the cached instance is returned as is.
    pub fn get_or_create<D: EntityData>(&self, seed: Seed<D>) -> Arc<Entity<D, T>> {
        match seed {
            Seed::Id(id) => {
                let mut entries = D::slot(self).lock();
                entries
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Entity::unpopulated(id, self.owner.clone())))
                    .clone()
            }
            Seed::Payload(data) => {
                // nested payloads take their own slot locks
                data.register_nested(self);
                let data = Arc::new(data);
                let mut entries = D::slot(self).lock();
                if let Some(existing) = entries.get(data.id()) {
                    existing.fill(data);
                    return existing.clone();
                }
                let entity = Arc::new(Entity::populated(data, self.owner.clone()));
                entries.insert(entity.id().clone(), entity.clone());
                entity
            }
        }
    }

    /// Decode a payload and resolve it through the cache.
    pub fn resolve<D: EntityData>(&self, payload: Value) -> Result<Arc<Entity<D, T>>> {
        let data: D = serde_json::from_value(payload)?;
        Ok(self.get_or_create(Seed::Payload(data)))
    }

    /// Decode an array of payloads and resolve each one. Nothing is cached
    /// unless every element decodes.
    pub fn resolve_all<D: EntityData>(&self, payload: Value) -> Result<Vec<Arc<Entity<D, T>>>> {
        let Value::Array(items) = payload else {
            return Err(DecodeError::Shape { expected: "array" }.into());
        };
        let decoded = items
            .into_iter()
            .map(serde_json::from_value::<D>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decoded
            .into_iter()
            .map(|data| self.get_or_create(Seed::Payload(data)))
            .collect())
    }

    pub(crate) fn embedded<D: EntityData + Clone>(&self, embedded: &Embedded<D>) -> Arc<Entity<D, T>> {
        match embedded {
            Embedded::Payload(data) => self.get_or_create(Seed::Payload((**data).clone())),
            Embedded::Id(id) => self.get_or_create(Seed::Id(id.clone())),
        }
    }

    /// The cached entity for an id, without creating one.
    pub fn lookup<D: EntityData>(&self, id: &str) -> Option<Arc<Entity<D, T>>> {
        D::slot(self).lock().get(id).cloned()
    }

    /// The user with this id, unpopulated if it was never seen.
    pub fn user(&self, id: impl Into<SmolStr>) -> User<T> {
        self.get_or_create(Seed::id(id))
    }

    /// The status with this id, unpopulated if it was never seen.
    pub fn status(&self, id: impl Into<SmolStr>) -> Status<T> {
        self.get_or_create(Seed::id(id))
    }

    /// Number of cached entities of every type.
    pub fn len(&self) -> usize {
        self.users.lock().len() + self.statuses.lock().len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for EntityCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("users", &self.users.lock().len())
            .field("statuses", &self.statuses.lock().len())
            .finish()
    }
}
