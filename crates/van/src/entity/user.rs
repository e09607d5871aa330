use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use smol_str::SmolStr;
use van_common::error::DecodeError;
use van_common::transport::{Params, Transport};

use super::fields;
use super::{Entity, EntityData, EntityType};
use crate::cache::{EntityCache, Slot};
use crate::client::error::Result;
use crate::timeline::Timeline;

/// A user account, shared through the cache.
pub type User<T> = Arc<Entity<UserData, T>>;

/// Account payload as returned by `users/show`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserData {
    /// Account id, also used as the login name in URLs
    pub id: SmolStr,
    /// Immutable internal id
    pub unique_id: Option<SmolStr>,
    /// Display name
    #[serde(default)]
    pub name: SmolStr,
    /// Name shown in mentions
    #[serde(default)]
    pub screen_name: SmolStr,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub location: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub gender: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub birthday: Option<SmolStr>,
    /// Self description
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub description: Option<SmolStr>,
    /// Homepage
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub url: Option<SmolStr>,
    /// Whether the account is only visible to followers
    #[serde(default)]
    pub protected: bool,
    pub followers_count: Option<u64>,
    pub friends_count: Option<u64>,
    pub favourites_count: Option<u64>,
    pub statuses_count: Option<u64>,
    pub photo_count: Option<u64>,
    /// Whether the authenticated user follows this account
    #[serde(default)]
    pub following: bool,
    /// Whether the authenticated user has a pending follow request to it
    #[serde(default)]
    pub notifications: bool,
    /// Registration time
    #[serde(default, deserialize_with = "fields::timestamp")]
    pub created_at: Option<DateTime<FixedOffset>>,
    pub utc_offset: Option<i64>,
    pub profile_image_url: Option<SmolStr>,
    pub profile_image_url_large: Option<SmolStr>,
}

impl EntityData for UserData {
    const KIND: EntityType = EntityType::User;
    const SHOW_ENDPOINT: &'static str = "users/show";

    fn id(&self) -> &SmolStr {
        &self.id
    }

    fn slot<T>(cache: &EntityCache<T>) -> &Slot<Self, T> {
        &cache.users
    }
}

/// How one account relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Relationship {
    /// The source blocks the target
    pub blocking: bool,
    /// The source follows the target
    pub following: bool,
    /// The target follows the source
    pub followed_by: bool,
}

impl Relationship {
    /// Parse a `friendships/show` response.
    ///
    /// Flags come back as the strings `"true"`/`"false"`; real booleans are
    /// accepted too.
    pub fn from_payload(payload: &Value) -> Result<Self, DecodeError> {
        let source = payload
            .pointer("/relationship/source")
            .ok_or(DecodeError::Shape {
                expected: "relationship.source object",
            })?;
        let flag = |name: &str| match source.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        };
        Ok(Self {
            blocking: flag("blocking"),
            following: flag("following"),
            followed_by: flag("followed_by"),
        })
    }
}

impl<T: Transport> Entity<UserData, T> {
    /// Display name.
    pub async fn name(&self) -> Result<SmolStr> {
        Ok(self.data().await?.name.clone())
    }

    /// Name shown in mentions.
    pub async fn screen_name(&self) -> Result<SmolStr> {
        Ok(self.data().await?.screen_name.clone())
    }

    /// Statuses this user has posted.
    pub fn statuses(&self) -> Result<Timeline<T>> {
        self.timeline("statuses/user_timeline")
    }

    /// The timeline this user sees.
    pub fn home_timeline(&self) -> Result<Timeline<T>> {
        self.timeline("statuses/home_timeline")
    }

    /// Statuses with photos this user has posted.
    pub fn photos(&self) -> Result<Timeline<T>> {
        self.timeline("photos/user_timeline")
    }

    /// Statuses this user has favorited.
    pub fn favorites(&self) -> Result<Timeline<T>> {
        self.timeline("favorites/id")
    }

    fn timeline(&self, endpoint: &str) -> Result<Timeline<T>> {
        Ok(Timeline::new(
            self.shared()?,
            endpoint,
            Some(self.id().clone()),
        ))
    }

    /// Accounts following this user. Needs the user to be public or followed.
    pub async fn followers(&self, count: Option<u32>) -> Result<Vec<User<T>>> {
        self.user_list("statuses/followers", count).await
    }

    /// Accounts this user follows. Needs the user to be public or followed.
    pub async fn friends(&self, count: Option<u32>) -> Result<Vec<User<T>>> {
        self.user_list("statuses/friends", count).await
    }

    async fn user_list(&self, endpoint: &str, count: Option<u32>) -> Result<Vec<User<T>>> {
        let shared = self.shared()?;
        let params = Params::new().with("id", self.id()).maybe("count", count);
        let payload = shared.transport.get(endpoint, &params).await?;
        shared.cache.resolve_all(payload)
    }

    /// Ids of the accounts following this user.
    pub async fn followers_ids(&self) -> Result<Vec<SmolStr>> {
        self.id_list("followers/ids").await
    }

    /// Ids of the accounts this user follows.
    pub async fn friends_ids(&self) -> Result<Vec<SmolStr>> {
        self.id_list("friends/ids").await
    }

    async fn id_list(&self, endpoint: &str) -> Result<Vec<SmolStr>> {
        let shared = self.shared()?;
        let params = Params::new().with("id", self.id());
        let payload = shared.transport.get(endpoint, &params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// How this user relates to `other`.
    pub async fn relationship(&self, other: &str) -> Result<Relationship> {
        let shared = self.shared()?;
        let params = Params::new()
            .with("source_id", self.id())
            .with("target_id", other);
        let payload = shared.transport.get("friendships/show", &params).await?;
        Ok(Relationship::from_payload(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_payload_reads_empty_strings_as_unset() {
        let data: UserData = serde_json::from_value(serde_json::json!({
            "id": "test",
            "name": "Test",
            "screen_name": "test",
            "location": "",
            "description": "hello",
            "protected": false,
            "followers_count": 12,
            "created_at": "Sat Jun 02 10:00:00 +0000 2018",
        }))
        .unwrap();

        assert_eq!(data.location, None);
        assert_eq!(data.description.as_deref(), Some("hello"));
        assert_eq!(data.followers_count, Some(12));
        let created = data.created_at.unwrap();
        assert_eq!(created.to_rfc3339(), "2018-06-02T10:00:00+00:00");
    }

    #[test]
    fn relationship_accepts_string_flags() {
        let payload = serde_json::json!({
            "relationship": {
                "source": {"id": "a", "blocking": "false", "following": "true", "followed_by": true},
                "target": {"id": "b"}
            }
        });
        let rel = Relationship::from_payload(&payload).unwrap();
        assert_eq!(
            rel,
            Relationship {
                blocking: false,
                following: true,
                followed_by: true,
            }
        );
    }

    #[test]
    fn relationship_without_source_is_a_shape_error() {
        let err = Relationship::from_payload(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, DecodeError::Shape { .. }));
    }
}
