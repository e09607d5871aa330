use std::sync::{Arc, LazyLock};

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Deserialize;
use smol_str::{SmolStr, format_smolstr};
use van_common::transport::{Params, Transport};

use super::fields;
use super::{Embedded, Entity, EntityData, EntityType, User, UserData};
use crate::cache::{EntityCache, Seed, Slot};
use crate::client::draft::StatusDraft;
use crate::client::error::{Error, Result};

/// A posted message, shared through the cache.
pub type Status<T> = Arc<Entity<StatusData, T>>;

static SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@.+\..+$").unwrap());
static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.+\.([^./]+)$").unwrap());

/// Photo attached to a status.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Photo {
    /// Page showing the photo
    pub url: Option<SmolStr>,
    /// Medium size image
    pub imageurl: Option<SmolStr>,
    /// Thumbnail
    pub thumburl: Option<SmolStr>,
    /// Large image, carrying a `@size.ext` suffix
    pub largeurl: SmolStr,
}

impl Photo {
    /// Full size image: the large url without its size suffix.
    pub fn origin_url(&self) -> SmolStr {
        SmolStr::from(SIZE_SUFFIX.replace(&self.largeurl, ""))
    }

    /// File extension of the full size image.
    pub fn extension(&self) -> Option<SmolStr> {
        let origin = self.origin_url();
        EXTENSION
            .captures(&origin)
            .and_then(|c| c.get(1))
            .map(|m| SmolStr::from(m.as_str()))
    }
}

/// Status payload as returned by `statuses/show` and the timelines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusData {
    /// Opaque id used for addressing
    pub id: SmolStr,
    /// Numeric id, strictly increasing with posting time
    pub rawid: i64,
    /// Message body, HTML when requested with `format=html`
    #[serde(default)]
    pub text: SmolStr,
    #[serde(default, deserialize_with = "fields::timestamp")]
    pub created_at: Option<DateTime<FixedOffset>>,
    /// Client that posted it
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub source: Option<SmolStr>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub in_reply_to_status_id: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub in_reply_to_user_id: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub in_reply_to_screen_name: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub repost_status_id: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub repost_user_id: Option<SmolStr>,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub repost_screen_name: Option<SmolStr>,
    /// Favorited by the authenticated user
    #[serde(default)]
    pub favorited: bool,
    /// Posted by the authenticated user
    #[serde(default)]
    pub is_self: bool,
    #[serde(default, deserialize_with = "fields::empty_as_none")]
    pub location: Option<SmolStr>,
    pub photo: Option<Photo>,
    /// Author
    pub user: Option<Embedded<UserData>>,
    /// The reposted status
    pub repost_status: Option<Embedded<StatusData>>,
}

impl EntityData for StatusData {
    const KIND: EntityType = EntityType::Status;
    const SHOW_ENDPOINT: &'static str = "statuses/show";

    fn id(&self) -> &SmolStr {
        &self.id
    }

    fn slot<T>(cache: &EntityCache<T>) -> &Slot<Self, T> {
        &cache.statuses
    }

    fn register_nested<T>(&self, cache: &EntityCache<T>) {
        if let Some(Embedded::Payload(user)) = &self.user {
            cache.get_or_create(Seed::Payload((**user).clone()));
        }
        if let Some(Embedded::Payload(status)) = &self.repost_status {
            cache.get_or_create(Seed::Payload((**status).clone()));
        }
    }
}

impl<T: Transport> Entity<StatusData, T> {
    /// Message body.
    pub async fn text(&self) -> Result<SmolStr> {
        Ok(self.data().await?.text.clone())
    }

    /// Numeric id.
    pub async fn rawid(&self) -> Result<i64> {
        Ok(self.data().await?.rawid)
    }

    /// Posting time.
    pub async fn created_at(&self) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(self.data().await?.created_at)
    }

    /// Attached photo.
    pub async fn photo(&self) -> Result<Option<Photo>> {
        Ok(self.data().await?.photo.clone())
    }

    /// Author, resolved through the cache.
    pub async fn user(&self) -> Result<Option<User<T>>> {
        let data = self.data().await?;
        let shared = self.shared()?;
        Ok(data.user.as_ref().map(|user| shared.cache.embedded(user)))
    }

    /// The status this one reposts, resolved through the cache.
    pub async fn repost_status(&self) -> Result<Option<Status<T>>> {
        let data = self.data().await?;
        let shared = self.shared()?;
        Ok(data
            .repost_status
            .as_ref()
            .map(|status| shared.cache.embedded(status)))
    }

    /// Delete this status. Only works on the authenticated user's own posts.
    pub async fn delete(&self) -> Result<Arc<StatusData>> {
        let params = Params::new().with("id", self.id());
        self.post_and_replace("statuses/destroy", &params).await
    }

    /// Favorite this status.
    pub async fn favorite(&self) -> Result<Arc<StatusData>> {
        let endpoint = format!("favorites/create/{}", self.id());
        self.post_and_replace(&endpoint, &Params::new()).await
    }

    /// Remove this status from the favorites.
    pub async fn unfavorite(&self) -> Result<Arc<StatusData>> {
        let endpoint = format!("favorites/destroy/{}", self.id());
        self.post_and_replace(&endpoint, &Params::new()).await
    }

    async fn post_and_replace(&self, endpoint: &str, params: &Params) -> Result<Arc<StatusData>> {
        let shared = self.shared()?;
        let payload = shared.transport.post(endpoint, params, &[]).await?;
        let data: StatusData = serde_json::from_value(payload)?;
        data.register_nested(&shared.cache);
        let data = Arc::new(data);
        self.replace(data.clone());
        Ok(data)
    }

    /// The conversation this status is part of, oldest first.
    pub async fn context(&self) -> Result<Vec<Status<T>>> {
        let shared = self.shared()?;
        let params = Params::new().with("id", self.id());
        let payload = shared
            .transport
            .get("statuses/context_timeline", &params)
            .await?;
        shared.cache.resolve_all(payload)
    }

    /// A draft replying to this status, mentioning its author.
    pub async fn reply_draft(&self, text: &str) -> Result<StatusDraft> {
        let author = self.author().await?;
        let screen_name = author.screen_name().await?;
        Ok(StatusDraft::new()
            .text(format_smolstr!("@{} {}", screen_name, text))
            .in_reply_to_user_id(author.id().clone())
            .in_reply_to_status_id(self.id().clone())
            .build())
    }

    /// Reply to this status.
    pub async fn reply(&self, text: &str) -> Result<Status<T>> {
        let draft = self.reply_draft(text).await?;
        self.shared()?.send(draft).await
    }

    /// A draft reposting this status with a comment in front of it.
    pub async fn repost_draft(&self, text: &str) -> Result<StatusDraft> {
        let shared = self.shared()?;
        let origin = self.text().await?;
        let screen_name = self.author().await?.screen_name().await?;
        Ok(StatusDraft::new()
            .text(format_smolstr!(
                "{}{}@{} {}{}",
                text,
                shared.config.repost_style_left,
                screen_name,
                origin,
                shared.config.repost_style_right
            ))
            .repost_status_id(self.id().clone())
            .build())
    }

    /// Repost this status.
    pub async fn repost(&self, text: &str) -> Result<Status<T>> {
        let draft = self.repost_draft(text).await?;
        self.shared()?.send(draft).await
    }

    async fn author(&self) -> Result<User<T>> {
        self.user().await?.ok_or(Error::MissingField {
            kind: EntityType::Status,
            field: "user",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_origin_strips_size_suffix() {
        let photo = Photo {
            url: None,
            imageurl: None,
            thumburl: None,
            largeurl: "http://photo.fanfou.com/v1/mss_3c/n0/0x/1a/ab_123.jpg@596w_1l.jpg".into(),
        };
        assert_eq!(
            photo.origin_url(),
            "http://photo.fanfou.com/v1/mss_3c/n0/0x/1a/ab_123.jpg"
        );
        assert_eq!(photo.extension().as_deref(), Some("jpg"));
    }

    #[test]
    fn status_payload_embeds_user_and_blank_fields() {
        let data: StatusData = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "rawid": 42,
            "text": "hi",
            "created_at": "Sat Jun 02 10:00:00 +0000 2018",
            "in_reply_to_status_id": "",
            "repost_status_id": "zzz",
            "user": {"id": "u1", "name": "U", "screen_name": "u"},
        }))
        .unwrap();

        assert_eq!(data.in_reply_to_status_id, None);
        assert_eq!(data.repost_status_id.as_deref(), Some("zzz"));
        match data.user {
            Some(Embedded::Payload(user)) => assert_eq!(user.screen_name, "u"),
            other => panic!("expected embedded user payload, got {:?}", other),
        }
    }

    #[test]
    fn status_payload_accepts_user_by_id() {
        let data: StatusData = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "rawid": 1,
            "user": "u1",
        }))
        .unwrap();
        assert_eq!(data.user.as_ref().map(Embedded::id).map(SmolStr::as_str), Some("u1"));
    }
}
