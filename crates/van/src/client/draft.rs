//! Outgoing statuses and the draft box.

use std::sync::{MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use van_common::config::ClientConfig;
use van_common::transport::{FilePart, Params, Transport};

use super::Shared;
use super::error::Result;
use crate::entity::{Status, StatusData};
use crate::text::process_text;

/// A status that has not been sent yet.
///
/// ```
/// use van::StatusDraft;
///
/// let draft = StatusDraft::new()
///     .text("@friend sounds good")
///     .in_reply_to_status_id("abc123")
///     .build();
/// assert!(draft.photo.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bon::Builder)]
#[builder(start_fn = new)]
pub struct StatusDraft {
    /// Message body
    #[builder(into)]
    pub text: SmolStr,
    /// Photo to upload with the message
    pub photo: Option<FilePart>,
    /// User being replied to
    #[builder(into)]
    pub in_reply_to_user_id: Option<SmolStr>,
    /// Status being replied to
    #[builder(into)]
    pub in_reply_to_status_id: Option<SmolStr>,
    /// Status being reposted
    #[builder(into)]
    pub repost_status_id: Option<SmolStr>,
}

impl StatusDraft {
    /// Request parameters, with the text cleaned of service markup.
    pub fn params(&self) -> Params {
        Params::new()
            .with("status", process_text(&self.text))
            .maybe("in_reply_to_user_id", self.in_reply_to_user_id.as_ref())
            .maybe("in_reply_to_status_id", self.in_reply_to_status_id.as_ref())
            .maybe("repost_status_id", self.repost_status_id.as_ref())
    }

    /// Endpoint the draft is posted to.
    pub fn endpoint(&self) -> &'static str {
        if self.photo.is_some() {
            "photos/upload"
        } else {
            "statuses/update"
        }
    }
}

/// What a client saves between runs: its configuration plus the draft box.
///
/// Configuration fields sit at the top level, so a plain [`ClientConfig`]
/// document loads as a profile with no drafts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Client configuration
    #[serde(flatten)]
    pub config: ClientConfig,
    /// Unsent statuses, oldest first
    #[serde(default)]
    pub draft_box: Vec<StatusDraft>,
}

impl<T> Shared<T> {
    pub(crate) fn lock_drafts(&self) -> MutexGuard<'_, Vec<StatusDraft>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Shared<T> {
    pub(crate) async fn send(&self, draft: StatusDraft) -> Result<Status<T>> {
        let params = draft.params();
        let files: Vec<FilePart> = draft.photo.iter().cloned().collect();

        let payload = match self.transport.post(draft.endpoint(), &params, &files).await {
            Ok(payload) => payload,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "send failed, draft kept in the draft box");
                self.lock_drafts().push(draft);
                return Err(e.into());
            }
        };
        self.cache.resolve::<StatusData>(payload)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn draft_params_strip_markup_and_skip_unset() {
        let draft = StatusDraft::new()
            .text(r#"hi @<a href="http://fanfou.com/bob" class="former">bob</a>"#)
            .repost_status_id("s1")
            .build();

        let params = draft.params();
        assert_eq!(params.str("status"), Some("hi @bob"));
        assert_eq!(params.str("repost_status_id"), Some("s1"));
        assert!(params.get("in_reply_to_user_id").is_none());
        assert_eq!(draft.endpoint(), "statuses/update");
    }

    #[test]
    fn plain_config_is_a_profile_without_drafts() {
        let profile: Profile = serde_json::from_str(r#"{"page_size": 20}"#).unwrap();
        assert_eq!(profile.config.page_size, 20);
        assert!(profile.draft_box.is_empty());
    }

    #[test]
    fn draft_with_photo_uploads() {
        let draft = StatusDraft::new()
            .text("look")
            .photo(FilePart::new("photo", "a.png", Bytes::from_static(b"png")))
            .build();
        assert_eq!(draft.endpoint(), "photos/upload");
    }
}
