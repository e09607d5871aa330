//! The client context.
//!
//! A [`Van`] owns everything a session needs: the transport, the entity
//! cache, the configuration and the draft box. Entities and timelines point
//! back at it, so several independent clients can live in one process.

pub mod account;
pub mod draft;
pub mod error;

use std::sync::{Arc, Mutex};

use smol_str::SmolStr;
use tokio::sync::OnceCell;
use van_common::config::{ClientConfig, ConfigStore};
use van_common::transport::{Params, Transport};

use crate::cache::EntityCache;
use crate::entity::{Status, User, UserData};
use crate::stream::EventStream;
use crate::timeline::Timeline;
pub use draft::{Profile, StatusDraft};
pub use error::{Error, Result};

pub(crate) struct Shared<T> {
    pub(crate) transport: T,
    pub(crate) cache: EntityCache<T>,
    pub(crate) config: ClientConfig,
    pub(crate) drafts: Mutex<Vec<StatusDraft>>,
    me: OnceCell<User<T>>,
}

/// Client for one authenticated session.
///
/// Cloning is cheap and every clone shares the same cache and draft box.
///
/// ```no_run
/// # async fn demo() -> van::Result<()> {
/// use van::{ClientConfig, Van};
///
/// let van = Van::with_reqwest(ClientConfig::default());
/// let mut mentions = van.mentions();
/// for status in mentions.read(5).await? {
///     println!("{}", status.text().await?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Van<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Van<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Van<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Van")
            .field("cache", &self.shared.cache)
            .field("api_base", &self.shared.config.api_base.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "reqwest-client")]
impl Van<van_common::transport::HttpTransport<reqwest::Client>> {
    /// Client over a fresh `reqwest` client, sending unsigned requests.
    pub fn with_reqwest(config: ClientConfig) -> Self {
        let transport = van_common::transport::HttpTransport::new(reqwest::Client::new(), &config);
        Self::new(transport, config)
    }
}

impl<T> Van<T> {
    /// Client over the given transport.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::from_profile(
            transport,
            Profile {
                config,
                draft_box: Vec::new(),
            },
        )
    }

    /// Client resuming a saved profile, draft box included.
    pub fn from_profile(transport: T, profile: Profile) -> Self {
        let Profile { config, draft_box } = profile;
        let shared = Arc::new_cyclic(|owner| Shared {
            transport,
            cache: EntityCache::new(owner.clone()),
            config,
            drafts: Mutex::new(draft_box),
            me: OnceCell::new(),
        });
        Self { shared }
    }

    /// The transport requests go through.
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// The entity cache.
    pub fn cache(&self) -> &EntityCache<T> {
        &self.shared.cache
    }

    /// The user with this id. Lazy: nothing is fetched until its data is read.
    pub fn user(&self, id: impl Into<SmolStr>) -> User<T> {
        self.shared.cache.user(id)
    }

    /// The status with this id. Lazy like [`Van::user`].
    pub fn status(&self, id: impl Into<SmolStr>) -> Status<T> {
        self.shared.cache.status(id)
    }

    /// Pager over any collection endpoint, optionally scoped to a user id.
    pub fn timeline(&self, endpoint: &str, owner: Option<SmolStr>) -> Timeline<T> {
        Timeline::new(self.shared.clone(), endpoint, owner)
    }

    /// The authenticated user's home timeline.
    pub fn home_timeline(&self) -> Timeline<T> {
        self.timeline("statuses/home_timeline", None)
    }

    /// Statuses mentioning the authenticated user.
    pub fn mentions(&self) -> Timeline<T> {
        self.timeline("statuses/mentions", None)
    }

    /// Replies to the authenticated user.
    pub fn replies(&self) -> Timeline<T> {
        self.timeline("statuses/replies", None)
    }

    /// The public timeline.
    pub fn public_timeline(&self) -> Timeline<T> {
        self.timeline("statuses/public_timeline", None)
    }

    /// Listener registry for the account's event stream.
    pub fn events(&self) -> EventStream<T> {
        EventStream::new(self.shared.clone())
    }

    /// Statuses whose send failed, oldest first.
    pub fn drafts(&self) -> Vec<StatusDraft> {
        self.shared.lock_drafts().clone()
    }

    /// Empty the draft box, handing its contents back.
    pub fn take_drafts(&self) -> Vec<StatusDraft> {
        std::mem::take(&mut *self.shared.lock_drafts())
    }

    /// Put drafts back in the box, after the ones already there.
    pub fn restore_drafts(&self, drafts: impl IntoIterator<Item = StatusDraft>) {
        self.shared.lock_drafts().extend(drafts);
    }

    /// Snapshot of the configuration and the draft box.
    pub fn profile(&self) -> Profile {
        Profile {
            config: self.shared.config.clone(),
            draft_box: self.drafts(),
        }
    }

    /// Write [`Van::profile`] to a store.
    pub async fn save_profile<S: ConfigStore<Profile>>(&self, store: &S) -> Result<()> {
        let profile = self.profile();
        store.save(&profile).await?;
        Ok(())
    }
}

impl<T: Transport> Van<T> {
    /// The authenticated user, fetched once per client.
    pub async fn me(&self) -> Result<User<T>> {
        self.shared
            .me
            .get_or_try_init(|| async {
                let payload = self
                    .shared
                    .transport
                    .get("users/show", &Params::new())
                    .await?;
                self.shared.cache.resolve::<UserData>(payload)
            })
            .await
            .cloned()
    }

    /// Post a status. A failed send lands in the draft box.
    pub async fn send(&self, draft: StatusDraft) -> Result<Status<T>> {
        self.shared.send(draft).await
    }

    /// Post a plain text status.
    pub async fn update_status(&self, text: &str) -> Result<Status<T>> {
        self.send(StatusDraft::new().text(text).build()).await
    }
}
