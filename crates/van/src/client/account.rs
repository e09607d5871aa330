//! Operations only available for the authenticated user: following, follow
//! requests, and blocking.
//!
//! Every operation takes a user id (or login name); pass `user.id()` to act on
//! an entity you already hold.

use smol_str::SmolStr;
use van_common::transport::{Params, Transport};

use super::Van;
use super::error::Result;
use crate::entity::{User, UserData};

impl<T: Transport> Van<T> {
    async fn post_user(&self, endpoint: &str, id: &str) -> Result<User<T>> {
        let params = Params::new().with("id", id);
        let payload = self.shared.transport.post(endpoint, &params, &[]).await?;
        self.shared.cache.resolve::<UserData>(payload)
    }

    async fn get_users(&self, endpoint: &str, params: &Params) -> Result<Vec<User<T>>> {
        let payload = self.shared.transport.get(endpoint, params).await?;
        self.shared.cache.resolve_all(payload)
    }

    /// Follow a user. Protected accounts get a follow request instead.
    pub async fn follow(&self, id: &str) -> Result<User<T>> {
        self.post_user("friendships/create", id).await
    }

    /// Stop following a user.
    pub async fn unfollow(&self, id: &str) -> Result<User<T>> {
        self.post_user("friendships/destroy", id).await
    }

    /// Pending requests to follow the authenticated user.
    pub async fn follow_requests(&self, count: Option<u32>) -> Result<Vec<User<T>>> {
        let params = Params::new().maybe("count", count);
        self.get_users("friendships/requests", &params).await
    }

    /// Accept a follow request.
    pub async fn accept_follower(&self, id: &str) -> Result<User<T>> {
        self.post_user("friendships/accept", id).await
    }

    /// Deny a follow request.
    pub async fn deny_follower(&self, id: &str) -> Result<User<T>> {
        self.post_user("friendships/deny", id).await
    }

    /// Block a user.
    pub async fn block(&self, id: &str) -> Result<User<T>> {
        self.post_user("blocks/create", id).await
    }

    /// Unblock a user.
    pub async fn unblock(&self, id: &str) -> Result<User<T>> {
        self.post_user("blocks/destroy", id).await
    }

    /// Whether the authenticated user blocks `id`.
    ///
    /// The service answers with the user when it is blocked and with an error
    /// status when it is not. Network failures still propagate.
    pub async fn is_blocked(&self, id: &str) -> Result<bool> {
        let params = Params::new().with("id", id);
        match self.shared.transport.get("blocks/exists", &params).await {
            Ok(payload) => {
                self.shared.cache.resolve::<UserData>(payload)?;
                Ok(true)
            }
            Err(e) if e.as_api().is_some() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Users on the block list.
    pub async fn blocked_users(&self) -> Result<Vec<User<T>>> {
        self.get_users("blocks/blocking", &Params::new()).await
    }

    /// Ids of the users on the block list.
    pub async fn blocked_ids(&self) -> Result<Vec<SmolStr>> {
        let payload = self.shared.transport.get("blocks/ids", &Params::new()).await?;
        Ok(serde_json::from_value(payload)?)
    }
}
