//! Cursor over a paginated collection endpoint.
//!
//! A [`Timeline`] keeps the statuses it has seen in a buffer ordered newest
//! first. Reading past the end of the buffer fetches older pages, and
//! [`Timeline::rewind`] fetches newer ones and puts them at the front. The
//! buffer only ever grows at its two ends, and every fetch is applied whole
//! or not at all.

use std::sync::Arc;

use futures::Stream;
use smol_str::SmolStr;
use van_common::config::MAX_PAGE_SIZE;
use van_common::transport::{Params, Transport};

use crate::cache::Seed;
use crate::client::Shared;
use crate::client::error::{Error, Result};
use crate::entity::{Status, StatusData};

/// Reference point for [`Timeline::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the newest buffered status
    Start,
    /// From the cursor
    Current,
    /// From the end of the buffer
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(Error::invalid_argument(format!("unknown whence {}", other))),
        }
    }
}

/// Where a timeline stands with respect to the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineState {
    /// Nothing fetched yet
    Empty,
    /// Statuses buffered, older ones may exist
    Loaded,
    /// The last attempt to fetch older statuses came back empty
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Boundary {
    id: SmolStr,
    rawid: i64,
}

/// Paged, seekable view over a collection endpoint.
///
/// Every cursor operation takes `&mut self`, so one pager is used by one task
/// at a time; wrap it in a mutex to share it.
pub struct Timeline<T> {
    shared: Arc<Shared<T>>,
    endpoint: SmolStr,
    owner: Option<SmolStr>,
    page_size: u32,
    buffer: Vec<Status<T>>,
    curr: usize,
    newest: Option<Boundary>,
    oldest: Option<Boundary>,
    exhausted: bool,
}

impl<T> Timeline<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>, endpoint: &str, owner: Option<SmolStr>) -> Self {
        let page_size = shared.config.effective_page_size();
        Self {
            shared,
            endpoint: endpoint.into(),
            owner,
            page_size,
            buffer: Vec::new(),
            curr: 0,
            newest: None,
            oldest: None,
            exhausted: false,
        }
    }

    /// Collection endpoint this pager reads.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Id of the user the collection belongs to, if it is scoped to one.
    pub fn owner(&self) -> Option<&SmolStr> {
        self.owner.as_ref()
    }

    /// Current cursor position.
    pub fn tell(&self) -> usize {
        self.curr
    }

    /// Number of buffered statuses.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffered statuses, newest first.
    pub fn buffered(&self) -> &[Status<T>] {
        &self.buffer
    }

    /// Id of the newest buffered status.
    pub fn max_id(&self) -> Option<&SmolStr> {
        self.newest.as_ref().map(|b| &b.id)
    }

    /// Id of the oldest buffered status.
    pub fn since_id(&self) -> Option<&SmolStr> {
        self.oldest.as_ref().map(|b| &b.id)
    }

    /// Where the pager stands.
    pub fn state(&self) -> TimelineState {
        if self.exhausted {
            TimelineState::Exhausted
        } else if self.buffer.is_empty() {
            TimelineState::Empty
        } else {
            TimelineState::Loaded
        }
    }

    fn last_index(&self) -> i64 {
        (self.buffer.len() as i64 - 1).max(0)
    }
}

impl<T: Transport> Timeline<T> {
    /// One request to the endpoint with explicit bounds. Leaves the buffer and
    /// cursor alone; statuses still go through the cache.
    ///
    /// `count` above [`MAX_PAGE_SIZE`] is lowered to it. A `count` of zero is
    /// rejected before any request.
    pub async fn fetch(
        &self,
        since_id: Option<&str>,
        max_id: Option<&str>,
        count: u32,
    ) -> Result<Vec<Status<T>>> {
        if count == 0 {
            return Err(Error::invalid_argument("count must be at least 1"));
        }
        Ok(self
            .fetch_page(since_id, max_id, count)
            .await?
            .into_iter()
            .map(|(status, _)| status)
            .collect())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint)))]
    async fn fetch_page(
        &self,
        since_id: Option<&str>,
        max_id: Option<&str>,
        count: u32,
    ) -> Result<Vec<(Status<T>, i64)>> {
        let params = Params::new()
            .maybe("id", self.owner.as_ref())
            .maybe("since_id", since_id)
            .maybe("max_id", max_id)
            .with("count", count.clamp(1, MAX_PAGE_SIZE));
        let payload = self.shared.transport.get(&self.endpoint, &params).await?;

        let serde_json::Value::Array(items) = payload else {
            return Err(van_common::error::DecodeError::Shape { expected: "array" }.into());
        };
        let decoded = items
            .into_iter()
            .map(serde_json::from_value::<StatusData>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(decoded
            .into_iter()
            .map(|data| {
                let rawid = data.rawid;
                (self.shared.cache.get_or_create(Seed::Payload(data)), rawid)
            })
            .collect())
    }

    /// Append the next older page. Returns how many statuses were added;
    /// zero means the collection has nothing older.
    async fn fetch_older(&mut self) -> Result<usize> {
        let max_id = self.oldest.as_ref().map(|b| b.id.clone());
        let page = self
            .fetch_page(None, max_id.as_deref(), self.page_size)
            .await?;
        let fresh = strictly_older(page, self.oldest.as_ref().map(|b| b.rawid));

        let (Some(first), Some(last)) = (fresh.first(), fresh.last()) else {
            self.exhausted = true;
            return Ok(0);
        };
        let first = boundary(first);
        let last = boundary(last);
        if self.newest.as_ref().is_none_or(|n| first.rawid > n.rawid) {
            self.newest = Some(first);
        }
        self.oldest = Some(last);
        self.exhausted = false;

        let added = fresh.len();
        self.buffer.extend(fresh.into_iter().map(|(status, _)| status));
        Ok(added)
    }

    /// Prepend everything newer than the newest buffered status. Returns how
    /// many statuses were added.
    ///
    /// When more than a page of newer statuses exists, pages are requested
    /// until the gap to the buffer is closed. Nothing is applied unless every
    /// page arrives.
    async fn fetch_newer(&mut self) -> Result<usize> {
        let since = self.newest.clone();
        let mut fresh: Vec<(Status<T>, i64)> = Vec::new();
        let mut max_id: Option<SmolStr> = None;

        loop {
            let page = self
                .fetch_page(
                    since.as_ref().map(|b| b.id.as_str()),
                    max_id.as_deref(),
                    self.page_size,
                )
                .await?;
            let full = page.len() >= self.page_size as usize;
            let floor = fresh.last().map(|(_, rawid)| *rawid);
            let mut page = strictly_older(page, floor);
            if let Some(since) = &since {
                page.retain(|(_, rawid)| *rawid > since.rawid);
            }
            let Some(last) = page.last() else { break };
            max_id = Some(last.0.id().clone());
            fresh.extend(page);
            // an empty timeline only needs its newest page
            if since.is_none() || !full {
                break;
            }
        }

        let (Some(first), Some(last)) = (fresh.first(), fresh.last()) else {
            return Ok(0);
        };
        let first = boundary(first);
        let last = boundary(last);
        if self.oldest.as_ref().is_none_or(|o| last.rawid < o.rawid) {
            self.oldest = Some(last);
        }
        self.newest = Some(first);
        self.exhausted = false;

        let added = fresh.len();
        self.buffer
            .splice(0..0, fresh.into_iter().map(|(status, _)| status));
        self.curr += added;
        Ok(added)
    }

    /// Fetch newer statuses to the front of the buffer and move the cursor to
    /// the newest one. Always returns 0.
    pub async fn rewind(&mut self) -> Result<usize> {
        self.fetch_newer().await?;
        self.curr = 0;
        Ok(0)
    }

    /// Move the cursor and return its new position.
    ///
    /// An empty buffer loads one page first. Positions past the buffer clamp
    /// to its last index; with [`Whence::End`] and a positive offset older
    /// pages are fetched until the position exists or the collection runs
    /// out. A negative offset from [`Whence::Start`] is rejected before any
    /// request.
    pub async fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize> {
        if whence == Whence::Start && offset < 0 {
            return Err(Error::invalid_argument(
                "offset from the start must be zero or positive",
            ));
        }
        if self.buffer.is_empty() {
            self.fetch_older().await?;
        }

        let len = self.buffer.len() as i64;
        let curr = match whence {
            Whence::Start => offset.min(self.last_index()),
            Whence::Current => (self.curr as i64)
                .saturating_add(offset)
                .clamp(0, self.last_index()),
            Whence::End if offset > 0 => {
                let target = len.saturating_add(offset);
                while target >= self.buffer.len() as i64 {
                    if self.fetch_older().await? == 0 {
                        break;
                    }
                }
                target.min(self.last_index())
            }
            Whence::End => len.saturating_add(offset).max(0),
        };
        self.curr = curr as usize;
        Ok(self.curr)
    }

    /// Read up to `count` statuses from the cursor, fetching older pages as
    /// needed. Returns fewer when the collection runs out, and advances the
    /// cursor by the number returned.
    pub async fn read(&mut self, count: usize) -> Result<Vec<Status<T>>> {
        while self.curr.saturating_add(count) > self.buffer.len() {
            if self.fetch_older().await? == 0 {
                break;
            }
        }
        let start = self.curr.min(self.buffer.len());
        let end = start.saturating_add(count).min(self.buffer.len());
        let out = self.buffer[start..end].to_vec();
        self.curr = end;
        Ok(out)
    }

    /// The status at the cursor, advancing past it. Fetches an older page when
    /// the buffer runs out; `None` once the collection is exhausted.
    pub async fn next(&mut self) -> Result<Option<Status<T>>> {
        if self.curr >= self.buffer.len() && self.fetch_older().await? == 0 {
            return Ok(None);
        }
        let status = self.buffer[self.curr].clone();
        self.curr += 1;
        Ok(Some(status))
    }

    /// Statuses from the cursor onwards as a stream. It ends when the
    /// collection is exhausted, or after yielding the first error.
    pub fn stream(&mut self) -> impl Stream<Item = Result<Status<T>>> + '_ {
        futures::stream::try_unfold(self, |timeline| async move {
            Ok::<_, Error>(timeline.next().await?.map(|status| (status, timeline)))
        })
    }
}

fn boundary<T>((status, rawid): &(Status<T>, i64)) -> Boundary {
    Boundary {
        id: status.id().clone(),
        rawid: *rawid,
    }
}

/// Keep a strictly decreasing run of rawids, all below `floor`.
fn strictly_older<S>(page: Vec<(S, i64)>, floor: Option<i64>) -> Vec<(S, i64)> {
    let mut bound = floor.unwrap_or(i64::MAX);
    page.into_iter()
        .filter(|(_, rawid)| {
            if *rawid < bound {
                bound = *rawid;
                true
            } else {
                false
            }
        })
        .collect()
}

impl<T> std::fmt::Debug for Timeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("endpoint", &self.endpoint)
            .field("owner", &self.owner)
            .field("len", &self.buffer.len())
            .field("curr", &self.curr)
            .field("newest", &self.newest)
            .field("oldest", &self.oldest)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whence_from_int() {
        assert_eq!(Whence::try_from(0).unwrap(), Whence::Start);
        assert_eq!(Whence::try_from(2).unwrap(), Whence::End);
        assert!(matches!(
            Whence::try_from(3),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn strictly_older_drops_repeats_and_newer() {
        let page = vec![((), 10), ((), 9), ((), 9), ((), 11), ((), 7)];
        let kept: Vec<i64> = strictly_older(page.clone(), None)
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        assert_eq!(kept, vec![10, 9, 7]);

        let kept: Vec<i64> = strictly_older(page, Some(9))
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        assert_eq!(kept, vec![7]);
    }
}
