//! # van
//!
//! An async client for the Fanfou API.
//!
//! Users and statuses are [`Entity`] values shared through a per-client
//! [`EntityCache`]: the same id always gives back the same instance, and an
//! entity built from a bare id loads its payload the first time it is read.
//! Collections such as timelines and mentions are read through a
//! [`Timeline`], a cursor that fetches older pages as you read and newer ones
//! when you [`rewind`](Timeline::rewind).
//!
//! ## Example
//!
//! ```no_run
//! use van::{ClientConfig, Van, Whence};
//!
//! # async fn demo() -> van::Result<()> {
//! let van = Van::with_reqwest(ClientConfig::default());
//! let me = van.me().await?;
//! println!("logged in as {}", me.screen_name().await?);
//!
//! let mut timeline = van.home_timeline();
//! for status in timeline.read(20).await? {
//!     let author = status.user().await?;
//!     match author {
//!         Some(author) => println!("{}: {}", author.name().await?, status.text().await?),
//!         None => println!("{}", status.text().await?),
//!     }
//! }
//!
//! // back to the newest status, picking up anything posted meanwhile
//! timeline.rewind().await?;
//! timeline.seek(-5, Whence::End).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Requests go through a [`Transport`]. [`HttpTransport`] is the stock one;
//! give it a [`RequestSigner`] to authenticate requests.

pub mod cache;
pub mod client;
pub mod entity;
pub mod stream;
pub mod text;
pub mod timeline;

pub use cache::{EntityCache, Seed};
pub use client::{Error, Profile, Result, StatusDraft, Van};
pub use entity::{
    Embedded, Entity, EntityData, EntityType, Photo, Relationship, Status, StatusData, User,
    UserData,
};
pub use stream::{Event, EventKind, EventStream};
pub use timeline::{Timeline, TimelineState, Whence};
pub use van_common;
pub use van_common::config::{ClientConfig, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use van_common::transport::{
    FilePart, HttpTransport, Params, RequestSigner, StreamingTransport, Transport, Unsigned,
};
