//! Client configuration and pluggable storage for it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::RwLock;
use url::Url;

/// Largest page the collection endpoints will return.
pub const MAX_PAGE_SIZE: u32 = 60;

/// Tunables for a client. Every field has a default, so a partial JSON
/// document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the REST API. Requests go to `{api_base}/{endpoint}.json`.
    pub api_base: Url,
    /// Streaming endpoint for account events.
    pub stream_url: Url,
    /// Per-attempt timeout.
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Pause before retrying a failed attempt.
    #[serde(with = "secs")]
    pub retry_delay: Duration,
    /// Added to both the timeout and the retry delay after each failure.
    #[serde(with = "secs")]
    pub retry_backoff: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Page size used by timelines, capped at [`MAX_PAGE_SIZE`].
    pub page_size: u32,
    /// Default `mode` parameter sent with every request.
    pub mode: SmolStr,
    /// Default `format` parameter sent with every request.
    pub text_format: SmolStr,
    /// Text placed between a repost comment and the quoted status.
    pub repost_style_left: SmolStr,
    /// Text placed after the quoted status in a repost.
    pub repost_style_right: SmolStr,
    /// OAuth1 access token, for signers that need one.
    pub access_token: Option<AccessToken>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse("http://api.fanfou.com").expect("default api base is a valid url"),
            stream_url: Url::parse("http://stream.fanfou.com/1/user.json")
                .expect("default stream url is a valid url"),
            timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(3),
            retry_backoff: Duration::from_secs(2),
            max_attempts: 3,
            page_size: MAX_PAGE_SIZE,
            mode: SmolStr::new_static("lite"),
            text_format: SmolStr::new_static("html"),
            repost_style_left: SmolStr::new_static(" "),
            repost_style_right: SmolStr::new_static(""),
            access_token: None,
        }
    }
}

impl ClientConfig {
    /// Page size actually requested from the service.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// OAuth1 token pair obtained from the authorization flow.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// `oauth_token`
    pub oauth_token: SmolStr,
    /// `oauth_token_secret`
    pub oauth_token_secret: SmolStr,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("oauth_token", &self.oauth_token)
            .field("oauth_token_secret", &"<redacted>")
            .finish()
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Errors emitted by config stores.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ConfigStoreError {
    /// Filesystem or I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(van::config_store::io))]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("serialization error: {0}")]
    #[diagnostic(code(van::config_store::serde))]
    Serde(#[from] serde_json::Error),
}

/// Pluggable storage for a client configuration, or any document that
/// embeds one.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait ConfigStore<D = ClientConfig> {
    /// Load the stored document, if one was saved.
    async fn load(&self) -> Result<Option<D>, ConfigStoreError>;
    /// Persist the given document, replacing what was there.
    async fn save(&self, document: &D) -> Result<(), ConfigStoreError>;
}

/// In-memory store suitable for short-lived clients and tests.
pub struct MemoryConfigStore<D = ClientConfig>(Arc<RwLock<Option<D>>>);

impl<D> Clone for MemoryConfigStore<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D> Default for MemoryConfigStore<D> {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(None)))
    }
}

impl<D: Clone + Send + Sync> ConfigStore<D> for MemoryConfigStore<D> {
    async fn load(&self) -> Result<Option<D>, ConfigStoreError> {
        Ok(self.0.read().await.clone())
    }

    async fn save(&self, document: &D) -> Result<(), ConfigStoreError> {
        *self.0.write().await = Some(document.clone());
        Ok(())
    }
}

/// Config store backed by a pretty-printed JSON file.
///
/// Saves go to a sibling `.tmp` file that is then renamed over the target, so
/// an interrupted save leaves the previous document in place. The access
/// token is written in clear text, so keep the file private.
#[derive(Clone, Debug)]
pub struct FileConfigStore {
    /// Path to the JSON file.
    pub path: PathBuf,
}

impl FileConfigStore {
    /// Create a store for the given path. Nothing is touched until the first save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl<D> ConfigStore<D> for FileConfigStore
where
    D: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self) -> Result<Option<D>, ConfigStoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    async fn save(&self, document: &D) -> Result<(), ConfigStoreError> {
        let buf = serde_json::to_vec_pretty(document)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"timeout": 10, "page_size": 200}"#).unwrap();

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(config.effective_page_size(), MAX_PAGE_SIZE);
        assert_eq!(config.api_base.as_str(), "http://api.fanfou.com/");
        assert_eq!(config.mode, "lite");
    }

    #[test]
    fn access_token_debug_hides_secret() {
        let token = AccessToken {
            oauth_token: "tok".into(),
            oauth_token_secret: "hunter2".into(),
        };
        let shown = format!("{:?}", token);
        assert!(shown.contains("tok"));
        assert!(!shown.contains("hunter2"));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store: MemoryConfigStore = MemoryConfigStore::default();
        assert!(store.load().await.unwrap().is_none());

        let config = ClientConfig {
            max_attempts: 1,
            ..Default::default()
        };
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn file_store_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested").join("van.json"));
        let missing: Option<ClientConfig> = store.load().await.unwrap();
        assert!(missing.is_none());

        let config = ClientConfig {
            access_token: Some(AccessToken {
                oauth_token: "tok".into(),
                oauth_token_secret: "secret".into(),
            }),
            repost_style_left: " RT ".into(),
            ..Default::default()
        };
        store.save(&config).await.unwrap();

        let loaded: ClientConfig = store.load().await.unwrap().expect("saved config");
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn file_store_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("van.json");
        let store = FileConfigStore::new(&path);

        store.save(&ClientConfig::default()).await.unwrap();
        let config = ClientConfig {
            max_attempts: 7,
            ..Default::default()
        };
        store.save(&config).await.unwrap();

        assert!(!path.with_extension("tmp").exists());
        let loaded: Option<ClientConfig> = store.load().await.unwrap();
        assert_eq!(loaded, Some(config));
    }

    #[tokio::test]
    async fn file_store_leftover_tmp_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("van.json");
        let store = FileConfigStore::new(&path);
        let config = ClientConfig {
            page_size: 20,
            ..Default::default()
        };
        store.save(&config).await.unwrap();

        // a save that died before its rename
        std::fs::write(path.with_extension("tmp"), b"{\"page_si").unwrap();

        let loaded: Option<ClientConfig> = store.load().await.unwrap();
        assert_eq!(loaded, Some(config));
    }
}
