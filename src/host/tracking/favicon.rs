use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::host::storage::{
    entities::ScreenTimeStore,
    kv_store::{KeyValueStore, SCREEN_TIME_KEY},
};

/// Looks up a favicon for a session that opened without one. Resolution is
/// best-effort; `None` simply leaves the session icon-less.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FaviconResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<Option<Arc<str>>>;
}

/// Resolves favicons from history: the browser usually reports an icon
/// eventually, and once it has, the persisted store remembers it.
pub struct StoredFaviconResolver<S> {
    store: S,
}

impl<S> StoredFaviconResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: KeyValueStore + Send + Sync> FaviconResolver for StoredFaviconResolver<S> {
    async fn resolve(&self, domain: &str) -> Result<Option<Arc<str>>> {
        let Some(data) = self.store.get::<ScreenTimeStore>(SCREEN_TIME_KEY).await? else {
            return Ok(None);
        };
        Ok(data.last_favicon(domain))
    }
}
