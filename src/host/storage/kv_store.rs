use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

/// Key under which the nested screen-time structure is persisted.
pub const SCREEN_TIME_KEY: &str = "screen_time";

/// Key under which the set of user-blocked domains is persisted.
pub const BLOCKED_DOMAINS_KEY: &str = "blocked_domains";

/// The persisted key-value substrate. Values are read and written whole;
/// there are no transactions and no field-level updates, so every mutation
/// is a read-modify-write of the entire value.
pub trait KeyValueStore {
    /// Reads the value under `key`. Absent keys are `None`; a value that no
    /// longer parses is also reported as absent rather than as an error.
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Replaces the value under `key`.
    fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<S: Deref + Sync> KeyValueStore for S
where
    S::Target: KeyValueStore + Sync,
{
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send {
        self.deref().get(key)
    }

    fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<()>> + Send {
        self.deref().set(key, value)
    }
}

/// The main realization of [KeyValueStore]: one JSON file per key inside the
/// application directory. The host writes, the CLI reads, so access goes
/// through shared/exclusive file locks.
pub struct JsonFileStore {
    store_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(store_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&store_dir)?;

        Ok(Self { store_dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.store_dir.join(format!("{key}.json"))
    }

    async fn read_contents(path: &Path) -> Result<Option<String>, std::io::Error> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        file.lock_shared()?;
        let mut contents = String::new();
        let result = file.read_to_string(&mut contents).await;
        file.unlock_async().await?;
        result?;
        Ok(Some(contents))
    }

    async fn write_contents(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = async {
            file.set_len(0).await?;
            file.write_all(contents).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        result
    }
}

impl KeyValueStore for JsonFileStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let path = self.key_path(key);
        debug!("Reading store value {path:?}");
        let Some(contents) = Self::read_contents(&path).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&contents) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                // Might happen after a shutdown cut a write short. Treating the
                // value as absent restarts the metric instead of wedging the host.
                warn!("Value under {key} is corrupted: {e}");
                Ok(None)
            }
        }
    }

    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.key_path(key);
        let contents = serde_json::to_vec(value)?;
        Self::write_contents(&path, &contents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{JsonFileStore, KeyValueStore, BLOCKED_DOMAINS_KEY};

    #[tokio::test]
    async fn test_get_absent_key() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_path_buf())?;

        let value: Option<BTreeSet<Arc<str>>> = store.get(BLOCKED_DOMAINS_KEY).await?;
        assert_eq!(value, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_path_buf())?;

        let blocked = BTreeSet::from([Arc::<str>::from("news.example")]);
        store.set(BLOCKED_DOMAINS_KEY, &blocked).await?;

        let value: Option<BTreeSet<Arc<str>>> = store.get(BLOCKED_DOMAINS_KEY).await?;
        assert_eq!(value, Some(blocked));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_replaces_whole_value() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_path_buf())?;

        let first = BTreeSet::from([
            Arc::<str>::from("news.example"),
            Arc::<str>::from("shop.example"),
        ]);
        store.set(BLOCKED_DOMAINS_KEY, &first).await?;
        let second = BTreeSet::from([Arc::<str>::from("video.example")]);
        store.set(BLOCKED_DOMAINS_KEY, &second).await?;

        let value: Option<BTreeSet<Arc<str>>> = store.get(BLOCKED_DOMAINS_KEY).await?;
        assert_eq!(value, Some(second));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_value_reads_as_absent() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_path_buf())?;

        std::fs::write(dir.path().join("blocked_domains.json"), b"{\"trunc")?;

        let value: Option<BTreeSet<Arc<str>>> = store.get(BLOCKED_DOMAINS_KEY).await?;
        assert_eq!(value, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_arc_store_delegates() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(JsonFileStore::new(dir.path().to_path_buf())?);

        store.set("answer", &42u64).await?;
        assert_eq!(store.get::<u64>("answer").await?, Some(42));
        Ok(())
    }
}
