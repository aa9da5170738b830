//! Enforcement of the user's block list. Separate from attribution: the
//! tracker reports every tracked navigation here, and blocked domains get
//! their tab closed through the command sink.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::utils::{
    clock::Clock,
    retry::{run_with_retry, RetryPolicy},
};

use super::{
    commands::{CommandSink, TabCommand},
    storage::kv_store::{KeyValueStore, BLOCKED_DOMAINS_KEY},
};

/// Hook the tracker calls for every tracked navigation. Implementations
/// must not block the event loop; long work is spawned off.
#[cfg_attr(test, mockall::automock)]
pub trait DomainGuard: Send + Sync {
    fn inspect(&self, tab_id: i64, domain: Arc<str>);
}

/// Reads the block list fresh on every navigation, so CLI edits apply
/// without restarting the host, and issues close-tab commands with bounded
/// retries.
#[derive(Clone)]
pub struct BlockEnforcer<S> {
    store: S,
    sink: Arc<dyn CommandSink>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S: KeyValueStore + Clone + Send + Sync + 'static> BlockEnforcer<S> {
    pub fn new(
        store: S,
        sink: Arc<dyn CommandSink>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            retry,
        }
    }

    /// Closes `tab_id` if `domain` is currently blocked. Returns whether a
    /// close command went out.
    pub async fn enforce(&self, tab_id: i64, domain: &str) -> Result<bool> {
        let Some(blocked) = self
            .store
            .get::<BTreeSet<Arc<str>>>(BLOCKED_DOMAINS_KEY)
            .await?
        else {
            return Ok(false);
        };
        if !blocked.contains(domain) {
            return Ok(false);
        }

        info!("Domain {domain} is blocked, closing tab {tab_id}");
        run_with_retry(self.retry, self.clock.as_ref(), "blocked tab removal", || {
            let sink = Arc::clone(&self.sink);
            async move { sink.send(TabCommand::CloseTab { tab_id }).await }
        })
        .await?;
        Ok(true)
    }
}

impl<S: KeyValueStore + Clone + Send + Sync + 'static> DomainGuard for BlockEnforcer<S> {
    fn inspect(&self, tab_id: i64, domain: Arc<str>) {
        let enforcer = self.clone();
        // Fire and forget: enforcement must not delay attribution, and a tab
        // that disappeared on its own makes the retries moot.
        tokio::spawn(async move {
            if let Err(e) = enforcer.enforce(tab_id, &domain).await {
                warn!("Giving up on closing blocked tab {tab_id}: {e:?}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use tempfile::tempdir;

    use super::BlockEnforcer;
    use crate::host::commands::{MockCommandSink, TabCommand};
    use crate::host::storage::kv_store::{JsonFileStore, KeyValueStore, BLOCKED_DOMAINS_KEY};
    use crate::utils::{clock::SystemClock, retry::RetryPolicy};

    async fn blocked_store(dir: &std::path::Path, domains: &[&str]) -> Result<Arc<JsonFileStore>> {
        let store = Arc::new(JsonFileStore::new(dir.to_path_buf())?);
        let blocked = domains
            .iter()
            .map(|d| Arc::<str>::from(*d))
            .collect::<BTreeSet<_>>();
        store.set(BLOCKED_DOMAINS_KEY, &blocked).await?;
        Ok(store)
    }

    fn enforcer(
        store: Arc<JsonFileStore>,
        sink: MockCommandSink,
    ) -> BlockEnforcer<Arc<JsonFileStore>> {
        BlockEnforcer::new(
            store,
            Arc::new(sink),
            Arc::new(SystemClock),
            RetryPolicy::new(3, Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn test_blocked_domain_closes_tab() -> Result<()> {
        let dir = tempdir()?;
        let store = blocked_store(dir.path(), &["video.example"]).await?;

        let mut sink = MockCommandSink::new();
        sink.expect_send()
            .withf(|command| *command == TabCommand::CloseTab { tab_id: 7 })
            .times(1)
            .returning(|_| Ok(()));

        assert!(enforcer(store, sink).enforce(7, "video.example").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_unblocked_domain_is_left_alone() -> Result<()> {
        let dir = tempdir()?;
        let store = blocked_store(dir.path(), &["video.example"]).await?;

        let sink = MockCommandSink::new();
        assert!(!enforcer(store, sink).enforce(7, "news.example").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_block_list_is_left_alone() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(JsonFileStore::new(dir.path().to_path_buf())?);

        let sink = MockCommandSink::new();
        assert!(!enforcer(store, sink).enforce(7, "news.example").await?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_command_is_retried() -> Result<()> {
        let dir = tempdir()?;
        let store = blocked_store(dir.path(), &["video.example"]).await?;

        let mut sink = MockCommandSink::new();
        let mut failures = 2;
        sink.expect_send().times(3).returning(move |_| {
            if failures > 0 {
                failures -= 1;
                Err(anyhow!("pipe busy"))
            } else {
                Ok(())
            }
        });

        assert!(enforcer(store, sink).enforce(7, "video.example").await?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_command_gives_up() -> Result<()> {
        let dir = tempdir()?;
        let store = blocked_store(dir.path(), &["video.example"]).await?;

        let mut sink = MockCommandSink::new();
        sink.expect_send()
            .times(3)
            .returning(|_| Err(anyhow!("pipe closed")));

        assert!(enforcer(store, sink).enforce(7, "video.example").await.is_err());
        Ok(())
    }
}
