//! The session-tracking half of the host: consumes browser events, runs the
//! attribution state machine and forwards close-outs to the aggregation
//! side. All session mutations happen on this module's single event loop,
//! so overlapping handlers can never interleave them.

pub mod favicon;
pub mod session;
pub mod target;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::utils::{
    clock::Clock,
    retry::{run_with_retry, RetryPolicy},
};

use super::{
    blocking::DomainGuard,
    events::{BrowserEvent, EventSource, IdleState},
    storage::close_out::CloseOutRecord,
};

use favicon::FaviconResolver;
use session::{SessionTracker, TrackerConfig};
use target::{classify, IgnoreList, TabTarget};

type PendingFavicon = BoxFuture<'static, (Arc<str>, Option<Arc<str>>)>;

pub struct TrackerModule {
    next: mpsc::Sender<CloseOutRecord>,
    source: Box<dyn EventSource>,
    shutdown: CancellationToken,
    tracker: SessionTracker,
    ignore: IgnoreList,
    heartbeat: Duration,
    favicon_retry: RetryPolicy,
    guard: Arc<dyn DomainGuard>,
    favicon_resolver: Arc<dyn FaviconResolver>,
    clock: Arc<dyn Clock>,
    current_tab: Option<i64>,
}

impl TrackerModule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        next: mpsc::Sender<CloseOutRecord>,
        source: Box<dyn EventSource>,
        shutdown: CancellationToken,
        config: TrackerConfig,
        favicon_retry: RetryPolicy,
        ignore: IgnoreList,
        guard: Arc<dyn DomainGuard>,
        favicon_resolver: Arc<dyn FaviconResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            source,
            shutdown,
            heartbeat: config.heartbeat,
            tracker: SessionTracker::new(config),
            ignore,
            favicon_retry,
            guard,
            favicon_resolver,
            clock,
            current_tab: None,
        }
    }

    /// Executes the tracking event loop until the event stream ends or
    /// shutdown is requested. Both exits close out the running session, so
    /// suspend loses at most the sub-threshold tail.
    pub async fn run(mut self) -> Result<()> {
        let mut heartbeat_point = self.clock.instant() + self.heartbeat;
        let mut pending_favicon: Option<PendingFavicon> = None;

        loop {
            tokio::select! {
                event = self.source.next_event() => {
                    match event? {
                        Some(event) => {
                            debug!("Handling event {:?}", event);
                            self.handle_event(event, &mut pending_favicon).await?;
                        }
                        None => {
                            // The browser closed the pipe. Same as a suspend.
                            let record = self.tracker.close_out(self.clock.time());
                            self.forward(record).await?;
                            return Ok(());
                        }
                    }
                }
                (domain, favicon) = resolve_pending(&mut pending_favicon) => {
                    if let Some(favicon) = favicon {
                        self.tracker.attach_favicon(&domain, favicon);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    let record = self.tracker.close_out(self.clock.time());
                    self.forward(record).await?;
                    return Ok(());
                }
                _ = self.clock.sleep_until(heartbeat_point) => {
                    heartbeat_point += self.heartbeat;
                    let record = self.tracker.flush(self.clock.time());
                    self.forward(record).await?;
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: BrowserEvent,
        pending_favicon: &mut Option<PendingFavicon>,
    ) -> Result<()> {
        let now = self.clock.time();
        match event {
            BrowserEvent::TabActivated {
                tab_id,
                url,
                favicon,
            } => {
                self.current_tab = Some(tab_id);
                self.switch(tab_id, url.as_deref(), favicon, pending_favicon)
                    .await
            }
            BrowserEvent::TabUpdated {
                tab_id,
                url,
                favicon,
            } => {
                // Navigations in background tabs don't move attribution.
                if self.current_tab == Some(tab_id) {
                    self.switch(tab_id, Some(&url), favicon, pending_favicon)
                        .await
                } else {
                    Ok(())
                }
            }
            BrowserEvent::TabRemoved { tab_id } => {
                if self.current_tab == Some(tab_id) {
                    self.current_tab = None;
                    let record = self.tracker.close_out(now);
                    self.forward(record).await
                } else {
                    Ok(())
                }
            }
            BrowserEvent::WindowFocusChanged { focused } => {
                if focused {
                    // Attention came back. The extension follows up with the
                    // active tab, which reopens tracking.
                    Ok(())
                } else {
                    let record = self.tracker.close_out(now);
                    self.forward(record).await
                }
            }
            BrowserEvent::IdleStateChanged { state } => {
                if state == IdleState::Active {
                    Ok(())
                } else {
                    let record = self.tracker.close_out(now);
                    self.forward(record).await
                }
            }
            BrowserEvent::Suspend => {
                let record = self.tracker.close_out(now);
                self.forward(record).await
            }
        }
    }

    async fn switch(
        &mut self,
        tab_id: i64,
        url: Option<&str>,
        favicon: Option<Arc<str>>,
        pending_favicon: &mut Option<PendingFavicon>,
    ) -> Result<()> {
        let now = self.clock.time();
        let target = classify(url, favicon, &self.ignore);
        if let TabTarget::Tracked { domain, .. } = &target {
            self.guard.inspect(tab_id, domain.clone());
        }

        let previous = self.tracker.current_domain().cloned();
        let record = self.tracker.switch_to(target, now);
        self.forward(record).await?;

        if self.tracker.current_domain().cloned() != previous {
            // A fresh session without an icon starts a bounded lookup; any
            // lookup still running for the previous session is dropped.
            *pending_favicon = self
                .tracker
                .favicon_needed()
                .map(|domain| self.favicon_lookup(domain));
        }
        Ok(())
    }

    fn favicon_lookup(&self, domain: Arc<str>) -> PendingFavicon {
        let resolver = Arc::clone(&self.favicon_resolver);
        let clock = Arc::clone(&self.clock);
        let policy = self.favicon_retry;
        async move {
            let favicon = run_with_retry(policy, clock.as_ref(), "favicon resolution", || {
                let resolver = Arc::clone(&resolver);
                let domain = Arc::clone(&domain);
                async move { resolver.resolve(&domain).await }
            })
            .await
            .unwrap_or_else(|e| {
                debug!("No favicon found for {domain}: {e:?}");
                None
            });
            (domain, favicon)
        }
        .boxed()
    }

    async fn forward(&mut self, record: Option<CloseOutRecord>) -> Result<()> {
        let Some(record) = record else {
            return Ok(());
        };
        let span = info_span!("Forwarding close-out");
        debug!("Sending close-out {:?}", record);
        self.next
            .send(record)
            .instrument(span)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }
}

/// Resolves the in-flight favicon lookup, or parks the branch forever when
/// there is none. Leaving the future in place on cancellation keeps this
/// select-safe.
async fn resolve_pending(
    pending: &mut Option<PendingFavicon>,
) -> (Arc<str>, Option<Arc<str>>) {
    match pending {
        Some(lookup) => {
            let resolved = lookup.as_mut().await;
            *pending = None;
            resolved
        }
        None => std::future::pending().await,
    }
}
