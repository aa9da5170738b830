use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use blocking::{BlockEnforcer, DomainGuard};
use commands::{CommandSink, StdoutCommandSink};
use events::{EventSource, StdinEventSource};
use processing::{aggregate::Aggregator, ProcessingModule};
use storage::{close_out::CloseOutRecord, kv_store::JsonFileStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracking::{
    favicon::{FaviconResolver, StoredFaviconResolver},
    session::TrackerConfig,
    target::IgnoreList,
    TrackerModule,
};

use crate::utils::{
    clock::{Clock, SystemClock},
    retry::RetryPolicy,
};

pub mod args;
pub mod blocking;
pub mod commands;
pub mod events;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracking;

/// Represents the starting point for the host process. Wires stdin events
/// through the tracker into the aggregator and runs until the browser
/// closes the pipe or a signal arrives.
pub async fn start_host(dir: PathBuf) -> Result<()> {
    let (sender, receiver) = mpsc::channel::<CloseOutRecord>(10);
    let store = Arc::new(JsonFileStore::new(dir.join("store"))?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let shutdown_token = CancellationToken::new();

    let guard = BlockEnforcer::new(
        Arc::clone(&store),
        Arc::new(StdoutCommandSink::new()) as Arc<dyn CommandSink>,
        Arc::clone(&clock),
        RetryPolicy::default(),
    );
    let resolver = StoredFaviconResolver::new(Arc::clone(&store));

    let tracker = create_tracker(
        sender,
        Box::new(StdinEventSource::new()),
        Arc::new(guard),
        Arc::new(resolver),
        &shutdown_token,
        Arc::clone(&clock),
        TrackerConfig::default(),
    );

    let processor = create_processor(Arc::clone(&store), receiver, Box::new(SystemClock));

    let tracking = async {
        let result = tracker.run().await;
        // The event stream is over; release the signal watcher too.
        shutdown_token.cancel();
        result
    };

    let (_, tracking_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        tracking,
        processor.run(),
    );

    if let Err(tracking_result) = tracking_result {
        error!("Tracking module got an error {:?}", tracking_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_tracker(
    sender: mpsc::Sender<CloseOutRecord>,
    source: Box<dyn EventSource>,
    guard: Arc<dyn DomainGuard>,
    favicon_resolver: Arc<dyn FaviconResolver>,
    shutdown_token: &CancellationToken,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
) -> TrackerModule {
    TrackerModule::new(
        sender,
        source,
        shutdown_token.clone(),
        config,
        RetryPolicy::default(),
        IgnoreList::default(),
        guard,
        favicon_resolver,
        clock,
    )
}

fn create_processor(
    store: Arc<JsonFileStore>,
    receiver: mpsc::Receiver<CloseOutRecord>,
    clock: Box<dyn Clock>,
) -> ProcessingModule<Aggregator<Arc<JsonFileStore>>> {
    ProcessingModule::new(receiver, Aggregator::new(store, clock))
}
