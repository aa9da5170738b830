use anyhow::Result;
use module::RecordProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::storage::close_out::CloseOutRecord;

pub mod aggregate;
pub mod module;

/// Receives close-out records and hands each to the processor exactly once.
/// A record whose processing fails is dropped with a log line; the metric
/// under-counts rather than queueing or blocking the tracker.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<CloseOutRecord>,
    processor: Processor,
}

impl<P: RecordProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<CloseOutRecord>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(record) = self.receiver.recv().await {
            debug!("Processing close-out {:?}", record);
            match self.processor.process_next(record.clone()).await {
                Ok(_) => {
                    info!("Processed close-out {:?}", record)
                }
                Err(e) => {
                    error!("Error processing close-out {:?}: {e:?}", record)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
