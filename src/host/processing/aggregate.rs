use anyhow::Result;
use chrono::Local;

use crate::{
    host::storage::{
        close_out::CloseOutRecord,
        entities::ScreenTimeStore,
        kv_store::{KeyValueStore, SCREEN_TIME_KEY},
    },
    utils::clock::Clock,
};

use super::module::RecordProcessor;

/// Folds close-out records into the persisted screen-time structure. Every
/// record is one whole-value read-modify-write under [SCREEN_TIME_KEY];
/// bucketing uses the local calendar day at the time of aggregation.
pub struct Aggregator<S> {
    store: S,
    clock: Box<dyn Clock>,
}

impl<S: KeyValueStore> Aggregator<S> {
    pub fn new(store: S, clock: Box<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl<S: KeyValueStore + Sync> RecordProcessor for Aggregator<S> {
    async fn process_next(&mut self, record: CloseOutRecord) -> Result<()> {
        let today = self.clock.time().with_timezone(&Local).date_naive();

        let mut data: ScreenTimeStore = self
            .store
            .get(SCREEN_TIME_KEY)
            .await?
            .unwrap_or_default();
        data.apply(&record, today);
        self.store.set(SCREEN_TIME_KEY, &data).await
    }

    async fn finalize(&mut self) -> Result<()> {
        // Nothing is buffered; every record is persisted as it arrives.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::Local;
    use tempfile::tempdir;

    use super::{Aggregator, RecordProcessor};
    use crate::host::storage::{
        close_out::CloseOutRecord,
        entities::ScreenTimeStore,
        kv_store::{JsonFileStore, KeyValueStore, SCREEN_TIME_KEY},
    };
    use crate::utils::clock::SystemClock;

    fn record(domain: &str, elapsed_seconds: u64) -> CloseOutRecord {
        CloseOutRecord {
            domain: domain.into(),
            elapsed_seconds,
            favicon: None,
        }
    }

    #[tokio::test]
    async fn test_records_accumulate_in_todays_bucket() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_path_buf())?;
        let mut aggregator = Aggregator::new(&store, Box::new(SystemClock));

        aggregator.process_next(record("news.example", 12)).await?;
        aggregator.process_next(record("shop.example", 8)).await?;
        aggregator.process_next(record("news.example", 10)).await?;
        aggregator.finalize().await?;

        let data: ScreenTimeStore = store.get(SCREEN_TIME_KEY).await?.unwrap();
        let today = Local::now().date_naive();
        let day = data.day(today).unwrap();
        assert_eq!(day.get("news.example").unwrap().accumulated_seconds, 22);
        assert_eq!(day.get("shop.example").unwrap().accumulated_seconds, 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_store_is_extended_not_replaced() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_path_buf())?;

        {
            let mut aggregator = Aggregator::new(&store, Box::new(SystemClock));
            aggregator.process_next(record("news.example", 5)).await?;
        }
        // A second aggregator over the same store, as after a host restart.
        let mut aggregator = Aggregator::new(&store, Box::new(SystemClock));
        aggregator.process_next(record("news.example", 6)).await?;

        let data: ScreenTimeStore = store.get(SCREEN_TIME_KEY).await?.unwrap();
        let day = data.day(Local::now().date_naive()).unwrap();
        assert_eq!(day.get("news.example").unwrap().accumulated_seconds, 11);
        Ok(())
    }
}
