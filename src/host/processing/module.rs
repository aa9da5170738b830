use anyhow::Result;

use crate::host::storage::close_out::CloseOutRecord;

/// Consumer side of the close-out channel. Abstracts over aggregation
/// targets; today that is the local store, later it could be a sync server.
pub trait RecordProcessor {
    fn process_next(
        &mut self,
        record: CloseOutRecord,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
