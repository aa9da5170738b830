use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Result of ending attribution for a domain: the tracker watched `domain`
/// for `elapsed_seconds` of wall-clock time. Produced once per session end
/// and consumed exactly once by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOutRecord {
    pub domain: Arc<str>,
    pub elapsed_seconds: u64,
    pub favicon: Option<Arc<str>>,
}
