//! Per-domain screen time tracking for your browser. A companion extension
//! forwards tab lifecycle events to the small native host in this crate;
//! the host attributes wall-clock time to the visible domain, folds it into
//! week/day buckets and closes tabs on blocked domains. The cli renders the
//! recorded data and manages the block list.
//!

pub mod cli;
pub mod host;
pub mod utils;
