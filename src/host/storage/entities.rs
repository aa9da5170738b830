use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::time::{date_key, year_week_key};

use super::close_out::CloseOutRecord;

/// Accumulated usage of one domain within one day. `accumulated_seconds`
/// only ever grows within a day; the favicon is replaced only by a non-empty
/// incoming value.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDailyEntry {
    pub accumulated_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<Arc<str>>,
}

/// Domain → usage mapping for a single calendar day.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayBucket(BTreeMap<Arc<str>, DomainDailyEntry>);

impl DayBucket {
    /// The single place where a close-out meets a day bucket: create the
    /// entry if absent, merge into it if present.
    fn fold(&mut self, record: &CloseOutRecord) {
        let entry = self.0.entry(record.domain.clone()).or_default();
        entry.accumulated_seconds += record.elapsed_seconds;
        if let Some(favicon) = record.favicon.as_ref().filter(|f| !f.is_empty()) {
            entry.favicon = Some(favicon.clone());
        }
    }

    pub fn get(&self, domain: &str) -> Option<&DomainDailyEntry> {
        self.0.get(domain)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn total_seconds(&self) -> u64 {
        self.0.values().map(|v| v.accumulated_seconds).sum()
    }

    /// Entries ordered by accumulated time, most used first. Ties fall back
    /// to domain order so output is stable.
    pub fn entries_by_usage(&self) -> Vec<(&Arc<str>, &DomainDailyEntry)> {
        let mut entries = self.0.iter().collect::<Vec<_>>();
        entries.sort_by(|(domain_a, a), (domain_b, b)| {
            b.accumulated_seconds
                .cmp(&a.accumulated_seconds)
                .then_with(|| domain_a.cmp(domain_b))
        });
        entries
    }
}

/// Date (`YYYY-MM-DD`) → day mapping for a single ISO week.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekBucket(BTreeMap<String, DayBucket>);

impl WeekBucket {
    pub fn day(&self, date: NaiveDate) -> Option<&DayBucket> {
        self.0.get(&date_key(date))
    }
}

/// The whole persisted screen-time artifact: year-week (`YYYY_WW`) → date →
/// domain → usage. Read and written as one value; entries are only ever
/// added or merged, never deleted by the tracking side.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenTimeStore(BTreeMap<String, WeekBucket>);

impl ScreenTimeStore {
    /// Folds one close-out into the bucket for `today`. Applying the same
    /// record twice double-counts; callers feed each record exactly once.
    pub fn apply(&mut self, record: &CloseOutRecord, today: NaiveDate) {
        let week = self.0.entry(year_week_key(today)).or_default();
        let day = week.0.entry(date_key(today)).or_default();
        day.fold(record);
    }

    pub fn week(&self, date: NaiveDate) -> Option<&WeekBucket> {
        self.0.get(&year_week_key(date))
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayBucket> {
        self.week(date).and_then(|week| week.day(date))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Most recently recorded favicon for a domain, newest bucket first.
    /// Used to seed sessions whose tab event carried no favicon.
    pub fn last_favicon(&self, domain: &str) -> Option<Arc<str>> {
        self.0
            .values()
            .rev()
            .flat_map(|week| week.0.values().rev())
            .find_map(|day| day.get(domain).and_then(|entry| entry.favicon.clone()))
    }
}
