//! # Statistics Module
//!
//! Collects counters describing a harvest run.
//!
//! All counters are atomics so the scheduler and every worker can update
//! them without coordination; the per-category tally uses a concurrent map
//! for the same reason. A private snapshot struct is the single source of
//! truth for the `Display` and JSON export paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::HarvestError;

// Consistent point-in-time view used by all presentation logic.
struct StatsSnapshot {
    identifiers_dispatched: usize,
    fetches_succeeded: usize,
    fetches_failed: usize,
    records_written: usize,
    records_rejected: usize,
    discoveries_published: usize,
    discoveries_absorbed: usize,
    discoveries_dropped: usize,
    checkpoints_saved: usize,
    categories: Vec<(String, usize)>,
    elapsed: Duration,
}

impl StatsSnapshot {
    fn records_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.records_written as f64 / seconds
        } else {
            0.0
        }
    }
}

/// Collects and stores various statistics about the harvester's operation.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    start_time: Instant,

    // Scheduler-side metrics
    pub identifiers_dispatched: AtomicUsize,
    pub discoveries_absorbed: AtomicUsize,
    pub discoveries_dropped: AtomicUsize,
    pub checkpoints_saved: AtomicUsize,

    // Worker-side metrics
    pub fetches_succeeded: AtomicUsize,
    pub fetches_failed: AtomicUsize,
    pub records_written: AtomicUsize,
    pub records_rejected: AtomicUsize,
    pub discoveries_published: AtomicUsize,

    /// Accepted records per category.
    pub records_per_category: Arc<dashmap::DashMap<String, usize>>,
}

impl StatCollector {
    pub(crate) fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            identifiers_dispatched: AtomicUsize::new(0),
            discoveries_absorbed: AtomicUsize::new(0),
            discoveries_dropped: AtomicUsize::new(0),
            checkpoints_saved: AtomicUsize::new(0),
            fetches_succeeded: AtomicUsize::new(0),
            fetches_failed: AtomicUsize::new(0),
            records_written: AtomicUsize::new(0),
            records_rejected: AtomicUsize::new(0),
            discoveries_published: AtomicUsize::new(0),
            records_per_category: Arc::new(dashmap::DashMap::new()),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut categories: Vec<(String, usize)> = self
            .records_per_category
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        categories.sort();

        StatsSnapshot {
            identifiers_dispatched: self.identifiers_dispatched.load(Ordering::SeqCst),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::SeqCst),
            fetches_failed: self.fetches_failed.load(Ordering::SeqCst),
            records_written: self.records_written.load(Ordering::SeqCst),
            records_rejected: self.records_rejected.load(Ordering::SeqCst),
            discoveries_published: self.discoveries_published.load(Ordering::SeqCst),
            discoveries_absorbed: self.discoveries_absorbed.load(Ordering::SeqCst),
            discoveries_dropped: self.discoveries_dropped.load(Ordering::SeqCst),
            checkpoints_saved: self.checkpoints_saved.load(Ordering::SeqCst),
            categories,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_identifiers_dispatched(&self) {
        self.identifiers_dispatched.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_fetches_succeeded(&self) {
        self.fetches_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_fetches_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_written(&self, category: &str) {
        self.records_written.fetch_add(1, Ordering::SeqCst);
        *self
            .records_per_category
            .entry(category.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn increment_records_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_discoveries_published(&self) {
        self.discoveries_published.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_discoveries_absorbed(&self) {
        self.discoveries_absorbed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_discoveries_dropped(&self) {
        self.discoveries_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_checkpoints_saved(&self) {
        self.checkpoints_saved.fetch_add(1, Ordering::SeqCst);
    }

    /// Serializes the counters as a JSON object.
    pub fn to_json_string(&self) -> Result<String, HarvestError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes the counters as pretty-printed JSON.
    pub fn to_json_string_pretty(&self) -> Result<String, HarvestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nHarvest Statistics")?;
        writeln!(f, "------------------")?;
        writeln!(f, "  duration    : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  dispatch    : dispatched: {}, checkpoints: {}",
            snapshot.identifiers_dispatched, snapshot.checkpoints_saved
        )?;
        writeln!(
            f,
            "  fetches     : ok: {}, failed: {}",
            snapshot.fetches_succeeded, snapshot.fetches_failed
        )?;
        writeln!(
            f,
            "  records     : written: {} ({:.2}/s), rejected: {}",
            snapshot.records_written,
            snapshot.records_per_second(),
            snapshot.records_rejected
        )?;
        writeln!(
            f,
            "  discoveries : published: {}, absorbed: {}, dropped: {}",
            snapshot.discoveries_published,
            snapshot.discoveries_absorbed,
            snapshot.discoveries_dropped
        )?;

        let categories = if snapshot.categories.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .categories
                .iter()
                .map(|(category, count)| format!("{}: {}", category, count))
                .collect::<Vec<String>>()
                .join(", ")
        };
        writeln!(f, "  categories  : {}", categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_tallies_accumulate() {
        let stats = StatCollector::new();
        stats.record_written("Action");
        stats.record_written("Action");
        stats.record_written("Puzzle");
        assert_eq!(stats.records_written.load(Ordering::SeqCst), 3);
        assert_eq!(*stats.records_per_category.get("Action").unwrap(), 2);
    }

    #[test]
    fn json_export_includes_counters() {
        let stats = StatCollector::new();
        stats.increment_identifiers_dispatched();
        let json = stats.to_json_string().unwrap();
        assert!(json.contains("\"identifiers_dispatched\":1"));
    }
}
