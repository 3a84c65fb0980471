//! # Builder Module
//!
//! Provides the `HarvesterBuilder`, a fluent API for constructing and
//! configuring [`Harvester`] instances.
//!
//! ## Overview
//!
//! The builder collects the configuration surface of a run (worker count,
//! channel capacities, checkpoint and flush periods, timeouts, the
//! bootstrap identifiers and the category allow-list) together with the
//! two per-worker factories that produce each worker's [`PageSource`] and
//! [`OutputSink`]. `build` validates the configuration, loads the prior
//! checkpoint if one exists (falling back to the bootstrap set otherwise)
//! and hands back a ready-to-run `Harvester`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use harvester_core::builder::HarvesterBuilder;
//! use harvester_core::record::CsvSink;
//!
//! let harvester = HarvesterBuilder::new()
//!     .num_workers(8)
//!     .strict(true)
//!     .bootstrap(["com.example.seed".to_string()])
//!     .with_checkpoint_path("log/harvest.json")
//!     .page_source(|_worker_id| StoreSession::open())
//!     .output_sink(|worker_id| CsvSink::create(format!("raw/{worker_id}.csv")))
//!     .build()?;
//! harvester.run().await?;
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::HarvestError;
use crate::frontier::Frontier;
use crate::harvester::Harvester;
use crate::record::OutputSink;
use crate::source::{default_categories, PageSource};
use crate::stats::StatCollector;

/// Produces one [`PageSource`] per worker, keyed by worker id.
pub type SourceFactory<P> = Box<dyn Fn(usize) -> Result<P, HarvestError> + Send + Sync>;

/// Produces one [`OutputSink`] per worker, keyed by worker id.
pub type SinkFactory<S> = Box<dyn Fn(usize) -> Result<S, HarvestError> + Send + Sync>;

/// Configuration for a harvest run.
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Number of parallel fetch workers.
    pub num_workers: usize,
    /// Capacity of the scheduler → workers queue. Small: its only job is
    /// to keep the workers busy one round ahead.
    pub work_queue_capacity: usize,
    /// Capacity of the workers → scheduler discovery queue.
    pub discovery_queue_capacity: usize,
    /// Upper bound on the pending backlog; discoveries past it are dropped.
    pub frontier_capacity: usize,
    /// Dispatches between periodic checkpoint saves.
    pub checkpoint_every: usize,
    /// Accepted rows between output flushes.
    pub flush_every: usize,
    /// Reject rows with any missing required field instead of emitting
    /// them with empty cells.
    pub strict: bool,
    /// How long the scheduler waits for stragglers once the frontier is
    /// empty before declaring the run over.
    pub drain_timeout: Duration,
    /// How long a worker waits for work before shutting itself down.
    /// Deliberately longer than `drain_timeout` so workers outlive the
    /// scheduler's idle detection instead of racing it.
    pub idle_timeout: Duration,
    /// How long `run` waits for workers to flush and exit after the
    /// scheduler has stopped.
    pub shutdown_grace: Duration,
    /// Identifiers seeding the frontier when no checkpoint exists.
    pub bootstrap: Vec<String>,
    /// Categories accepted by the workers' validation gate.
    pub allowed_categories: HashSet<String>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        HarvesterConfig {
            num_workers: num_cpus::get().clamp(1, 8),
            work_queue_capacity: 20,
            discovery_queue_capacity: 1000,
            frontier_capacity: 100_000,
            checkpoint_every: 100,
            flush_every: 5,
            strict: false,
            drain_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(30),
            bootstrap: Vec::new(),
            allowed_categories: default_categories(),
        }
    }
}

pub struct HarvesterBuilder<P: PageSource, S: OutputSink> {
    config: HarvesterConfig,
    checkpoint_path: Option<PathBuf>,
    source_factory: Option<SourceFactory<P>>,
    sink_factory: Option<SinkFactory<S>>,
}

impl<P: PageSource, S: OutputSink> Default for HarvesterBuilder<P, S> {
    fn default() -> Self {
        Self {
            config: HarvesterConfig::default(),
            checkpoint_path: None,
            source_factory: None,
            sink_factory: None,
        }
    }
}

impl<P: PageSource, S: OutputSink> HarvesterBuilder<P, S> {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration at once.
    pub fn config(mut self, config: HarvesterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of parallel fetch workers.
    pub fn num_workers(mut self, n: usize) -> Self {
        self.config.num_workers = n;
        self
    }

    /// Sets the capacity of the scheduler → workers queue.
    pub fn work_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.work_queue_capacity = capacity;
        self
    }

    /// Sets the capacity of the workers → scheduler discovery queue.
    pub fn discovery_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.discovery_queue_capacity = capacity;
        self
    }

    /// Sets the pending-backlog bound.
    pub fn frontier_capacity(mut self, capacity: usize) -> Self {
        self.config.frontier_capacity = capacity;
        self
    }

    /// Sets the number of dispatches between checkpoint saves.
    pub fn checkpoint_every(mut self, dispatches: usize) -> Self {
        self.config.checkpoint_every = dispatches;
        self
    }

    /// Sets the number of accepted rows between output flushes.
    pub fn flush_every(mut self, rows: usize) -> Self {
        self.config.flush_every = rows;
        self
    }

    /// Rejects rows with any missing required field.
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    /// Sets how long the scheduler waits for stragglers before terminating.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// Sets how long an idle worker waits before shutting down.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the worker shutdown grace period.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Sets the identifiers seeding a fresh run.
    pub fn bootstrap<I>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.config.bootstrap = identifiers.into_iter().collect();
        self
    }

    /// Replaces the category allow-list.
    pub fn allowed_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.config.allowed_categories = categories.into_iter().collect();
        self
    }

    /// Enables checkpointing at the given path. Loaded on build, rewritten
    /// periodically and on every scheduler exit.
    pub fn with_checkpoint_path<Q: AsRef<Path>>(mut self, path: Q) -> Self {
        self.checkpoint_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the factory producing each worker's page source.
    pub fn page_source<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize) -> Result<P, HarvestError> + Send + Sync + 'static,
    {
        self.source_factory = Some(Box::new(factory));
        self
    }

    /// Sets the factory producing each worker's output sink.
    pub fn output_sink<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize) -> Result<S, HarvestError> + Send + Sync + 'static,
    {
        self.sink_factory = Some(Box::new(factory));
        self
    }

    /// Validates the configuration, restores or seeds the frontier, and
    /// builds the [`Harvester`].
    pub fn build(self) -> Result<Harvester<P, S>, HarvestError> {
        let config = self.validate()?;

        let source_factory = self.source_factory.ok_or_else(|| {
            HarvestError::Configuration("Harvester must have a page source factory.".to_string())
        })?;
        let sink_factory = self.sink_factory.ok_or_else(|| {
            HarvestError::Configuration("Harvester must have an output sink factory.".to_string())
        })?;

        let store = self.checkpoint_path.map(CheckpointStore::new);
        let frontier = match &store {
            Some(store) => match store.load() {
                Ok(Some(checkpoint)) => {
                    Frontier::from_checkpoint(checkpoint, config.frontier_capacity)
                }
                Ok(None) => {
                    info!(
                        "No prior checkpoint, seeding frontier with {} bootstrap identifiers",
                        config.bootstrap.len()
                    );
                    Frontier::seeded(config.bootstrap.iter().cloned(), config.frontier_capacity)
                }
                Err(e) => {
                    warn!("Ignoring unusable checkpoint: {}", e);
                    Frontier::seeded(config.bootstrap.iter().cloned(), config.frontier_capacity)
                }
            },
            None => Frontier::seeded(config.bootstrap.iter().cloned(), config.frontier_capacity),
        };

        Ok(Harvester {
            config,
            frontier,
            store,
            source_factory,
            sink_factory,
            stats: Arc::new(StatCollector::new()),
        })
    }

    fn validate(&self) -> Result<HarvesterConfig, HarvestError> {
        let config = &self.config;
        if config.num_workers == 0 {
            return Err(HarvestError::Configuration(
                "num_workers must be greater than 0.".to_string(),
            ));
        }
        if config.work_queue_capacity == 0 || config.discovery_queue_capacity == 0 {
            return Err(HarvestError::Configuration(
                "queue capacities must be greater than 0.".to_string(),
            ));
        }
        if config.frontier_capacity == 0 {
            return Err(HarvestError::Configuration(
                "frontier_capacity must be greater than 0.".to_string(),
            ));
        }
        if config.checkpoint_every == 0 {
            return Err(HarvestError::Configuration(
                "checkpoint_every must be greater than 0.".to_string(),
            ));
        }
        if config.flush_every == 0 {
            return Err(HarvestError::Configuration(
                "flush_every must be greater than 0.".to_string(),
            ));
        }
        Ok(config.clone())
    }
}
