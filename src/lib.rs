//! # harvester-core
//!
//! Breadth-first catalog harvester: discovers and collects listing records
//! reachable through "similar item" links, starting from a fixed seed set.
//!
//! One frontier-owning scheduler feeds many parallel fetch workers through
//! a pair of bounded channels, deduplicates their discoveries against a
//! monotonically growing visited set, and periodically checkpoints the
//! exploration state so a run survives process restarts.
//!
//! The crate stays agnostic about how pages are actually fetched: callers
//! supply a [`PageSource`] implementation (browser automation, plain HTTP,
//! fixtures) and an [`OutputSink`] per worker.
//!
//! ## Example
//!
//! ```rust,ignore
//! use harvester_core::{CsvSink, HarvesterBuilder};
//!
//! async fn run_harvest() -> Result<(), harvester_core::HarvestError> {
//!     let harvester = HarvesterBuilder::new()
//!         .num_workers(8)
//!         .bootstrap(["com.example.seed".to_string()])
//!         .with_checkpoint_path("log/harvest.json")
//!         .page_source(|_worker_id| StoreSession::open())
//!         .output_sink(|worker_id| CsvSink::create(format!("raw/{worker_id}.csv")))
//!         .build()?;
//!     harvester.run().await
//! }
//! ```

pub mod builder;
pub mod checkpoint;
pub mod error;
pub mod frontier;
pub mod harvester;
pub mod prelude;
pub mod record;
mod scheduler;
pub mod source;
pub mod stats;
mod worker;

pub use builder::{HarvesterBuilder, HarvesterConfig};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{FetchError, HarvestError, RowError};
pub use frontier::{Admission, Frontier};
pub use harvester::Harvester;
pub use record::{CsvSink, MemorySink, OutputRow, OutputSink, RecordWriter, OUTPUT_FIELDS};
pub use source::{AttributeRecord, PageSource, ACCEPTED_CATEGORIES};
pub use stats::StatCollector;

pub use async_trait::async_trait;
pub use tokio;
