//! The top-level orchestrator: wires the scheduler and the workers
//! together and manages the lifecycle of a run.
//!
//! A `Harvester` owns everything a run needs: the restored or seeded
//! frontier, the optional checkpoint store, and the per-worker source and
//! sink factories. `run` creates the two bounded channels, spawns one
//! scheduler task and N worker tasks, then waits for either the scheduler
//! to finish (normal exhaustion) or an interrupt. On interrupt the
//! scheduler task is aborted, which persists the final checkpoint through
//! its drop path; workers are then given a bounded grace period to flush
//! their buffers and release their page sources.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use crate::builder::{HarvesterConfig, SinkFactory, SourceFactory};
use crate::checkpoint::CheckpointStore;
use crate::error::HarvestError;
use crate::frontier::Frontier;
use crate::record::{OutputSink, RecordWriter};
use crate::scheduler::Scheduler;
use crate::source::PageSource;
use crate::stats::StatCollector;
use crate::worker::spawn_worker_task;

/// A fully configured harvest, ready to run. Built by
/// [`crate::builder::HarvesterBuilder`].
pub struct Harvester<P: PageSource, S: OutputSink> {
    pub(crate) config: HarvesterConfig,
    pub(crate) frontier: Frontier,
    pub(crate) store: Option<CheckpointStore>,
    pub(crate) source_factory: SourceFactory<P>,
    pub(crate) sink_factory: SinkFactory<S>,
    pub(crate) stats: Arc<StatCollector>,
}

impl<P: PageSource, S: OutputSink> std::fmt::Debug for Harvester<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("config", &self.config)
            .field("frontier_len", &self.frontier.len())
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: PageSource, S: OutputSink> Harvester<P, S> {
    /// A handle to the run's counters, valid before, during and after
    /// `run`.
    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Runs the harvest to completion: until the frontier is exhausted and
    /// the drain window has elapsed, or until the process is interrupted.
    pub async fn run(self) -> Result<(), HarvestError> {
        let Harvester {
            config,
            frontier,
            store,
            source_factory,
            sink_factory,
            stats,
        } = self;

        info!(
            "Harvest starting with {} workers and {} pending identifiers",
            config.num_workers,
            frontier.len()
        );

        let (work_tx, work_rx) = kanal::bounded_async::<String>(config.work_queue_capacity);
        let (discovery_tx, discovery_rx) =
            kanal::bounded_async::<String>(config.discovery_queue_capacity);

        let allowed_categories = Arc::new(config.allowed_categories.clone());
        let mut workers = Vec::with_capacity(config.num_workers);
        for worker_id in 0..config.num_workers {
            let source = source_factory(worker_id)?;
            let sink = sink_factory(worker_id)?;
            let writer = RecordWriter::new(sink, config.flush_every, config.strict);
            workers.push(spawn_worker_task(
                worker_id,
                work_rx.clone(),
                discovery_tx.clone(),
                source,
                writer,
                Arc::clone(&allowed_categories),
                config.idle_timeout,
                Arc::clone(&stats),
            ));
        }
        // the workers hold the only live clones now; the channels close as
        // soon as the scheduler and every worker are gone
        drop(work_rx);
        drop(discovery_tx);

        let scheduler = Scheduler::new(
            frontier,
            store,
            work_tx,
            discovery_rx,
            config.checkpoint_every,
            config.drain_timeout,
            Arc::clone(&stats),
        );
        let mut scheduler_handle = tokio::spawn(scheduler.run());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, persisting state and shutting down");
                // aborting drops the scheduler, which saves the final
                // checkpoint and closes the work queue
                scheduler_handle.abort();
                let _ = scheduler_handle.await;
            }
            result = &mut scheduler_handle => {
                if let Err(e) = result {
                    error!("Scheduler task failed: {}", e);
                }
            }
        }

        // with the work queue closed the workers drain out on their own;
        // give them a bounded grace period to flush and release sources
        let grace = config.shutdown_grace;
        if tokio::time::timeout(grace, join_all(workers.iter_mut()))
            .await
            .is_err()
        {
            warn!(
                "Workers did not exit within {:?}, aborting the stragglers",
                grace
            );
            for worker in &workers {
                worker.abort();
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        info!(
            "Harvest finished: dispatched={}, records written={}, fetches failed={}, discoveries absorbed={}",
            stats.identifiers_dispatched.load(Ordering::SeqCst),
            stats.records_written.load(Ordering::SeqCst),
            stats.fetches_failed.load(Ordering::SeqCst),
            stats.discoveries_absorbed.load(Ordering::SeqCst),
        );
        Ok(())
    }
}
