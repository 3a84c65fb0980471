//! # Scheduler Module
//!
//! The frontier-owning control loop at the center of the harvester.
//!
//! ## Overview
//!
//! The `Scheduler` is the sole owner of the [`Frontier`]: no other task
//! reads or mutates the pending backlog or the visited set, so neither
//! needs a lock. It talks to the workers exclusively through two bounded
//! channels: identifiers out through the work queue, discoveries back
//! through the discovery queue.
//!
//! ## The round
//!
//! Each iteration of the control loop performs, in order:
//!
//! 1. **Dispatch pass**: push unvisited identifiers from the frontier
//!    head into the work queue with a non-blocking send. A full queue ends
//!    the pass with the head left in place and unvisited, so a congested
//!    worker pool slows frontier drain instead of losing work.
//! 2. **Run-state update**: a pass that ended on an empty frontier is an
//!    idle round and advances the [`RunState`] machine; a full-queue
//!    interruption resets it to `Active`.
//! 3. **Discovery absorption**: drain the discovery queue into the
//!    frontier tail, deduplicating against both the visited set and the
//!    backlog. While draining, one read blocks up to the drain timeout so
//!    slow workers get a chance to report before the run gives up.
//! 4. **Checkpoint**: persist `{visited, pending}` once enough dispatches
//!    have accumulated since the last save.
//!
//! ## Termination
//!
//! `ACTIVE → DRAINING` when the frontier empties cleanly, `DRAINING →
//! ACTIVE` when a discovery arrives before the drain timeout, `DRAINING →
//! TERMINATED` when the timeout elapses with nothing to absorb.
//! `TERMINATED` is the only terminal state. A closed channel on either
//! side (every worker gone) also ends the run.
//!
//! Dropping the scheduler persists a final checkpoint, so the state on
//! disk is current on every exit path: normal termination, interrupt, or
//! panic unwind.

use std::sync::Arc;
use std::time::Duration;

use kanal::{AsyncReceiver, AsyncSender};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::checkpoint::CheckpointStore;
use crate::frontier::{Admission, Frontier};
use crate::stats::StatCollector;

/// Scheduler lifecycle state, advanced once per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    /// Work remains pending or arrived recently.
    Active,
    /// The frontier is empty; waiting one drain window for stragglers.
    Draining,
    /// The drain window elapsed with nothing new; the run is over.
    Terminated,
}

/// How a dispatch pass ended.
enum PassEnd {
    /// The frontier ran out of identifiers.
    Drained,
    /// The work queue refused a non-blocking send; the head stays put.
    QueueFull,
    /// The work queue has no receivers left.
    Closed,
}

enum ChannelStatus {
    Open,
    Closed,
}

pub(crate) struct Scheduler {
    frontier: Frontier,
    store: Option<CheckpointStore>,
    work_tx: AsyncSender<String>,
    discovery_rx: AsyncReceiver<String>,
    checkpoint_every: usize,
    drain_timeout: Duration,
    state: RunState,
    dispatches_since_save: usize,
    stats: Arc<StatCollector>,
}

impl Scheduler {
    pub(crate) fn new(
        frontier: Frontier,
        store: Option<CheckpointStore>,
        work_tx: AsyncSender<String>,
        discovery_rx: AsyncReceiver<String>,
        checkpoint_every: usize,
        drain_timeout: Duration,
        stats: Arc<StatCollector>,
    ) -> Self {
        Scheduler {
            frontier,
            store,
            work_tx,
            discovery_rx,
            checkpoint_every,
            drain_timeout,
            state: RunState::Active,
            dispatches_since_save: 0,
            stats,
        }
    }

    /// Runs the control loop until termination or a closed channel.
    pub(crate) async fn run(mut self) {
        info!(
            "Scheduler started with {} pending and {} visited identifiers",
            self.frontier.len(),
            self.frontier.visited_len()
        );
        loop {
            match self.dispatch_pass() {
                PassEnd::Drained => {
                    self.state = match self.state {
                        RunState::Active => {
                            debug!("Frontier drained, waiting for in-flight discoveries");
                            RunState::Draining
                        }
                        _ => RunState::Terminated,
                    };
                }
                PassEnd::QueueFull => {
                    self.state = RunState::Active;
                }
                PassEnd::Closed => {
                    warn!("Work queue closed, stopping scheduler");
                    break;
                }
            }
            if self.state == RunState::Terminated {
                info!("No discoveries arrived within the drain window, terminating");
                break;
            }
            if let ChannelStatus::Closed = self.absorb_discoveries().await {
                warn!("Discovery queue closed, stopping scheduler");
                break;
            }
            self.maybe_checkpoint();
        }
        info!(
            "Scheduler stopped with {} identifiers still pending",
            self.frontier.len()
        );
    }

    /// Feeds the work queue from the frontier head until the frontier
    /// empties or the queue refuses a send.
    fn dispatch_pass(&mut self) -> PassEnd {
        loop {
            let Some(head) = self.frontier.peek() else {
                return PassEnd::Drained;
            };
            let identifier = head.to_owned();
            if self.frontier.is_visited(&identifier) {
                // queued before an earlier dispatch of the same identifier
                // was recorded; nothing to do
                self.frontier.pop();
                continue;
            }
            match self.work_tx.try_send(identifier.clone()) {
                Ok(true) => {
                    self.frontier.mark_visited(&identifier);
                    self.frontier.pop();
                    self.dispatches_since_save += 1;
                    self.stats.increment_identifiers_dispatched();
                    trace!("Dispatched '{}'", identifier);
                }
                Ok(false) => return PassEnd::QueueFull,
                Err(_) => return PassEnd::Closed,
            }
        }
    }

    /// Moves queued discoveries into the frontier. While draining, the
    /// first read blocks up to the drain timeout; a successful read puts
    /// the scheduler back into `Active`.
    async fn absorb_discoveries(&mut self) -> ChannelStatus {
        if self.state == RunState::Draining {
            trace!("Waiting up to {:?} for discoveries", self.drain_timeout);
            let received = timeout(self.drain_timeout, self.discovery_rx.recv()).await;
            match received {
                Ok(Ok(identifier)) => {
                    self.state = RunState::Active;
                    self.absorb(identifier);
                }
                Ok(Err(_)) => return ChannelStatus::Closed,
                Err(_) => {
                    debug!("Drain window elapsed with no discoveries");
                    return ChannelStatus::Open;
                }
            }
        }
        loop {
            match self.discovery_rx.try_recv() {
                Ok(Some(identifier)) => self.absorb(identifier),
                Ok(None) => break,
                Err(_) => return ChannelStatus::Closed,
            }
        }
        ChannelStatus::Open
    }

    fn absorb(&mut self, identifier: String) {
        match self.frontier.admit(identifier) {
            Admission::Queued => self.stats.increment_discoveries_absorbed(),
            Admission::AtCapacity => {
                trace!("Frontier at capacity, dropping discovery");
                self.stats.increment_discoveries_dropped();
            }
            Admission::AlreadyPending | Admission::AlreadyVisited => {
                self.stats.increment_discoveries_dropped();
            }
        }
    }

    fn maybe_checkpoint(&mut self) {
        let Some(store) = &self.store else { return };
        if self.dispatches_since_save < self.checkpoint_every {
            return;
        }
        match store.save(&self.frontier.to_checkpoint()) {
            Ok(()) => {
                self.dispatches_since_save = 0;
                self.stats.increment_checkpoints_saved();
                debug!(
                    "Checkpoint saved with {} pending identifiers",
                    self.frontier.len()
                );
            }
            Err(e) => error!("Periodic checkpoint save failed: {}", e),
        }
    }
}

impl Drop for Scheduler {
    // the guaranteed persist: runs on normal termination, interrupt-driven
    // abort, and panic unwind alike
    fn drop(&mut self) {
        let Some(store) = &self.store else { return };
        match store.save(&self.frontier.to_checkpoint()) {
            Ok(()) => info!("Final checkpoint saved to {}", store.path().display()),
            Err(e) => error!("Final checkpoint save failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;

    fn scheduler_with(
        frontier: Frontier,
        store: Option<CheckpointStore>,
        work_capacity: usize,
        drain_timeout: Duration,
    ) -> (
        Scheduler,
        kanal::AsyncReceiver<String>,
        kanal::AsyncSender<String>,
    ) {
        let (work_tx, work_rx) = kanal::bounded_async::<String>(work_capacity);
        let (discovery_tx, discovery_rx) = kanal::bounded_async::<String>(16);
        let scheduler = Scheduler::new(
            frontier,
            store,
            work_tx,
            discovery_rx,
            100,
            drain_timeout,
            Arc::new(StatCollector::new()),
        );
        (scheduler, work_rx, discovery_tx)
    }

    #[tokio::test]
    async fn dispatch_marks_visited_and_preserves_fifo_order() {
        let frontier = Frontier::seeded(["a".to_string(), "b".to_string()], 100);
        let (mut scheduler, work_rx, _discovery_tx) =
            scheduler_with(frontier, None, 8, Duration::from_secs(30));

        assert!(matches!(scheduler.dispatch_pass(), PassEnd::Drained));
        assert_eq!(work_rx.try_recv().unwrap().as_deref(), Some("a"));
        assert_eq!(work_rx.try_recv().unwrap().as_deref(), Some("b"));
        assert!(scheduler.frontier.is_visited("a"));
        assert!(scheduler.frontier.is_visited("b"));
        assert!(scheduler.frontier.is_empty());
    }

    #[tokio::test]
    async fn full_work_queue_leaves_head_unvisited() {
        let frontier = Frontier::seeded(["a".to_string()], 100);
        let (mut scheduler, work_rx, _discovery_tx) =
            scheduler_with(frontier, None, 1, Duration::from_secs(30));
        scheduler.work_tx.send("occupant".to_string()).await.unwrap();

        assert!(matches!(scheduler.dispatch_pass(), PassEnd::QueueFull));
        assert_eq!(scheduler.frontier.peek(), Some("a"));
        assert!(!scheduler.frontier.is_visited("a"));

        // next round succeeds once the queue has room again
        assert_eq!(work_rx.try_recv().unwrap().as_deref(), Some("occupant"));
        assert!(matches!(scheduler.dispatch_pass(), PassEnd::Drained));
        assert_eq!(work_rx.try_recv().unwrap().as_deref(), Some("a"));
        assert!(scheduler.frontier.is_visited("a"));
    }

    #[tokio::test]
    async fn visited_head_is_discarded_without_dispatch() {
        let mut frontier = Frontier::seeded(["a".to_string()], 100);
        frontier.mark_visited("a");
        let (mut scheduler, work_rx, _discovery_tx) =
            scheduler_with(frontier, None, 8, Duration::from_secs(30));

        assert!(matches!(scheduler.dispatch_pass(), PassEnd::Drained));
        assert!(work_rx.try_recv().unwrap().is_none());
        assert!(scheduler.frontier.is_empty());
    }

    #[tokio::test]
    async fn absorbed_duplicates_and_overflow_are_dropped() {
        let (mut scheduler, _work_rx, _discovery_tx) =
            scheduler_with(Frontier::new(2), None, 8, Duration::from_secs(30));
        scheduler.absorb("x".to_string());
        scheduler.absorb("x".to_string());
        scheduler.absorb("y".to_string());
        scheduler.absorb("z".to_string());
        assert_eq!(scheduler.frontier.len(), 2);
        let stats = &scheduler.stats;
        assert_eq!(
            stats
                .discoveries_absorbed
                .load(std::sync::atomic::Ordering::SeqCst),
            2
        );
        assert_eq!(
            stats
                .discoveries_dropped
                .load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn terminates_one_drain_window_after_frontier_empties() {
        let (scheduler, _work_rx, _discovery_tx) =
            scheduler_with(Frontier::new(100), None, 8, Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        scheduler.run().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_during_drain_window_resumes_dispatch() {
        let (scheduler, work_rx, discovery_tx) =
            scheduler_with(Frontier::new(100), None, 8, Duration::from_secs(30));
        let handle = tokio::spawn(scheduler.run());

        // let the scheduler settle into its drain window, then feed it
        tokio::time::sleep(Duration::from_secs(1)).await;
        discovery_tx.send("x".to_string()).await.unwrap();

        let dispatched = timeout(Duration::from_secs(5), work_rx.recv())
            .await
            .expect("discovery should be dispatched")
            .unwrap();
        assert_eq!(dispatched, "x");

        drop(discovery_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn checkpoints_periodically_and_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("harvest.json"));
        let frontier =
            Frontier::seeded(["a".to_string(), "b".to_string(), "c".to_string()], 100);
        let (work_tx, work_rx) = kanal::bounded_async::<String>(8);
        let (discovery_tx, discovery_rx) = kanal::bounded_async::<String>(8);
        let stats = Arc::new(StatCollector::new());
        let scheduler = Scheduler::new(
            frontier,
            Some(store.clone()),
            work_tx,
            discovery_rx,
            2,
            Duration::from_millis(10),
            Arc::clone(&stats),
        );

        scheduler.run().await;
        drop(discovery_tx);

        let checkpoint = store.load().unwrap().unwrap();
        let mut visited = checkpoint.visited.clone();
        visited.sort();
        assert_eq!(visited, vec!["a", "b", "c"]);
        assert!(checkpoint.pending.is_empty());
        assert!(
            stats
                .checkpoints_saved
                .load(std::sync::atomic::Ordering::SeqCst)
                >= 1
        );
        assert_eq!(work_rx.len(), 3);
    }

    #[tokio::test]
    async fn dropping_the_scheduler_persists_current_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("harvest.json"));
        let frontier = Frontier::seeded(["a".to_string()], 100);
        let (scheduler, _work_rx, _discovery_tx) =
            scheduler_with(frontier, Some(store.clone()), 8, Duration::from_secs(30));

        drop(scheduler);
        assert_eq!(
            store.load().unwrap().unwrap(),
            Checkpoint {
                visited: vec![],
                pending: vec!["a".to_string()],
            }
        );
    }
}
