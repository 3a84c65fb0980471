//! # Worker Module
//!
//! The fetch-side of the harvester: N of these tasks run in parallel, each
//! owning its own [`PageSource`] and [`RecordWriter`], sharing nothing but
//! the two bounded channels.
//!
//! A worker's loop is deliberately best-effort: a failed fetch is logged
//! and the identifier skipped, never retried or re-queued. Discovered
//! neighbors are published with a blocking send, so a saturated discovery
//! queue stalls the worker; that is the backpressure path from a slow
//! scheduler back onto fetch throughput. A worker that finds nothing to do
//! for the whole idle timeout shuts itself down, flushing buffered rows
//! and releasing its source on the way out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kanal::{AsyncReceiver, AsyncSender};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::record::{OutputSink, PushOutcome, RecordWriter};
use crate::source::{normalize_category, PageSource};
use crate::stats::StatCollector;

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_worker_task<P, S>(
    worker_id: usize,
    work_rx: AsyncReceiver<String>,
    discovery_tx: AsyncSender<String>,
    mut source: P,
    mut writer: RecordWriter<S>,
    allowed_categories: Arc<HashSet<String>>,
    idle_timeout: Duration,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()>
where
    P: PageSource,
    S: OutputSink,
{
    tokio::spawn(async move {
        debug!("Worker {} started", worker_id);
        'run: loop {
            let identifier = match timeout(idle_timeout, work_rx.recv()).await {
                Ok(Ok(identifier)) => identifier,
                Ok(Err(_)) => {
                    debug!("Worker {}: work queue closed", worker_id);
                    break;
                }
                Err(_) => {
                    info!(
                        "Worker {}: nothing to do for {:?}, exiting",
                        worker_id, idle_timeout
                    );
                    break;
                }
            };

            let document = match source.fetch(&identifier).await {
                Ok(document) => document,
                Err(e) => {
                    warn!("Worker {}: skipping '{}': {}", worker_id, identifier, e);
                    stats.increment_fetches_failed();
                    continue;
                }
            };
            stats.increment_fetches_succeeded();

            let mut record = source.parse(&document).await;
            let category = match record.get("Category").map(|c| normalize_category(c)) {
                Some(category) if allowed_categories.contains(&category) => category,
                _ => {
                    debug!(
                        "Worker {}: '{}' is outside the accepted categories",
                        worker_id, identifier
                    );
                    stats.increment_records_rejected();
                    continue;
                }
            };
            record.insert("Category".to_string(), category.clone());
            info!("Worker {}: {} {}", worker_id, identifier, category);

            match writer.push(&record, &identifier).await {
                Ok(PushOutcome::Rejected(e)) => {
                    warn!("Worker {}: {}", worker_id, e);
                    stats.increment_records_rejected();
                }
                Ok(_) => stats.record_written(&category),
                Err(e) => {
                    error!("Worker {}: output sink failure: {}", worker_id, e);
                    break;
                }
            }

            // a rejected row still publishes its discoveries; only the
            // category gate above suppresses them
            let discovered = source.discover(&document).await;
            debug!(
                "Worker {}: publishing {} discovered identifiers",
                worker_id,
                discovered.len()
            );
            for neighbor in discovered {
                if discovery_tx.send(neighbor).await.is_err() {
                    warn!("Worker {}: discovery queue closed", worker_id);
                    break 'run;
                }
                stats.increment_discoveries_published();
            }
        }

        if let Err(e) = writer.close().await {
            error!("Worker {}: failed to flush remaining rows: {}", worker_id, e);
        }
        source.close().await;
        debug!("Worker {} exited", worker_id);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::record::{MemorySink, OUTPUT_FIELDS};
    use crate::source::{default_categories, AttributeRecord};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    type Page = (AttributeRecord, Vec<String>);

    struct ScriptedSource {
        pages: HashMap<String, Page>,
        fetched: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(pages: HashMap<String, Page>) -> Self {
            ScriptedSource {
                pages,
                fetched: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        type Document = Page;

        async fn fetch(&mut self, identifier: &str) -> Result<Page, FetchError> {
            self.fetched.lock().unwrap().push(identifier.to_string());
            self.pages
                .get(identifier)
                .cloned()
                .ok_or_else(|| FetchError::Navigation {
                    identifier: identifier.to_string(),
                    reason: "no such listing".to_string(),
                })
        }

        async fn parse(&mut self, document: &Page) -> AttributeRecord {
            document.0.clone()
        }

        async fn discover(&mut self, document: &Page) -> HashSet<String> {
            document.1.iter().cloned().collect()
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn full_record(category: &str) -> AttributeRecord {
        let mut record: AttributeRecord = OUTPUT_FIELDS
            .iter()
            .filter(|f| **f != "Package")
            .map(|f| (f.to_string(), format!("{f}-value")))
            .collect();
        record.insert("Category".to_string(), category.to_string());
        record
    }

    struct Fixture {
        work_tx: AsyncSender<String>,
        discovery_rx: AsyncReceiver<String>,
        sink: MemorySink,
        fetched: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        stats: Arc<StatCollector>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_fixture(
        pages: HashMap<String, Page>,
        strict: bool,
        idle_timeout: Duration,
    ) -> Fixture {
        let (work_tx, work_rx) = kanal::bounded_async::<String>(8);
        let (discovery_tx, discovery_rx) = kanal::bounded_async::<String>(8);
        let source = ScriptedSource::new(pages);
        let fetched = Arc::clone(&source.fetched);
        let closed = Arc::clone(&source.closed);
        let sink = MemorySink::new();
        let writer = RecordWriter::new(sink.clone(), 1, strict);
        let stats = Arc::new(StatCollector::new());
        let handle = spawn_worker_task(
            0,
            work_rx,
            discovery_tx,
            source,
            writer,
            Arc::new(default_categories()),
            idle_timeout,
            Arc::clone(&stats),
        );
        Fixture {
            work_tx,
            discovery_rx,
            sink,
            fetched,
            closed,
            stats,
            handle,
        }
    }

    #[tokio::test]
    async fn accepted_listing_is_written_and_discoveries_published() {
        let mut pages = HashMap::new();
        pages.insert(
            "A".to_string(),
            (full_record("Action"), vec!["B".to_string()]),
        );
        let fixture = spawn_fixture(pages, false, Duration::from_secs(5));

        fixture.work_tx.send("A".to_string()).await.unwrap();
        drop(fixture.work_tx);
        fixture.handle.await.unwrap();

        let rows = fixture.sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Action");
        assert_eq!(rows[0][1], "A");
        assert_eq!(
            fixture.discovery_rx.try_recv().unwrap().as_deref(),
            Some("B")
        );
        assert!(fixture.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn category_rejection_suppresses_output_and_discovery() {
        let mut pages = HashMap::new();
        pages.insert(
            "A".to_string(),
            (full_record("Weather"), vec!["B".to_string()]),
        );
        let fixture = spawn_fixture(pages, false, Duration::from_secs(5));

        fixture.work_tx.send("A".to_string()).await.unwrap();
        drop(fixture.work_tx);
        fixture.handle.await.unwrap();

        assert!(fixture.sink.rows().is_empty());
        assert!(fixture.discovery_rx.try_recv().unwrap().is_none());
        assert_eq!(fixture.stats.records_rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multi_word_category_is_normalized_before_the_gate() {
        let mut pages = HashMap::new();
        pages.insert("A".to_string(), (full_record("Role Playing"), vec![]));
        let fixture = spawn_fixture(pages, false, Duration::from_secs(5));

        fixture.work_tx.send("A".to_string()).await.unwrap();
        drop(fixture.work_tx);
        fixture.handle.await.unwrap();

        let rows = fixture.sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Role_Playing");
    }

    #[tokio::test]
    async fn strict_rejection_still_publishes_discoveries() {
        let mut record = full_record("Action");
        record.remove("Updated");
        let mut pages = HashMap::new();
        pages.insert("A".to_string(), (record, vec!["X".to_string()]));
        let fixture = spawn_fixture(pages, true, Duration::from_secs(5));

        fixture.work_tx.send("A".to_string()).await.unwrap();
        drop(fixture.work_tx);
        fixture.handle.await.unwrap();

        assert!(fixture.sink.rows().is_empty());
        assert_eq!(
            fixture.discovery_rx.try_recv().unwrap().as_deref(),
            Some("X")
        );
        assert_eq!(fixture.stats.records_rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_skipped_without_discovery() {
        let fixture = spawn_fixture(HashMap::new(), false, Duration::from_secs(5));

        fixture.work_tx.send("gone".to_string()).await.unwrap();
        drop(fixture.work_tx);
        fixture.handle.await.unwrap();

        assert_eq!(fixture.fetched.lock().unwrap().as_slice(), ["gone"]);
        assert!(fixture.sink.rows().is_empty());
        assert!(fixture.discovery_rx.try_recv().unwrap().is_none());
        assert_eq!(fixture.stats.fetches_failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_shuts_itself_down() {
        let fixture = spawn_fixture(HashMap::new(), false, Duration::from_secs(120));

        fixture.handle.await.unwrap();
        assert!(fixture.closed.load(Ordering::SeqCst));
        assert!(fixture.fetched.lock().unwrap().is_empty());
        drop(fixture.work_tx);
    }
}
