//! # Record Module
//!
//! Projects parsed attribute records into fixed-schema output rows and
//! buffers them toward an append-only sink.
//!
//! ## Overview
//!
//! Every accepted listing becomes one [`OutputRow`]: the values of the
//! [`OUTPUT_FIELDS`] schema, in order. Two field classes exist: required
//! fields, whose absence is a defect (rejected in strict mode, emitted as
//! an empty cell otherwise), and trivial fields ([`TRIVIAL_FIELDS`]), whose
//! absence is routine and replaced by a `???` placeholder. Embedded
//! newlines are flattened to spaces so one row stays one line.
//!
//! [`RecordWriter`] buffers projected rows and appends them to its
//! [`OutputSink`] every `flush_every` rows, bounding both memory and the
//! number of rows a crash can lose. Each worker owns its own writer and
//! sink, so there is no cross-writer contention anywhere in the output
//! path.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{HarvestError, RowError};
use crate::source::AttributeRecord;

/// The output schema: every row carries exactly these fields, in this order.
pub const OUTPUT_FIELDS: [&str; 22] = [
    "Category",
    "Package",
    "Name",
    "Updated",
    "Size",
    "Installs",
    "Requires_Android",
    "Age",
    "Developer",
    "Rating",
    "Rating_Total",
    "Rating_5",
    "Rating_4",
    "Rating_3",
    "Rating_2",
    "Rating_1",
    "Price",
    "Description",
    "Content_Feature",
    "Permission",
    "Inapp_Products",
    "Version",
];

/// Fields whose absence is routine; they get [`MISSING_PLACEHOLDER`]
/// instead of counting against the record.
pub const TRIVIAL_FIELDS: [&str; 2] = ["Permission", "Inapp_Products"];

/// Placeholder written for an absent trivial field.
pub const MISSING_PLACEHOLDER: &str = "???";

// Records with fewer populated fields than this are too sparse to keep,
// strict mode or not.
const MIN_POPULATED_FIELDS: usize = 10;

/// One fixed-schema output row, values ordered as in [`OUTPUT_FIELDS`].
pub type OutputRow = Vec<String>;

/// Projects an attribute record into an [`OutputRow`] for `identifier`.
///
/// Trivial fields default to the placeholder, the `Package` column is
/// filled from the dispatched identifier, and newlines are normalized to
/// spaces. Sparse records are rejected outright; in strict mode any empty
/// required field rejects the row, naming the first offender in schema
/// order.
pub fn project(
    record: &AttributeRecord,
    identifier: &str,
    strict: bool,
) -> Result<OutputRow, RowError> {
    let mut filled = record.clone();
    for field in TRIVIAL_FIELDS {
        filled
            .entry(field.to_string())
            .or_insert_with(|| MISSING_PLACEHOLDER.to_string());
    }
    filled.insert("Package".to_string(), identifier.to_string());

    if filled.len() < MIN_POPULATED_FIELDS {
        return Err(RowError::TooSparse {
            identifier: identifier.to_string(),
            present: filled.len(),
        });
    }

    let row: OutputRow = OUTPUT_FIELDS
        .iter()
        .map(|field| {
            filled
                .get(*field)
                .map(|value| value.replace('\n', " "))
                .unwrap_or_default()
        })
        .collect();

    if strict {
        if let Some(missing) = row.iter().position(|value| value.is_empty()) {
            return Err(RowError::MissingRequired {
                identifier: identifier.to_string(),
                field: OUTPUT_FIELDS[missing].to_string(),
            });
        }
    }

    Ok(row)
}

/// Durable, append-only destination for output rows.
///
/// One sink instance belongs to exactly one worker; implementations need
/// not be safe against concurrent appends.
#[async_trait]
pub trait OutputSink: Send + 'static {
    async fn append(&mut self, rows: &[OutputRow]) -> Result<(), HarvestError>;
}

/// What happened to a record offered to a [`RecordWriter`].
#[derive(Debug)]
pub enum PushOutcome {
    /// Row accepted and buffered.
    Buffered,
    /// Row accepted; the buffer reached the flush period and was appended.
    Flushed,
    /// Row failed projection and was dropped.
    Rejected(RowError),
}

/// Buffers projected rows and appends them to the sink every
/// `flush_every` accepted rows.
pub struct RecordWriter<S: OutputSink> {
    sink: S,
    buffer: Vec<OutputRow>,
    flush_every: usize,
    strict: bool,
}

impl<S: OutputSink> RecordWriter<S> {
    pub fn new(sink: S, flush_every: usize, strict: bool) -> Self {
        RecordWriter {
            sink,
            buffer: Vec::new(),
            flush_every,
            strict,
        }
    }

    /// Projects and buffers one record, flushing if the period is reached.
    ///
    /// A projection failure is reported in the outcome, not as an error;
    /// only a sink append failure is an `Err`.
    pub async fn push(
        &mut self,
        record: &AttributeRecord,
        identifier: &str,
    ) -> Result<PushOutcome, HarvestError> {
        let row = match project(record, identifier, self.strict) {
            Ok(row) => row,
            Err(e) => return Ok(PushOutcome::Rejected(e)),
        };
        self.buffer.push(row);
        if self.buffer.len() >= self.flush_every {
            self.flush().await?;
            return Ok(PushOutcome::Flushed);
        }
        Ok(PushOutcome::Buffered)
    }

    /// Appends all buffered rows to the sink. The buffer is kept on
    /// failure so a later flush can retry.
    pub async fn flush(&mut self) -> Result<(), HarvestError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.sink.append(&self.buffer).await?;
        self.buffer.clear();
        Ok(())
    }

    /// Flushes whatever remains. Called once when the owning worker exits.
    pub async fn close(&mut self) -> Result<(), HarvestError> {
        self.flush().await
    }
}

/// Appends rows to a CSV file, one line per row, no header.
///
/// The file is opened in append mode so successive runs accumulate into
/// the same per-worker file.
pub struct CsvSink {
    writer: csv::Writer<std::fs::File>,
}

impl CsvSink {
    pub fn create<P: AsRef<std::path::Path>>(path: P) -> Result<Self, HarvestError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(CsvSink {
            writer: csv::WriterBuilder::new().from_writer(file),
        })
    }
}

#[async_trait]
impl OutputSink for CsvSink {
    async fn append(&mut self, rows: &[OutputRow]) -> Result<(), HarvestError> {
        for row in rows {
            self.writer.write_record(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects rows in memory. Useful for tests and dry runs; the handle is
/// cheaply cloneable so callers can inspect what a worker wrote.
#[derive(Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<OutputRow>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<OutputRow> {
        self.rows.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn append(&mut self, rows: &[OutputRow]) -> Result<(), HarvestError> {
        self.rows
            .lock()
            .expect("sink lock poisoned")
            .extend_from_slice(rows);
        Ok(())
    }
}
