//! Chunked atomic batches.
//!
//! Writes and deletes accumulate in one pending batch. When the batch
//! reaches the chunk size it is committed and replaced by an empty one.

use crate::config::clamp_chunk;
use crate::models::Document;
use crate::observability::{BATCH_COMMITS, DOCUMENTS_DELETED, DOCUMENTS_WRITTEN};
use crate::storage::{DocumentStore, WriteOp};
use crate::Result;
use std::sync::Arc;

/// Counts accumulated by a [`BatchWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Documents set, including those never committed in a dry run.
    pub written: usize,
    /// Documents deleted, including those never committed in a dry run.
    pub deleted: usize,
    /// Batches committed.
    pub commits: usize,
}

/// Accumulates write operations and commits them in chunks.
pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
    chunk: usize,
    dry_run: bool,
    pending: Vec<WriteOp>,
    stats: BatchStats,
}

impl BatchWriter {
    /// Creates a batch writer. The chunk size is clamped to `1..=500`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, chunk: usize) -> Self {
        let chunk = clamp_chunk(chunk);
        Self {
            store,
            chunk,
            dry_run: false,
            pending: Vec::with_capacity(chunk),
            stats: BatchStats::default(),
        }
    }

    /// Enables dry run: operations are counted and logged, never committed.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Returns the effective chunk size.
    #[must_use]
    pub const fn chunk(&self) -> usize {
        self.chunk
    }

    /// Returns the number of operations waiting for a commit.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the counts so far.
    #[must_use]
    pub const fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Enqueues a set.
    ///
    /// # Errors
    ///
    /// Returns an error if this fills the batch and the commit fails.
    pub fn set(&mut self, path: impl Into<String>, fields: Document, merge: bool) -> Result<()> {
        self.push(WriteOp::Set {
            path: path.into(),
            fields,
            merge,
        })
    }

    /// Enqueues a delete.
    ///
    /// # Errors
    ///
    /// Returns an error if this fills the batch and the commit fails.
    pub fn delete(&mut self, path: impl Into<String>) -> Result<()> {
        self.push(WriteOp::Delete { path: path.into() })
    }

    /// Enqueues an operation, committing when the chunk is full.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn push(&mut self, op: WriteOp) -> Result<()> {
        if op.is_delete() {
            self.stats.deleted += 1;
        } else {
            self.stats.written += 1;
        }
        self.pending.push(op);
        if self.pending.len() >= self.chunk {
            self.commit()?;
        }
        Ok(())
    }

    /// Commits whatever is pending. An empty batch is not committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.commit()
    }

    /// Flushes and returns the final counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the final commit fails.
    pub fn finish(mut self) -> Result<BatchStats> {
        self.flush()?;
        Ok(self.stats)
    }

    fn commit(&mut self) -> Result<()> {
        let ops = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk));
        if self.dry_run {
            tracing::info!(operations = ops.len(), "Dry run, batch not committed");
            return Ok(());
        }

        let deletes = ops.iter().filter(|op| op.is_delete()).count();
        self.store.commit(&ops)?;
        self.stats.commits += 1;

        metrics::counter!(BATCH_COMMITS, "backend" => self.store.name()).increment(1);
        metrics::counter!(DOCUMENTS_WRITTEN, "backend" => self.store.name())
            .increment((ops.len() - deletes) as u64);
        metrics::counter!(DOCUMENTS_DELETED, "backend" => self.store.name())
            .increment(deletes as u64);
        tracing::debug!(
            operations = ops.len(),
            commits = self.stats.commits,
            "Batch committed"
        );
        Ok(())
    }
}
