//! Counters for template CRUD calls and traversals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hooks for counting template operations.
///
/// Implementations must be cheap; they run inline on every CRUD call and for
/// every row a template traversal visits.
pub trait TemplateMetrics: Send + Sync {
    /// A `load` finished; `hit` tells whether a row was found.
    fn row_loaded(&self, hit: bool);

    /// An `insert` succeeded.
    fn row_inserted(&self);

    /// An `update` finished; `hit` tells whether a row was replaced.
    fn row_updated(&self, hit: bool);

    /// An `insert_or_update` finished; `updated` is false when it inserted.
    fn row_upserted(&self, updated: bool);

    /// A `delete` finished; `hit` tells whether a row was removed.
    fn row_deleted(&self, hit: bool);

    /// A traversal was opened.
    fn traversal_opened(&self, secondary: bool, write: bool);

    /// A traversal handed a row to caller code.
    fn row_visited(&self);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl TemplateMetrics for NoopMetrics {
    fn row_loaded(&self, _hit: bool) {}
    fn row_inserted(&self) {}
    fn row_updated(&self, _hit: bool) {}
    fn row_upserted(&self, _updated: bool) {}
    fn row_deleted(&self, _hit: bool) {}
    fn traversal_opened(&self, _secondary: bool, _write: bool) {}
    fn row_visited(&self) {}
}

/// Atomic counters for every hook.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    /// Loads that found a row.
    pub load_hits: AtomicU64,
    /// Loads that found nothing.
    pub load_misses: AtomicU64,
    /// Successful inserts.
    pub inserts: AtomicU64,
    /// Updates that replaced a row.
    pub update_hits: AtomicU64,
    /// Updates that found nothing.
    pub update_misses: AtomicU64,
    /// Upserts that updated an existing row.
    pub upsert_updates: AtomicU64,
    /// Upserts that inserted a new row.
    pub upsert_inserts: AtomicU64,
    /// Deletes that removed a row.
    pub delete_hits: AtomicU64,
    /// Deletes that found nothing.
    pub delete_misses: AtomicU64,
    /// Traversals over a clustered index.
    pub primary_traversals: AtomicU64,
    /// Traversals over a secondary index.
    pub secondary_traversals: AtomicU64,
    /// Traversals opened in write mode.
    pub write_traversals: AtomicU64,
    /// Rows handed to traversal callbacks.
    pub rows_visited: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl TemplateMetrics for CounterMetrics {
    fn row_loaded(&self, hit: bool) {
        bump(if hit { &self.load_hits } else { &self.load_misses });
    }

    fn row_inserted(&self) {
        bump(&self.inserts);
    }

    fn row_updated(&self, hit: bool) {
        bump(if hit { &self.update_hits } else { &self.update_misses });
    }

    fn row_upserted(&self, updated: bool) {
        bump(if updated {
            &self.upsert_updates
        } else {
            &self.upsert_inserts
        });
    }

    fn row_deleted(&self, hit: bool) {
        bump(if hit { &self.delete_hits } else { &self.delete_misses });
    }

    fn traversal_opened(&self, secondary: bool, write: bool) {
        bump(if secondary {
            &self.secondary_traversals
        } else {
            &self.primary_traversals
        });
        if write {
            bump(&self.write_traversals);
        }
    }

    fn row_visited(&self) {
        bump(&self.rows_visited);
    }
}

/// The default metrics sink, [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn TemplateMetrics> {
    Arc::new(NoopMetrics)
}
