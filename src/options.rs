//! Template configuration.

use std::fmt;
use std::sync::Arc;

use crate::engine::{SearchMode, TransactionLevel};
use crate::metrics::{default_metrics, TemplateMetrics};

/// Configuration supplied when building a [`crate::template::Template`].
#[derive(Clone)]
pub struct TemplateOptions {
    /// Isolation level used by `Template::in_transaction`.
    pub isolation: TransactionLevel,
    /// Search mode for traversal specs that do not set one.
    pub default_search_mode: SearchMode,
    /// Metrics sink for CRUD calls and traversals.
    pub metrics: Arc<dyn TemplateMetrics>,
}

impl TemplateOptions {
    /// Repeatable-read transactions, greater-or-equal positioning, no metrics.
    pub fn new() -> Self {
        Self {
            isolation: TransactionLevel::RepeatableRead,
            default_search_mode: SearchMode::GreaterOrEqual,
            metrics: default_metrics(),
        }
    }

    /// Sets the isolation level for template-managed transactions.
    pub fn isolation(mut self, level: TransactionLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Sets the fallback search mode for traversals.
    pub fn default_search_mode(mut self, mode: SearchMode) -> Self {
        self.default_search_mode = mode;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn TemplateMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TemplateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateOptions")
            .field("isolation", &self.isolation)
            .field("default_search_mode", &self.default_search_mode)
            .finish_non_exhaustive()
    }
}
