// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Execution Context
//!
//! Carries cancellation and per-execution statistics. Nothing here is
//! process-wide: two executions with separate contexts never observe each
//! other's counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::{Error, Result};

/// Execution context for one query execution
///
/// Cloning is cheap and shares the cancellation flag and the statistics.
/// [`child_scope`](Self::child_scope) derives a context that is cancelled
/// whenever its parent is, but can also be cancelled on its own without
/// touching the parent. The scheduler uses one child scope per CTE level so a
/// faulting task can stop its siblings while the caller's token stays clean.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Cancellation flag of this scope
    cancelled: Arc<AtomicBool>,
    /// Flags of enclosing scopes, outermost first
    ancestors: Arc<[Arc<AtomicBool>]>,
    /// Counters shared by every scope of the execution
    stats: Arc<ExecutionStats>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            ancestors: Arc::from(Vec::new()),
            stats: Arc::new(ExecutionStats::default()),
        }
    }

    /// Derive a scope that observes this context's cancellation
    pub fn child_scope(&self) -> Self {
        let mut ancestors: Vec<Arc<AtomicBool>> = self.ancestors.to_vec();
        ancestors.push(Arc::clone(&self.cancelled));
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            ancestors: Arc::from(ancestors),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Check if this scope or any enclosing scope has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.ancestors.iter().any(|f| f.load(Ordering::Acquire))
    }

    /// Cancel this scope and every scope derived from it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Get a cancellation handle that can be used from another thread
    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Check for cancellation and return an error if cancelled
    #[inline]
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::QueryCancelled)
        } else {
            Ok(())
        }
    }

    /// Statistics of this execution
    #[inline]
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }
}

/// Handle for cancelling a query from another thread
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Cancel the query
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if the query has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Counters updated during one execution
#[derive(Debug, Default)]
pub struct ExecutionStats {
    rows_scanned: AtomicU64,
    source_scans: AtomicU64,
    ctes_materialized: AtomicU64,
    partitions: AtomicU64,
    cse_stores: AtomicU64,
    cse_hits: AtomicU64,
    groups_created: AtomicU64,
}

impl ExecutionStats {
    #[inline]
    pub(crate) fn record_scan(&self, rows: usize) {
        self.source_scans.fetch_add(1, Ordering::Relaxed);
        self.rows_scanned.fetch_add(rows as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cte(&self) {
        self.ctes_materialized.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_partition(&self) {
        self.partitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Flush a partition's local slot counters
    #[inline]
    pub(crate) fn record_cse(&self, stores: u64, hits: u64) {
        if stores > 0 {
            self.cse_stores.fetch_add(stores, Ordering::Relaxed);
        }
        if hits > 0 {
            self.cse_hits.fetch_add(hits, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_groups(&self, created: usize) {
        self.groups_created.fetch_add(created as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rows_scanned: self.rows_scanned.load(Ordering::Relaxed),
            source_scans: self.source_scans.load(Ordering::Relaxed),
            ctes_materialized: self.ctes_materialized.load(Ordering::Relaxed),
            partitions: self.partitions.load(Ordering::Relaxed),
            cse_stores: self.cse_stores.load(Ordering::Relaxed),
            cse_hits: self.cse_hits.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ExecutionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Rows returned by row sources
    pub rows_scanned: u64,
    /// Row source invocations
    pub source_scans: u64,
    /// CTEs whose results were published
    pub ctes_materialized: u64,
    /// Row partitions evaluated (one per block when not split)
    pub partitions: u64,
    /// Cached subexpressions computed
    pub cse_stores: u64,
    /// Cached subexpressions reused
    pub cse_hits: u64,
    /// Groups created, ancestors included
    pub groups_created: u64,
}
