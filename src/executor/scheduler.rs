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

//! CTE level scheduler
//!
//! CTEs are grouped into levels: every CTE depends only on CTEs of earlier
//! levels. In parallel mode the CTEs of one level run concurrently on the
//! current rayon pool, and the next level starts only after the whole level
//! is published. In sequential mode CTEs run one at a time in declaration
//! order.
//!
//! Fault handling per level:
//!
//! - the first error (or panic) is kept and the level's scope is cancelled,
//!   so siblings stop at their next cancellation check
//! - cancellations a sibling observes because of that fault are dropped
//! - nothing of a failed level is published, and no later level starts

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::core::{Error, Result};

use super::context::ExecutionContext;
use super::cte::CteRegistry;
use super::parallel::{panic_message, record_fault};
use super::result::ResultTable;

/// A unit of CTE work the scheduler can run
pub trait CteTask: Sync {
    /// CTE name, used in errors and for publication
    fn name(&self) -> &str;

    /// Compute the CTE's rows, reading earlier CTEs from `ctes`
    fn materialize(&self, ctes: &CteRegistry, ctx: &ExecutionContext) -> Result<ResultTable>;
}

/// Runs CTE tasks level by level
#[derive(Debug, Clone, Copy)]
pub struct LevelScheduler {
    parallel: bool,
}

impl LevelScheduler {
    /// Scheduler running the CTEs of a level concurrently
    pub fn parallel() -> Self {
        Self { parallel: true }
    }

    /// Scheduler running CTEs one at a time in declaration order
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    /// True if levels run concurrently
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Materialize every task into `registry`
    ///
    /// `levels` and `order` hold indices into `tasks`. On error the registry
    /// holds exactly the CTEs of the levels that completed before the fault.
    pub fn run<T: CteTask>(
        &self,
        tasks: &[T],
        levels: &[Vec<usize>],
        order: &[usize],
        ctx: &ExecutionContext,
        registry: &mut CteRegistry,
    ) -> Result<()> {
        if self.parallel {
            for (level_no, level) in levels.iter().enumerate() {
                self.run_level(tasks, level_no, level, ctx, registry)?;
            }
        } else {
            for &idx in order {
                ctx.check_cancelled()?;
                let task = Self::task(tasks, idx)?;
                let table = run_task(task, registry, ctx)?;
                registry.store(task.name(), table);
                ctx.stats().record_cte();
            }
        }
        Ok(())
    }

    fn task<T>(tasks: &[T], idx: usize) -> Result<&T> {
        tasks
            .get(idx)
            .ok_or_else(|| Error::internal(format!("no CTE task at index {}", idx)))
    }

    fn run_level<T: CteTask>(
        &self,
        tasks: &[T],
        level_no: usize,
        level: &[usize],
        ctx: &ExecutionContext,
        registry: &mut CteRegistry,
    ) -> Result<()> {
        ctx.check_cancelled()?;
        let start = Instant::now();
        let level_ctx = ctx.child_scope();
        let first_fault: Mutex<Option<Error>> = Mutex::new(None);

        let finished: Vec<(usize, ResultTable)> = {
            let published: &CteRegistry = registry;
            level
                .par_iter()
                .filter_map(|&idx| {
                    let outcome =
                        Self::task(tasks, idx).and_then(|t| run_task(t, published, &level_ctx));
                    match outcome {
                        Ok(table) => Some((idx, table)),
                        Err(err) => {
                            record_fault(&first_fault, &level_ctx, err);
                            None
                        }
                    }
                })
                .collect()
        };

        if let Some(err) = first_fault.into_inner() {
            tracing::debug!(level = level_no, "level aborted; nothing published");
            return Err(err);
        }
        ctx.check_cancelled()?;
        if finished.len() != level.len() {
            return Err(Error::concurrency_invariant(format!(
                "level {} finished {} of {} CTEs without a fault",
                level_no,
                finished.len(),
                level.len()
            )));
        }

        for (idx, table) in finished {
            let task = Self::task(tasks, idx)?;
            registry.store(task.name(), table);
            ctx.stats().record_cte();
        }
        tracing::debug!(
            level = level_no,
            ctes = level.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "level published"
        );
        Ok(())
    }
}

/// Run one task, turning a panic into an error
fn run_task<T: CteTask>(task: &T, ctes: &CteRegistry, ctx: &ExecutionContext) -> Result<ResultTable> {
    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| task.materialize(ctes, ctx)));
    match outcome {
        Ok(Ok(table)) => {
            tracing::trace!(
                cte = task.name(),
                rows = table.row_count(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "CTE materialized"
            );
            Ok(table)
        }
        Ok(Err(err)) => Err(Error::cte_failed(task.name(), err)),
        Err(payload) => Err(Error::task_panicked(task.name(), panic_message(&*payload))),
    }
}
