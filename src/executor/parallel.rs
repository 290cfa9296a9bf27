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

//! Parallel row partitions
//!
//! A relation at or above the row threshold is split into fixed-size
//! partitions that run on the current rayon pool. Partitions share one
//! cancellation scope: the first partition to fail cancels the rest, and
//! only that first fault is reported. Cancellation is checked when a
//! partition starts.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::core::{Error, Result, Row};
use crate::optimizer::{CompilationOptions, ParallelizationMode};

use super::context::ExecutionContext;

/// How a relation's rows are split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioning {
    enabled: bool,
    threshold: usize,
    chunk_size: usize,
}

impl Partitioning {
    /// Read the partitioning settings once, at compile time
    pub fn from_options(options: &CompilationOptions) -> Self {
        Self {
            enabled: options.parallelization == ParallelizationMode::Full,
            threshold: options.parallel_row_threshold,
            chunk_size: options.chunk_size.max(1),
        }
    }

    /// Never split
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            threshold: usize::MAX,
            chunk_size: usize::MAX,
        }
    }

    /// True if `rows` rows are split into several partitions
    #[inline]
    pub fn should_split(&self, rows: usize) -> bool {
        self.enabled && rows >= self.threshold && rows > self.chunk_size
    }

    /// Rows per partition
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Run `f` over the partitions of `rows`
///
/// `f` receives the partition and the partition scope's context. Every
/// partition runs to completion or stops at a cancellation; the caller
/// sees `Ok` only if every partition succeeded.
pub fn run_partitions<F>(
    rows: &[Row],
    partitioning: Partitioning,
    ctx: &ExecutionContext,
    f: F,
) -> Result<()>
where
    F: Fn(&[Row], &ExecutionContext) -> Result<()> + Sync,
{
    if !partitioning.should_split(rows.len()) {
        ctx.check_cancelled()?;
        ctx.stats().record_partition();
        return f(rows, ctx);
    }

    let scope = ctx.child_scope();
    let first_fault: Mutex<Option<Error>> = Mutex::new(None);

    rows.par_chunks(partitioning.chunk_size())
        .for_each(|chunk| {
            if scope.is_cancelled() {
                return;
            }
            scope.stats().record_partition();
            let outcome = catch_unwind(AssertUnwindSafe(|| f(chunk, &scope)));
            let err = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(payload) => Error::task_panicked("row partition", panic_message(&*payload)),
            };
            record_fault(&first_fault, &scope, err);
        });

    if let Some(err) = first_fault.into_inner() {
        return Err(err);
    }
    ctx.check_cancelled()
}

/// Keep the first real fault of a scope and cancel the scope
///
/// Cancellations are dropped: they are either the echo of a fault already
/// recorded or the caller's own cancellation, which the caller reports.
pub(crate) fn record_fault(slot: &Mutex<Option<Error>>, scope: &ExecutionContext, err: Error) {
    if err.is_cancelled() {
        return;
    }
    let mut slot = slot.lock();
    if slot.is_none() {
        tracing::warn!(error = %err, "parallel task failed; cancelling its siblings");
        *slot = Some(err);
        scope.cancel();
    } else {
        tracing::debug!(error = %err, "secondary fault dropped");
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rows(n: i64) -> Vec<Row> {
        (0..n).map(|i| crate::row![i]).collect()
    }

    fn split(threshold: usize, chunk: usize) -> Partitioning {
        Partitioning::from_options(
            &CompilationOptions::default()
                .with_parallel_row_threshold(threshold)
                .with_chunk_size(chunk),
        )
    }

    #[test]
    fn test_should_split() {
        let p = split(100, 10);
        assert!(!p.should_split(99));
        assert!(p.should_split(100));
        assert!(!Partitioning::sequential().should_split(usize::MAX - 1));
        assert!(!Partitioning::from_options(&CompilationOptions::sequential()).should_split(1 << 20));
    }

    #[test]
    fn test_every_row_visited_once() {
        let data = rows(10_000);
        let seen = AtomicUsize::new(0);
        let ctx = ExecutionContext::new();
        run_partitions(&data, split(1000, 128), &ctx, |chunk, _| {
            seen.fetch_add(chunk.len(), Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 10_000);
        assert_eq!(ctx.stats().snapshot().partitions, 79);
    }

    #[test]
    fn test_first_fault_reported_once() {
        let data = rows(5_000);
        let ctx = ExecutionContext::new();
        let err = run_partitions(&data, split(100, 100), &ctx, |chunk, scope| {
            scope.check_cancelled()?;
            if chunk.iter().any(|r| r[0] == crate::core::Value::from(2_500)) {
                return Err(Error::DivisionByZero);
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err, Error::DivisionByZero);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_partition_panic() {
        let data = rows(1_000);
        let ctx = ExecutionContext::new();
        let err = run_partitions(&data, split(10, 10), &ctx, |chunk, _| {
            if chunk[0][0] == crate::core::Value::from(500) {
                panic!("bad row");
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err, Error::task_panicked("row partition", "bad row"));
    }
}
