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

//! Error Propagation Tests
//!
//! A failed execution returns exactly one error and no rows; later levels
//! never start, and sibling cancellations never replace the first fault.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quarry::plan::{call, col, lit, BoundPlan, CteDefinition, Query, SelectQuery};
use quarry::storage::{FnSource, SourceCatalog};
use quarry::{
    row, CompilationOptions, Error, ExecutionContext, Executor, FunctionRegistry, Row,
};

fn rows(n: i64) -> Vec<Row> {
    (0..n).map(|i| row![i]).collect()
}

/// Source that waits, counts its invocation and returns `n` rows
fn source(name: &str, delay: Duration, n: i64, calls: &Arc<AtomicUsize>) -> FnSource {
    let calls = Arc::clone(calls);
    FnSource::new(name, &["x"], move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(delay);
        Ok(rows(n))
    })
}

fn failing_source(name: &str, delay: Duration, message: &'static str) -> FnSource {
    FnSource::new(name, &["x"], move |_| {
        thread::sleep(delay);
        Err(Error::invalid_argument(message))
    })
}

/// Level 0: ok1, ok2, bad; level 1: dependent (reads ok1 and the tail source)
fn two_level_plan() -> BoundPlan {
    BoundPlan::new(
        vec![
            CteDefinition::new("ok1", SelectQuery::from("slow1").select(col("x"))),
            CteDefinition::new("ok2", SelectQuery::from("slow2").select(col("x"))),
            CteDefinition::new("bad", SelectQuery::from("broken").select(col("x"))),
            CteDefinition::new(
                "dependent",
                Query::from(SelectQuery::from("ok1").select(col("x")))
                    .union_all(SelectQuery::from("tail").select(col("x"))),
            ),
        ],
        Query::from(SelectQuery::from("dependent").select(col("x")))
            .union_all(SelectQuery::from("ok2").select(col("x")))
            .union_all(SelectQuery::from("bad").select(col("x"))),
    )
}

#[test]
fn test_first_fault_aborts_the_plan() {
    let slow_calls = Arc::new(AtomicUsize::new(0));
    let tail_calls = Arc::new(AtomicUsize::new(0));
    let mut catalog = SourceCatalog::new();
    catalog.register(source("slow1", Duration::from_millis(30), 100, &slow_calls));
    catalog.register(source("slow2", Duration::from_millis(30), 100, &slow_calls));
    catalog.register(failing_source("broken", Duration::ZERO, "broken source"));
    catalog.register(source("tail", Duration::ZERO, 1, &tail_calls));

    for options in [CompilationOptions::default(), CompilationOptions::sequential()] {
        let parallel = options.parallel_ctes();
        let executor = Executor::new(catalog.clone()).with_options(options);
        let compiled = executor.compile(&two_level_plan()).unwrap();
        assert_eq!(compiled.levels().len(), 2);

        let ctx = ExecutionContext::new();
        let err = compiled.execute(&ctx).unwrap_err();
        assert!(err.is_task_fault(), "unexpected error {:?}", err);
        match &err {
            Error::CteFailed { cte, reason } => {
                assert_eq!(cte, "bad");
                assert_eq!(**reason, Error::invalid_argument("broken source"));
            }
            other => panic!("expected CteFailed, got {:?}", other),
        }

        // The caller's token is untouched; a faulting level publishes nothing,
        // while sequential mode has already finished the CTEs declared first
        assert!(!ctx.is_cancelled());
        let published = ctx.stats().snapshot().ctes_materialized;
        assert_eq!(published, if parallel { 0 } else { 2 });
    }
    assert_eq!(tail_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_one_error_when_several_ctes_fail() {
    let mut catalog = SourceCatalog::new();
    for i in 0..6 {
        catalog.register(failing_source(
            &format!("broken{}", i),
            Duration::from_millis(5 * i as u64),
            "broken source",
        ));
    }
    let ctes: Vec<CteDefinition> = (0..6)
        .map(|i| {
            CteDefinition::new(
                format!("c{}", i),
                SelectQuery::from(format!("broken{}", i)).select(col("x")),
            )
        })
        .collect();
    let mut query = Query::from(SelectQuery::from("c0").select(col("x")));
    for i in 1..6 {
        query = query.union_all(SelectQuery::from(format!("c{}", i)).select(col("x")));
    }

    let executor = Executor::new(catalog).with_options(CompilationOptions::default().with_max_threads(6));
    for _ in 0..10 {
        let err = executor.execute(&BoundPlan::new(ctes.clone(), query.clone())).unwrap_err();
        assert!(!err.is_cancelled());
        assert!(matches!(err, Error::CteFailed { .. }));
    }
}

#[test]
fn test_panicking_source_is_captured() {
    let mut catalog = SourceCatalog::new();
    catalog.register(FnSource::new("explodes", &["x"], |_| -> quarry::Result<Vec<Row>> {
        panic!("source exploded")
    }));
    let plan = BoundPlan::new(
        vec![CteDefinition::new("c", SelectQuery::from("explodes").select(col("x")))],
        SelectQuery::from("c").select(col("x")),
    );
    let err = Executor::new(catalog).execute(&plan).unwrap_err();
    assert!(err.is_task_fault());
    match err {
        Error::TaskPanicked { task, message } => {
            assert_eq!(task, "c");
            assert!(message.contains("source exploded"));
        }
        other => panic!("expected TaskPanicked, got {:?}", other),
    }
}

#[test]
fn test_panicking_function_in_a_partition() {
    let registry = FunctionRegistry::new();
    registry.register_fn("check", true, |args| {
        if args[0] == quarry::Value::from(7_777) {
            panic!("bad row");
        }
        Ok(args[0].clone())
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let mut catalog = SourceCatalog::new();
    catalog.register(source("big", Duration::ZERO, 20_000, &calls));

    let executor = Executor::new(catalog)
        .with_functions(Arc::new(registry))
        .with_options(
            CompilationOptions::default()
                .with_parallel_row_threshold(1_000)
                .with_chunk_size(500)
                .with_max_threads(4),
        );
    let plan = BoundPlan::simple(SelectQuery::from("big").select(call("check", vec![col("x")])));
    let err = executor.execute(&plan).unwrap_err();
    assert!(matches!(err, Error::TaskPanicked { .. }));
}

#[test]
fn test_cancelled_before_start() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut catalog = SourceCatalog::new();
    catalog.register(source("t", Duration::ZERO, 10, &calls));
    let plan = BoundPlan::new(
        vec![CteDefinition::new("c", SelectQuery::from("t").select(col("x")))],
        SelectQuery::from("c").select(col("x")),
    );
    let compiled = Executor::new(catalog).compile(&plan).unwrap();

    let ctx = ExecutionContext::new();
    ctx.cancellation_handle().cancel();
    assert_eq!(compiled.execute(&ctx).unwrap_err(), Error::QueryCancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancelled_between_levels() {
    let ctx = ExecutionContext::new();
    let handle = ctx.cancellation_handle();
    let later_calls = Arc::new(AtomicUsize::new(0));

    let mut catalog = SourceCatalog::new();
    catalog.register(FnSource::new("first", &["x"], move |_| {
        handle.cancel();
        Ok(rows(3))
    }));
    catalog.register(source("second", Duration::ZERO, 3, &later_calls));

    let plan = BoundPlan::new(
        vec![
            CteDefinition::new("a", SelectQuery::from("first").select(col("x"))),
            CteDefinition::new(
                "b",
                Query::from(SelectQuery::from("a").select(col("x")))
                    .union_all(SelectQuery::from("second").select(col("x"))),
            ),
        ],
        SelectQuery::from("b").select(col("x")),
    );
    let err = Executor::new(catalog).compile(&plan).unwrap().execute(&ctx).unwrap_err();
    assert_eq!(err, Error::QueryCancelled);
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_runtime_arithmetic_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut catalog = SourceCatalog::new();
    catalog.register(source("t", Duration::ZERO, 10, &calls));
    let executor = Executor::new(catalog);

    let plan = BoundPlan::simple(SelectQuery::from("t").select(lit(10).div(col("x"))));
    assert_eq!(executor.execute(&plan).unwrap_err(), Error::DivisionByZero);

    let plan = BoundPlan::simple(
        SelectQuery::from("t").select(lit(i64::MAX).add(col("x"))),
    );
    assert!(matches!(
        executor.execute(&plan).unwrap_err(),
        Error::NumericOverflow(_)
    ));
}
