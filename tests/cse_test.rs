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

//! Common Subexpression Elimination Tests
//!
//! A deterministic function repeated across WHERE, SELECT and CASE runs once
//! per row, branches that are not taken stay unevaluated, and the output
//! matches execution without caching.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quarry::plan::{call, case_when, col, lit, sum, volatile_call, BoundPlan, SelectQuery};
use quarry::storage::{MemoryTable, SourceCatalog};
use quarry::{
    row, CompilationOptions, Error, ExecutionContext, Executor, FunctionRegistry, ResultTable,
    Value,
};

fn catalog(rows: i64) -> SourceCatalog {
    let mut catalog = SourceCatalog::new();
    catalog.register(
        MemoryTable::with_columns("t", &["id", "v"], (0..rows).map(|i| row![i, i]).collect())
            .unwrap(),
    );
    catalog
}

/// Registry with a counting `F(x) = 2 * x` and a counting volatile `G(x) = x`
fn registry(f_calls: &Arc<AtomicUsize>, g_calls: &Arc<AtomicUsize>) -> Arc<FunctionRegistry> {
    let registry = FunctionRegistry::new();
    let counter = Arc::clone(f_calls);
    registry.register_fn("f", true, move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        match &args[0] {
            Value::Integer(i) => Ok(Value::Integer(i * 2)),
            other => Ok(other.clone()),
        }
    });
    let counter = Arc::clone(g_calls);
    registry.register_fn("g", false, move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(args[0].clone())
    });
    Arc::new(registry)
}

struct Run {
    result: ResultTable,
    f_calls: usize,
    g_calls: usize,
    cse_hits: u64,
}

fn run(plan: &BoundPlan, rows: i64, options: CompilationOptions) -> Run {
    let f_calls = Arc::new(AtomicUsize::new(0));
    let g_calls = Arc::new(AtomicUsize::new(0));
    let executor = Executor::new(catalog(rows))
        .with_functions(registry(&f_calls, &g_calls))
        .with_options(options);
    let ctx = ExecutionContext::new();
    let result = executor.compile(plan).unwrap().execute(&ctx).unwrap();
    Run {
        result,
        f_calls: f_calls.load(Ordering::SeqCst),
        g_calls: g_calls.load(Ordering::SeqCst),
        cse_hits: ctx.stats().snapshot().cse_hits,
    }
}

fn f_of_v() -> quarry::plan::Expr {
    call("f", vec![col("v")])
}

/// SELECT f(v), f(v) + 10 FROM t WHERE f(v) > 100
fn scenario_plan() -> BoundPlan {
    BoundPlan::simple(
        SelectQuery::from("t")
            .filter(f_of_v().gt(lit(100)))
            .select(f_of_v())
            .select(f_of_v().add(lit(10))),
    )
}

#[test]
fn test_function_runs_once_per_row() {
    let cached = run(&scenario_plan(), 100, CompilationOptions::default());
    assert_eq!(cached.f_calls, 100);
    // v > 50 passes the filter
    assert_eq!(cached.result.row_count(), 49);
    assert_eq!(cached.cse_hits, 2 * 49);

    let baseline = run(
        &scenario_plan(),
        100,
        CompilationOptions::default().with_cse(false),
    );
    // One call per rejected row, three per accepted row
    assert_eq!(baseline.f_calls, 51 + 3 * 49);
    assert_eq!(baseline.cse_hits, 0);
    assert_eq!(cached.result.sorted_rows(), baseline.result.sorted_rows());
}

#[test]
fn test_case_branches_share_the_cached_value() {
    // WHERE f(v) >= 0
    // SELECT CASE WHEN f(v) > 100 THEN f(v) + 1 ELSE f(v) END, f(v)
    let plan = BoundPlan::simple(
        SelectQuery::from("t")
            .filter(f_of_v().ge(lit(0)))
            .select(case_when(
                vec![(f_of_v().gt(lit(100)), f_of_v().add(lit(1)))],
                Some(f_of_v()),
            ))
            .select(f_of_v()),
    );
    let cached = run(&plan, 100, CompilationOptions::default());
    assert_eq!(cached.f_calls, 100);

    let baseline = run(&plan, 100, CompilationOptions::default().with_cse(false));
    assert_eq!(cached.result.sorted_rows(), baseline.result.sorted_rows());
}

#[test]
fn test_untaken_branch_is_not_evaluated() {
    // f(v) appears only inside THEN branches guarded by v > 89
    let plan = BoundPlan::simple(
        SelectQuery::from("t")
            .select(case_when(
                vec![(col("v").gt(lit(89)), f_of_v())],
                Some(lit(0)),
            ))
            .select(case_when(
                vec![(col("v").gt(lit(89)), f_of_v().mul(lit(2)))],
                Some(lit(1)),
            )),
    );
    let cached = run(&plan, 100, CompilationOptions::default());
    // Ten rows take the branch, once each
    assert_eq!(cached.f_calls, 10);

    let baseline = run(&plan, 100, CompilationOptions::default().with_cse(false));
    assert_eq!(baseline.f_calls, 20);
    assert_eq!(cached.result.sorted_rows(), baseline.result.sorted_rows());
}

#[test]
fn test_short_circuit_right_operand() {
    // WHERE v < 10 OR f(v) > 150, SELECT f(v)
    let plan = BoundPlan::simple(
        SelectQuery::from("t")
            .filter(col("v").lt(lit(10)).or(f_of_v().gt(lit(150))))
            .select(f_of_v()),
    );
    let cached = run(&plan, 100, CompilationOptions::default());
    // Every passing row needs f(v) for SELECT; rows 10..=75 call it only in WHERE
    assert_eq!(cached.result.row_count(), 10 + 24);
    assert_eq!(cached.f_calls, 100);
}

#[test]
fn test_volatile_function_is_never_cached() {
    let g = || volatile_call("g", vec![col("v")]);
    let plan = BoundPlan::simple(
        SelectQuery::from("t")
            .select(g())
            .select(g().add(lit(1))),
    );
    let cached = run(&plan, 50, CompilationOptions::default());
    assert_eq!(cached.g_calls, 100);
    assert_eq!(cached.cse_hits, 0);
}

#[test]
fn test_grouped_scopes() {
    // SELECT f(v % 3), SUM(f(v)) ... GROUP BY f(v % 3) HAVING SUM(f(v)) > 0
    let key = || call("f", vec![col("v").modulo(lit(3))]);
    let plan = BoundPlan::simple(
        SelectQuery::from("t")
            .filter(f_of_v().ge(lit(0)))
            .group_by(key())
            .select(key())
            .select(sum(f_of_v()))
            .having(sum(f_of_v()).gt(lit(0))),
    );
    let cached = run(&plan, 90, CompilationOptions::default());
    // f(v) once per row (WHERE + SUM argument), f(v % 3) once per row
    assert_eq!(cached.f_calls, 2 * 90);
    assert_eq!(cached.result.row_count(), 3);

    let baseline = run(&plan, 90, CompilationOptions::default().with_cse(false));
    assert_eq!(baseline.f_calls, 3 * 90);
    assert_eq!(cached.result.sorted_rows(), baseline.result.sorted_rows());
}

#[test]
fn test_partitioned_rows_each_get_a_fresh_cache() {
    let options = CompilationOptions::default()
        .with_parallel_row_threshold(1_000)
        .with_chunk_size(256)
        .with_max_threads(4);
    let cached = run(&scenario_plan(), 20_000, options.clone());
    assert_eq!(cached.f_calls, 20_000);

    let baseline = run(&scenario_plan(), 20_000, options.with_cse(false));
    assert_eq!(cached.result.sorted_rows(), baseline.result.sorted_rows());
    assert_eq!(cached.result.row_count(), 20_000 - 51);
}

#[test]
fn test_function_error_reaches_the_caller() {
    let registry = FunctionRegistry::new();
    registry.register_fn("fragile", true, |args| match &args[0] {
        Value::Integer(42) => Err(Error::function_failed("FRAGILE", "refused 42")),
        other => Ok(other.clone()),
    });
    let executor = Executor::new(catalog(100)).with_functions(Arc::new(registry));
    let plan = BoundPlan::simple(
        SelectQuery::from("t").select(call("fragile", vec![col("v")])),
    );
    let err = executor.execute(&plan).unwrap_err();
    assert!(matches!(err, Error::FunctionFailed { .. }));
}

#[test]
fn test_odd_column_names_do_not_share_a_slot() {
    let mut catalog = SourceCatalog::new();
    catalog.register(
        MemoryTable::with_columns("t", &["a", "b", "a,col:b"], vec![row![1, 2, 99]]).unwrap(),
    );
    let plan = BoundPlan::simple(
        SelectQuery::from("t")
            .select_as(call("coalesce", vec![col("a,col:b")]), "one")
            .select_as(call("coalesce", vec![col("a"), col("b")]), "two"),
    );
    let result = Executor::new(catalog).execute(&plan).unwrap();
    assert_eq!(
        result.rows()[0].to_vec(),
        vec![Value::Integer(99), Value::Integer(1)]
    );
}
