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

//! Aggregation Tests
//!
//! GROUP BY with SUM, COUNT, AVG, MIN, MAX and their DISTINCT forms,
//! checked against a straightforward single-threaded reference.

use std::collections::{BTreeMap, HashSet};

use quarry::plan::{
    avg, avg_distinct, col, count, count_distinct, count_star, lit, max, min, sum, sum_distinct,
    BoundPlan, CteDefinition, SelectQuery,
};
use quarry::storage::{MemoryTable, SourceCatalog};
use quarry::{row, CompilationOptions, Error, Executor, Row, Value};
use rust_decimal::Decimal;

const CATEGORIES: [&str; 5] = ["books", "games", "music", "tools", "toys"];

fn scenario_rows() -> Vec<Row> {
    (0..1000i64)
        .map(|i| {
            let category = CATEGORIES[(i % 5) as usize];
            let value = if i % 17 == 0 {
                Value::Null
            } else {
                Value::Integer((i * 37) % 50)
            };
            row![i, category, value]
        })
        .collect()
}

fn executor(rows: Vec<Row>, options: CompilationOptions) -> Executor {
    let mut catalog = SourceCatalog::new();
    catalog.register(MemoryTable::with_columns("items", &["id", "category", "value"], rows).unwrap());
    Executor::new(catalog).with_options(options)
}

/// category, SUM(value), COUNT(*), COUNT(DISTINCT value)
fn reference(rows: &[Row]) -> Vec<Vec<Value>> {
    let mut groups: BTreeMap<String, (Option<Decimal>, i64, HashSet<i64>)> = BTreeMap::new();
    for row in rows {
        let category = match &row[1] {
            Value::Text(s) => s.to_string(),
            other => panic!("unexpected category {:?}", other),
        };
        let entry = groups.entry(category).or_insert((None, 0, HashSet::new()));
        entry.1 += 1;
        if let Value::Integer(v) = row[2] {
            entry.0 = Some(entry.0.unwrap_or(Decimal::ZERO) + Decimal::from(v));
            entry.2.insert(v);
        }
    }
    let mut out: Vec<Vec<Value>> = groups
        .into_iter()
        .map(|(category, (total, hits, distinct))| {
            vec![
                Value::text(category),
                total.map(Value::Decimal).unwrap_or(Value::Null),
                Value::Integer(hits),
                Value::Integer(distinct.len() as i64),
            ]
        })
        .collect();
    out.sort();
    out
}

fn scenario_plan() -> BoundPlan {
    BoundPlan::simple(
        SelectQuery::from("items")
            .group_by(col("category"))
            .select(col("category"))
            .select(sum(col("value")))
            .select(count_star())
            .select(count_distinct(col("value"))),
    )
}

#[test]
fn test_group_by_matches_reference() {
    let rows = scenario_rows();
    let expected = reference(&rows);
    assert_eq!(expected.len(), 5);

    let partitioned = CompilationOptions::default()
        .with_parallel_row_threshold(100)
        .with_chunk_size(64)
        .with_max_threads(4);
    for options in [CompilationOptions::sequential(), partitioned] {
        let result = executor(rows.clone(), options).execute(&scenario_plan()).unwrap();
        assert_eq!(result.sorted_rows(), expected);
    }
}

#[test]
fn test_null_semantics() {
    let rows = vec![
        row![1, 1],
        row![2, Value::Null],
        row![3, 3],
        row![4, Value::Null],
        row![5, 3],
    ];
    let plan = BoundPlan::simple(
        SelectQuery::from("items")
            .select(sum(col("value")))
            .select(count_star())
            .select(count(col("value")))
            .select(avg(col("value")))
            .select(min(col("value")))
            .select(max(col("value")))
            .select(count_distinct(col("value")))
            .select(sum_distinct(col("value")))
            .select(avg_distinct(col("value"))),
    );
    let mut catalog = SourceCatalog::new();
    catalog.register(MemoryTable::with_columns("items", &["id", "value"], rows).unwrap());
    let result = Executor::new(catalog).execute(&plan).unwrap();

    assert_eq!(result.row_count(), 1);
    let r = &result.rows()[0];
    assert_eq!(r[0], Value::from(7));
    assert_eq!(r[1], Value::from(5));
    assert_eq!(r[2], Value::from(3));
    assert_eq!(r[3], Value::Decimal(Decimal::from(7) / Decimal::from(3)));
    assert_eq!(r[4], Value::from(1));
    assert_eq!(r[5], Value::from(3));
    assert_eq!(r[6], Value::from(2));
    assert_eq!(r[7], Value::from(4));
    assert_eq!(r[8], Value::from(2));
}

#[test]
fn test_distinct_across_numeric_subtypes() {
    let rows = vec![
        row![1, "a", 5],
        row![2, "a", 5.0],
        row![3, "a", Decimal::new(500, 2)],
        row![4, "a", 2],
    ];
    let plan = BoundPlan::simple(
        SelectQuery::from("items")
            .group_by(col("category"))
            .select(count_distinct(col("value")))
            .select(sum_distinct(col("value")))
            .select(sum(col("value"))),
    );
    let result = executor(rows, CompilationOptions::default()).execute(&plan).unwrap();
    assert_eq!(result.rows()[0][0], Value::from(2));
    assert_eq!(result.rows()[0][1], Value::from(7));
    assert_eq!(result.rows()[0][2], Value::from(17));
}

#[test]
fn test_avg_without_values_fails() {
    let rows = vec![row![1, "a", 1], row![2, "b", Value::Null]];
    let plan = BoundPlan::simple(
        SelectQuery::from("items")
            .group_by(col("category"))
            .select(col("category"))
            .select(avg(col("value"))),
    );
    let err = executor(rows, CompilationOptions::default()).execute(&plan).unwrap_err();
    assert!(err.is_aggregate_error());
    assert!(matches!(err, Error::AggregateDivisionByZero { .. }));
}

#[test]
fn test_aggregate_error_inside_cte_names_the_cte() {
    let rows = vec![row![1, "a", Value::Null]];
    let plan = BoundPlan::new(
        vec![CteDefinition::new(
            "averages",
            SelectQuery::from("items").select_as(avg(col("value")), "a"),
        )],
        SelectQuery::from("averages").select(col("a")),
    );
    let err = executor(rows, CompilationOptions::default()).execute(&plan).unwrap_err();
    assert!(err.is_aggregate_error());
    match err {
        Error::CteFailed { cte, .. } => assert_eq!(cte, "averages"),
        other => panic!("expected a CTE failure, got {:?}", other),
    }
}

#[test]
fn test_empty_input() {
    let grouped = BoundPlan::simple(
        SelectQuery::from("items")
            .group_by(col("category"))
            .select(col("category"))
            .select(count_star()),
    );
    let result = executor(Vec::new(), CompilationOptions::default()).execute(&grouped).unwrap();
    assert!(result.is_empty());

    let global = BoundPlan::simple(
        SelectQuery::from("items")
            .select(count_star())
            .select(count(col("value")))
            .select(sum(col("value")))
            .select(max(col("value"))),
    );
    let result = executor(Vec::new(), CompilationOptions::default()).execute(&global).unwrap();
    assert_eq!(result.sorted_rows(), vec![vec![
        Value::from(0),
        Value::from(0),
        Value::Null,
        Value::Null,
    ]]);
}

#[test]
fn test_null_keys_form_one_group() {
    let rows = vec![
        row![1, Value::Null, 1],
        row![2, "x", 2],
        row![3, Value::Null, 3],
    ];
    let plan = BoundPlan::simple(
        SelectQuery::from("items")
            .group_by(col("category"))
            .select(col("category"))
            .select(sum(col("value"))),
    );
    let result = executor(rows, CompilationOptions::default()).execute(&plan).unwrap();
    assert_eq!(
        result.sorted_rows(),
        {
            let mut expected = vec![
                vec![Value::Null, Value::from(4)],
                vec![Value::text("x"), Value::from(2)],
            ];
            expected.sort();
            expected
        }
    );
}

#[test]
fn test_having_and_expressions_over_aggregates() {
    let plan = BoundPlan::simple(
        SelectQuery::from("items")
            .filter(col("value").is_not_null())
            .group_by(col("category"))
            .select(col("category"))
            .select_as(max(col("value")).sub(min(col("value"))), "spread")
            .having(count_star().gt(lit(150))),
    );
    let result = executor(scenario_rows(), CompilationOptions::default())
        .execute(&plan)
        .unwrap();
    // 200 rows per category, at most 12 of them NULL
    assert_eq!(result.row_count(), 5);
    for row in result.rows() {
        assert_eq!(row[1], Value::from(45));
    }
}

#[test]
fn test_min_max_reject_text() {
    let rows = vec![row![1, "a", "x"]];
    let plan = BoundPlan::simple(SelectQuery::from("items").select(min(col("value"))));
    let err = executor(rows, CompilationOptions::default()).execute(&plan).unwrap_err();
    assert!(matches!(err, Error::AggregateType { .. }));
}

#[test]
fn test_bare_column_outside_group_by_is_rejected() {
    let plan = BoundPlan::simple(
        SelectQuery::from("items")
            .group_by(col("category"))
            .select(col("id"))
            .select(count_star()),
    );
    let err = executor(scenario_rows(), CompilationOptions::default())
        .compile(&plan)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPlan(_)));
}
