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

//! Group Hierarchy Tests
//!
//! An update at level L lands on the Lth ancestor of the row's group and on
//! nothing else, and multi-level aggregates report per-prefix totals.

use std::collections::BTreeMap;

use quarry::executor::group::{GroupHierarchy, GroupKey};
use quarry::plan::{col, count_star, sum, BoundPlan, SelectQuery};
use quarry::storage::{MemoryTable, SourceCatalog};
use quarry::{row, CompilationOptions, Error, Executor, Row, Value};
use rust_decimal::Decimal;

fn key(values: &[&str]) -> GroupKey {
    GroupKey::new(values.iter().map(|v| Value::text(*v)).collect::<Vec<_>>())
}

#[test]
fn test_level_update_touches_only_that_ancestor() {
    let h = GroupHierarchy::new(vec!["region".into(), "city".into(), "store".into()]);
    let a = h.get_or_create_chain(&key(&["eu", "paris", "s1"])).unwrap();
    let b = h.get_or_create_chain(&key(&["eu", "paris", "s2"])).unwrap();
    let c = h.get_or_create_chain(&key(&["eu", "rome", "s3"])).unwrap();
    let d = h.get_or_create_chain(&key(&["us", "nyc", "s4"])).unwrap();

    for level in 0..=3 {
        let arena = h.read();
        let name = format!("level{}", level);
        arena
            .group(a, level)
            .unwrap()
            .add_decimal_value(&name, Decimal::ONE)
            .unwrap();

        // Written exactly where addressed
        assert_eq!(
            arena.group(a, level).unwrap().decimal_value(&name).unwrap(),
            Some(Decimal::ONE)
        );
        // Never below the addressed level
        for below in 0..level {
            assert!(!arena.group(a, below).unwrap().has_binding(&name));
        }
        // Never above it
        for above in level + 1..=3 {
            assert!(!arena.group(a, above).unwrap().has_binding(&name));
        }
    }

    let arena = h.read();
    // Sibling b shares a's ancestors from level 1 up, but not its own group
    assert!(!arena.group(b, 0).unwrap().has_binding("level0"));
    assert!(arena.group(b, 1).unwrap().has_binding("level1"));
    // c shares from level 2 up
    assert!(!arena.group(c, 1).unwrap().has_binding("level1"));
    assert!(arena.group(c, 2).unwrap().has_binding("level2"));
    // d only shares the root
    assert!(!arena.group(d, 2).unwrap().has_binding("level2"));
    assert!(arena.group(d, 3).unwrap().has_binding("level3"));

    assert_eq!(
        arena.group(a, 4).unwrap_err(),
        Error::GroupLevelOutOfRange { level: 4, depth: 3 }
    );
}

fn sales() -> Vec<Row> {
    let regions = ["eu", "us"];
    let cities = [["paris", "rome"], ["nyc", "sfo"]];
    (0..400i64)
        .map(|i| {
            let r = (i % 2) as usize;
            let c = ((i / 2) % 2) as usize;
            row![regions[r], cities[r][c], i % 13]
        })
        .collect()
}

#[test]
fn test_multi_level_aggregates() {
    let rows = sales();

    let mut by_city: BTreeMap<(String, String), i64> = BTreeMap::new();
    let mut by_region: BTreeMap<String, i64> = BTreeMap::new();
    let mut total = 0i64;
    for row in &rows {
        let (Value::Text(r), Value::Text(c), Value::Integer(v)) = (&row[0], &row[1], &row[2]) else {
            panic!("unexpected row {:?}", row);
        };
        *by_city.entry((r.to_string(), c.to_string())).or_default() += v;
        *by_region.entry(r.to_string()).or_default() += v;
        total += v;
    }

    let plan = BoundPlan::simple(
        SelectQuery::from("sales")
            .group_by(col("region"))
            .group_by(col("city"))
            .select(col("region"))
            .select(col("city"))
            .select_as(sum(col("amount")), "city_total")
            .select_as(sum(col("amount")).at_level(1), "region_total")
            .select_as(sum(col("amount")).at_level(2), "grand_total")
            .select_as(count_star().at_level(1), "region_rows"),
    );

    let partitioned = CompilationOptions::default()
        .with_parallel_row_threshold(50)
        .with_chunk_size(16)
        .with_max_threads(4);
    for options in [CompilationOptions::sequential(), partitioned] {
        let mut catalog = SourceCatalog::new();
        catalog.register(
            MemoryTable::with_columns("sales", &["region", "city", "amount"], rows.clone()).unwrap(),
        );
        let result = Executor::new(catalog).with_options(options).execute(&plan).unwrap();
        assert_eq!(result.row_count(), 4);

        for row in result.rows() {
            let region = row[0].to_string();
            let city = row[1].to_string();
            assert_eq!(row[2], Value::from(by_city[&(region.clone(), city)]));
            assert_eq!(row[3], Value::from(by_region[&region]));
            assert_eq!(row[4], Value::from(total));
            assert_eq!(row[5], Value::from(200));
        }
    }
}

#[test]
fn test_level_beyond_group_by_is_a_compile_error() {
    let mut catalog = SourceCatalog::new();
    catalog.register(MemoryTable::with_columns("sales", &["region", "city", "amount"], sales()).unwrap());
    let plan = BoundPlan::simple(
        SelectQuery::from("sales")
            .group_by(col("region"))
            .select(col("region"))
            .select(sum(col("amount")).at_level(2)),
    );
    let err = Executor::new(catalog).compile(&plan).unwrap_err();
    assert_eq!(err, Error::GroupLevelOutOfRange { level: 2, depth: 1 });
}
