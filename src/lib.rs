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

//! # Quarry - parallel CTE and aggregation execution core
//!
//! Quarry executes bound query plans: named CTEs plus an outer query over
//! pluggable row sources. It sits behind a parser and binder and takes
//! their output as a [`plan::BoundPlan`].
//!
//! ## Key Features
//!
//! - **Dead-CTE elimination** - CTEs the final query cannot reach are never scheduled
//! - **Level scheduling** - independent CTEs run concurrently, level by level
//! - **First-fault semantics** - one failure cancels its siblings; no partial results
//! - **Per-row CSE** - repeated deterministic subexpressions run once per row
//! - **Group hierarchy** - multi-level aggregation over GROUP BY key prefixes
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry::plan::{col, count_star, sum, BoundPlan, CteDefinition, SelectQuery};
//! use quarry::storage::{MemoryTable, SourceCatalog};
//! use quarry::{row, Executor, Value};
//!
//! let mut catalog = SourceCatalog::new();
//! catalog.register(
//!     MemoryTable::with_columns(
//!         "sales",
//!         &["region", "amount"],
//!         vec![row!["eu", 10], row!["eu", 5], row!["us", 7]],
//!     )
//!     .unwrap(),
//! );
//!
//! let plan = BoundPlan::new(
//!     vec![CteDefinition::new(
//!         "eu",
//!         SelectQuery::from("sales")
//!             .filter(col("region").eq(quarry::plan::lit("eu")))
//!             .select(col("amount")),
//!     )],
//!     SelectQuery::from("eu").select(sum(col("amount"))).select(count_star()),
//! );
//!
//! let result = Executor::new(catalog).execute(&plan).unwrap();
//! assert_eq!(result.rows()[0][0], Value::from(15));
//! assert_eq!(result.rows()[0][1], Value::from(2));
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Core types ([`Value`], [`Row`], [`Error`])
//! - [`plan`] - Bound plan model and builders
//! - [`storage`] - Row sources and the source catalog
//! - [`functions`] - Scalar and aggregate functions
//! - [`optimizer`] - CTE graph, levels, CSE analysis and options
//! - [`executor`] - Compilation and execution
//! - [`common`] - Hash map aliases

pub mod common;
pub mod core;
pub mod executor;
pub mod functions;
pub mod optimizer;
pub mod plan;
pub mod storage;

// Re-export main types for convenience
pub use core::{DataType, Error, Result, Row, ToDecimal, Value};

// Re-export function types
pub use functions::{
    AggregateBinding, AggregateFunction, FunctionInfo, FunctionRegistry, FunctionSignature,
    FunctionType, ScalarFunction,
};

// Re-export optimizer configuration
pub use optimizer::{CompilationOptions, ParallelizationMode};

// Re-export executor types
pub use executor::{
    CancellationHandle, CompiledPlan, ExecutionContext, Executor, ResultTable, StatsSnapshot,
};
