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

//! Query executor
//!
//! # Architecture
//!
//! ```text
//! BoundPlan
//!   ↓  plan_ctes (graph, dead-CTE elimination, levels)
//! CompiledPlan
//!   ↓  LevelScheduler (one level at a time, all-or-nothing publication)
//! CteRegistry
//!   ↓  CompiledBlock (filter → project | group → HAVING → project)
//! ResultTable
//! ```
//!
//! # Components
//!
//! - [`Executor`] - compiles bound plans against a catalog
//! - [`expression`] - bytecode compiler and VM with per-row CSE slots
//! - [`group`] - group keys, groups and the group hierarchy
//! - [`LevelScheduler`] - level-by-level CTE materialization
//! - [`ResultTable`] / [`ResultWriter`] - results and concurrent appends

pub mod context;
pub mod expression;
pub mod group;
pub mod parallel;
pub mod result;
pub mod scheduler;

mod block;
mod cte;
mod evaluator;
mod query;
mod row_cache;

pub use block::{BlockInput, CompiledBlock};
pub use context::{CancellationHandle, ExecutionContext, ExecutionStats, StatsSnapshot};
pub use cte::CteRegistry;
pub use evaluator::RowEvaluator;
pub use parallel::{run_partitions, Partitioning};
pub use query::{CompiledCte, CompiledPlan, CompiledQuery, Executor};
pub use result::{ResultTable, ResultWriter};
pub use row_cache::RowCache;
pub use scheduler::{CteTask, LevelScheduler};
