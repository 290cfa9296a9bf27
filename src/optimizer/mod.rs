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

//! Plan-level optimization
//!
//! ## Modules
//!
//! - `dependency` - CTE dependency graph with cycle detection
//! - `elimination` - dead-CTE elimination (always on)
//! - `levels` - longest-path layering into independent levels
//! - `fingerprint` - structural expression fingerprints
//! - `cse` - per-scope common subexpression analysis
//! - `options` - compilation options

pub mod cse;
pub mod dependency;
pub mod elimination;
pub mod fingerprint;
pub mod levels;
pub mod options;

pub use cse::{analyze_block, collect_aggregates, CseAnalysis, CseCandidate, CseScope};
pub use dependency::DependencyGraph;
pub use elimination::{eliminate_dead_ctes, reachable_from_root};
pub use fingerprint::{fingerprint, ExpressionFingerprint};
pub(crate) use fingerprint::FingerprintTable;
pub use levels::{compute_levels, execution_order};
pub use options::{CompilationOptions, ParallelizationMode};

use crate::core::Result;
use crate::plan::BoundPlan;

/// Schedule for a plan's CTEs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtePlan {
    /// Plan indices of surviving CTEs, grouped by level
    pub levels: Vec<Vec<usize>>,
    /// Plan indices of surviving CTEs in declaration order, each producer
    /// moved ahead of its first reader
    pub order: Vec<usize>,
    /// Names of eliminated CTEs in declaration order
    pub eliminated: Vec<String>,
}

impl CtePlan {
    /// Number of CTEs that will run
    pub fn surviving(&self) -> usize {
        self.order.len()
    }
}

/// Build the dependency graph, drop unreachable CTEs and layer the rest
///
/// Sets each CTE's `reachable` flag on `plan`. Fails before anything runs
/// when the CTE references contain a cycle or a name is declared twice.
pub fn plan_ctes(plan: &mut BoundPlan) -> Result<CtePlan> {
    let graph = DependencyGraph::build(plan)?;
    let eliminated = eliminate_dead_ctes(plan, &graph);
    let reachable: Vec<bool> = plan.ctes.iter().map(|c| c.reachable).collect();
    let levels = compute_levels(&graph, &reachable);
    let order = execution_order(&graph, &reachable);

    tracing::debug!(
        levels = levels.len(),
        ctes = plan.ctes.len(),
        eliminated = eliminated.len(),
        "scheduled CTE levels"
    );

    Ok(CtePlan {
        levels,
        order,
        eliminated,
    })
}
