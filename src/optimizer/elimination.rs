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

//! Dead-CTE elimination
//!
//! A CTE the outer query cannot reach, directly or through other CTEs, is
//! dropped before scheduling. It is never compiled, allocated or run.

use crate::plan::BoundPlan;

use super::dependency::DependencyGraph;

/// Reachability of each CTE node from the root
pub fn reachable_from_root(graph: &DependencyGraph) -> Vec<bool> {
    let mut reachable = vec![false; graph.len()];
    let mut stack: Vec<usize> = graph.dependencies(graph.root()).to_vec();
    while let Some(node) = stack.pop() {
        if reachable[node] {
            continue;
        }
        reachable[node] = true;
        stack.extend(
            graph
                .dependencies(node)
                .iter()
                .copied()
                .filter(|&dep| !reachable[dep]),
        );
    }
    reachable
}

/// Mark every CTE's reachability flag and return the names of the dead ones
/// in declaration order
pub fn eliminate_dead_ctes(plan: &mut BoundPlan, graph: &DependencyGraph) -> Vec<String> {
    let reachable = reachable_from_root(graph);
    let mut eliminated = Vec::new();
    for (i, cte) in plan.ctes.iter_mut().enumerate() {
        cte.reachable = reachable[i];
        if !cte.reachable {
            eliminated.push(cte.name.clone());
        }
    }
    if !eliminated.is_empty() {
        tracing::debug!(
            eliminated = ?eliminated,
            remaining = plan.ctes.len() - eliminated.len(),
            "eliminated unreachable CTEs"
        );
    }
    eliminated
}
