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

//! Level scheduling by longest-path layering
//!
//! A CTE with no CTE dependencies sits at level 0; any other CTE sits one
//! level above its deepest dependency. Members of a level therefore never
//! read each other and every producer finishes in a strictly lower level.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::dependency::DependencyGraph;

/// Layer the reachable CTE nodes
///
/// Returns node indices grouped by level, in declaration order within each
/// level. Nodes with `reachable[node] == false` are left out entirely. The
/// graph must be acyclic, which [`DependencyGraph::build`] guarantees.
pub fn compute_levels(graph: &DependencyGraph, reachable: &[bool]) -> Vec<Vec<usize>> {
    let mut depth: Vec<Option<usize>> = vec![None; graph.len()];
    for node in 0..graph.len() {
        if reachable[node] {
            longest_path(graph, node, &mut depth);
        }
    }

    let mut levels: Vec<Vec<usize>> = Vec::new();
    for node in 0..graph.len() {
        if !reachable[node] {
            continue;
        }
        let level = depth[node].unwrap_or(0);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(node);
    }
    levels
}

/// Run order for one-at-a-time execution
///
/// A topological order of the reachable nodes that always picks the lowest
/// declaration index whose producers have all run. When declaration order
/// already respects every dependency it is returned unchanged; otherwise a
/// CTE moves back only as far as its producers require.
pub fn execution_order(graph: &DependencyGraph, reachable: &[bool]) -> Vec<usize> {
    let n = graph.len();
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut waiting = vec![0usize; n];
    for node in (0..n).filter(|&i| reachable[i]) {
        for &dep in graph.dependencies(node) {
            waiting[node] += 1;
            consumers[dep].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| reachable[i] && waiting[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &consumer in &consumers[node] {
            waiting[consumer] -= 1;
            if waiting[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }
    order
}

fn longest_path(graph: &DependencyGraph, node: usize, depth: &mut [Option<usize>]) -> usize {
    if let Some(d) = depth[node] {
        return d;
    }
    let d = graph
        .dependencies(node)
        .iter()
        .map(|&dep| longest_path(graph, dep, depth) + 1)
        .max()
        .unwrap_or(0);
    depth[node] = Some(d);
    d
}
