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

//! CTE dependency graph
//!
//! Nodes are the declared CTEs (indexed in declaration order) plus a root
//! sentinel standing for the outer query. Edges point from consumer to
//! producer: `a -> b` means `a` reads `b`, so `b` must be materialized
//! first.

use crate::common::StringMap;
use crate::core::{Error, Result};
use crate::plan::BoundPlan;

/// Dependency graph over a plan's CTEs
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Lower-cased CTE names in declaration order
    names: Vec<String>,
    index: StringMap<usize>,
    /// Producers of each node; the root's list is last
    edges: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Build the graph for a bound plan
    ///
    /// Fails with [`Error::DuplicateCte`] if a name is declared twice and
    /// with [`Error::CircularCteReference`] if the references among CTEs
    /// form a cycle. Every declared CTE takes part in the cycle check, even
    /// one the outer query never reads.
    pub fn build(plan: &BoundPlan) -> Result<Self> {
        let mut names = Vec::with_capacity(plan.ctes.len());
        let mut index = StringMap::default();
        for cte in &plan.ctes {
            let key = cte.key();
            if index.insert(key.clone(), names.len()).is_some() {
                return Err(Error::DuplicateCte(cte.name.clone()));
            }
            names.push(key);
        }

        let mut edges = Vec::with_capacity(names.len() + 1);
        for cte in &plan.ctes {
            edges.push(resolve(&index, &cte.references));
        }
        edges.push(resolve(&index, &plan.root_references()));

        let graph = Self {
            names,
            index,
            edges,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Number of CTE nodes (the root is not counted)
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the plan declares no CTEs
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of the root sentinel
    #[inline]
    pub fn root(&self) -> usize {
        self.names.len()
    }

    /// Lower-cased name of a CTE node
    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    /// Node index of a CTE
    pub fn node(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    /// Producers read by `node` (which may be the root)
    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.edges[node]
    }

    /// Depth-first search for a back edge among CTE nodes
    fn check_acyclic(&self) -> Result<()> {
        let mut marks = vec![Mark::Unvisited; self.names.len()];
        let mut path = Vec::new();
        for start in 0..self.names.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit(&self, node: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Result<()> {
        marks[node] = Mark::InProgress;
        path.push(node);
        for &dep in &self.edges[node] {
            match marks[dep] {
                Mark::InProgress => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|&n| self.names[n].clone()).collect();
                    cycle.push(self.names[dep].clone());
                    return Err(Error::circular_cte(cycle));
                }
                Mark::Unvisited => self.visit(dep, marks, path)?,
                Mark::Done => {}
            }
        }
        path.pop();
        marks[node] = Mark::Done;
        Ok(())
    }
}

fn resolve(index: &StringMap<usize>, references: &[String]) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::with_capacity(references.len());
    for r in references {
        if let Some(&i) = index.get(r) {
            if !out.contains(&i) {
                out.push(i);
            }
        }
    }
    out
}
