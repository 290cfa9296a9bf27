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

//! Materialized CTE results
//!
//! A CTE runs at most once per execution. Its result is published into the
//! registry only after every CTE of its level succeeded, and is then shared
//! by reference with every reader.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::result::ResultTable;

/// Registry for CTE results during one execution
#[derive(Debug, Clone, Default)]
pub struct CteRegistry {
    /// Materialized CTE results keyed by lower-cased name
    data: FxHashMap<String, Arc<ResultTable>>,
}

impl CteRegistry {
    /// Create a new CTE registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a materialized CTE result
    pub fn store(&mut self, name: &str, result: ResultTable) {
        self.data.insert(name.to_lowercase(), Arc::new(result));
    }

    /// Get a CTE result by name
    pub fn get(&self, name: &str) -> Option<Arc<ResultTable>> {
        if let Some(result) = self.data.get(name) {
            return Some(Arc::clone(result));
        }
        self.data.get(&name.to_lowercase()).cloned()
    }

    /// Check if a CTE was materialized
    pub fn exists(&self, name: &str) -> bool {
        self.data.contains_key(&name.to_lowercase())
    }

    /// Number of materialized CTEs
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing was materialized
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Names of the materialized CTEs, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        names
    }
}
