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

//! Named registry of row sources

use std::sync::Arc;

use crate::common::StringMap;

use super::traits::RowSource;

/// Case-insensitive map from relation name to source
#[derive(Clone, Default)]
pub struct SourceCatalog {
    sources: StringMap<Arc<dyn RowSource>>,
}

impl SourceCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name, replacing any previous one
    pub fn register(&mut self, source: impl RowSource + 'static) {
        self.register_arc(Arc::new(source));
    }

    /// Register a shared source
    pub fn register_arc(&mut self, source: Arc<dyn RowSource>) {
        self.sources.insert(source.name().to_lowercase(), source);
    }

    /// Look up a source by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn RowSource>> {
        self.sources.get(&name.to_lowercase()).cloned()
    }

    /// Check whether a source is registered
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(&name.to_lowercase())
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when no source is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.sources.keys().collect();
        names.sort();
        f.debug_struct("SourceCatalog").field("sources", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTable;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut catalog = SourceCatalog::new();
        catalog.register(MemoryTable::with_columns("Orders", &["id"], vec![]).unwrap());

        assert!(catalog.contains("orders"));
        assert!(catalog.get("ORDERS").is_some());
        assert!(catalog.get("customers").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
