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

//! In-memory row sources

use std::fmt;
use std::sync::Arc;

use crate::core::{Error, Result, Row};
use crate::executor::context::ExecutionContext;

use super::traits::RowSource;

/// A fixed set of rows held in memory
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    columns: Vec<String>,
    rows: Arc<Vec<Row>>,
}

impl MemoryTable {
    /// Create a table, checking every row against the column count
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(Error::invalid_argument(format!(
                "table '{}' expects {} columns, got a row with {}",
                name,
                columns.len(),
                bad.len()
            )));
        }
        Ok(Self {
            name,
            columns,
            rows: Arc::new(rows),
        })
    }

    /// Convenience constructor taking `&str` column names
    pub fn with_columns(name: impl Into<String>, columns: &[&str], rows: Vec<Row>) -> Result<Self> {
        Self::new(name, columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn scan(&self, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        ctx.check_cancelled()?;
        Ok(self.rows.as_ref().clone())
    }
}

type ScanFn = dyn Fn(&ExecutionContext) -> Result<Vec<Row>> + Send + Sync;

/// A source whose rows come from a closure
///
/// The closure runs on every scan, which makes this the natural adapter for
/// computed relations and for instrumenting scans (counting invocations,
/// simulating slow or failing loads).
pub struct FnSource {
    name: String,
    columns: Vec<String>,
    scan_fn: Box<ScanFn>,
}

impl FnSource {
    /// Create a closure-backed source
    pub fn new<F>(name: impl Into<String>, columns: &[&str], scan_fn: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            scan_fn: Box::new(scan_fn),
        }
    }
}

impl fmt::Debug for FnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .finish()
    }
}

impl RowSource for FnSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn scan(&self, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        ctx.check_cancelled()?;
        let rows = (self.scan_fn)(ctx)?;
        if let Some(bad) = rows.iter().find(|r| r.len() != self.columns.len()) {
            return Err(Error::invalid_argument(format!(
                "source '{}' produced a row with {} columns, expected {}",
                self.name,
                bad.len(),
                self.columns.len()
            )));
        }
        Ok(rows)
    }
}
