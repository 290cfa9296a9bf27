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

//! Query results
//!
//! [`ResultTable`] is the materialized output of a query block, a CTE or a
//! whole plan. [`ResultWriter`] collects rows from many worker threads at
//! once: every worker appends to its own shard, so appends from different
//! threads never contend on one lock.

use std::fmt;

use parking_lot::Mutex;

use crate::core::{Row, Value};

/// Column names plus rows
///
/// Row order is unspecified when the rows were produced in parallel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultTable {
    /// Create a result from columns and rows
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Create an empty result with the given columns
    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the result, returning the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Index of a column (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].clone()).collect())
    }

    /// Rows sorted by their values; for comparing results whose order
    /// depends on scheduling
    pub fn sorted_rows(&self) -> Vec<Vec<Value>> {
        let mut out: Vec<Vec<Value>> = self.rows.iter().map(Row::to_vec).collect();
        out.sort();
        out
    }

    /// Append the rows of another result with the same column count
    pub(crate) fn extend(&mut self, rows: Vec<Row>) {
        if self.rows.is_empty() {
            self.rows = rows;
        } else {
            self.rows.extend(rows);
        }
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

/// Concurrent row collector
pub struct ResultWriter {
    columns: Vec<String>,
    /// Shard 0 belongs to threads outside the pool; worker `i` uses shard
    /// `i + 1`
    shards: Box<[Mutex<Vec<Row>>]>,
}

impl ResultWriter {
    /// Create a writer with one shard per thread of the current pool
    pub fn new(columns: Vec<String>) -> Self {
        Self::with_shards(columns, rayon::current_num_threads() + 1)
    }

    /// Create a writer with an explicit shard count
    pub fn with_shards(columns: Vec<String>, shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(Vec::new())).collect();
        Self { columns, shards }
    }

    #[inline]
    fn shard(&self) -> &Mutex<Vec<Row>> {
        let idx = rayon::current_thread_index().map_or(0, |i| i + 1);
        &self.shards[idx % self.shards.len()]
    }

    /// Append one row
    pub fn append(&self, row: Row) {
        self.shard().lock().push(row);
    }

    /// Append a batch of rows under one lock acquisition
    pub fn append_batch(&self, rows: Vec<Row>) {
        if rows.is_empty() {
            return;
        }
        let mut shard = self.shard().lock();
        if shard.is_empty() {
            *shard = rows;
        } else {
            shard.extend(rows);
        }
    }

    /// Rows appended so far
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// True if no row was appended
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge the shards into a result
    pub fn finish(self) -> ResultTable {
        let mut rows = Vec::with_capacity(self.len());
        for shard in self.shards.into_vec() {
            rows.extend(shard.into_inner());
        }
        ResultTable::new(self.columns, rows)
    }
}

impl fmt::Debug for ResultWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultWriter")
            .field("columns", &self.columns)
            .field("shards", &self.shards.len())
            .finish()
    }
}
