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

//! Row source trait

use crate::core::{Result, Row};
use crate::executor::context::ExecutionContext;

/// A relation the engine can read rows from
///
/// Sources are external collaborators (files, CSV readers, services). The
/// engine only needs the column names up front, at compile time, and a way
/// to pull every row at execution time. `scan` may be called from worker
/// threads, and concurrently for different sources.
pub trait RowSource: Send + Sync {
    /// Name the source is registered under
    fn name(&self) -> &str;

    /// Column names in row order
    fn columns(&self) -> &[String];

    /// Read all rows
    ///
    /// Long-running sources should poll [`ExecutionContext::check_cancelled`]
    /// so that a sibling fault stops them early.
    fn scan(&self, ctx: &ExecutionContext) -> Result<Vec<Row>>;
}
