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

//! Row type for Quarry - an immutable collection of column values
//!
//! Rows are materialized once (by a source scan, a CTE or a projection) and
//! then only read, so the values live behind an `Arc<[Value]>` and cloning a
//! row is O(1). Materialized CTE results are shared by every dependent.

use std::fmt;
use std::ops::{Deref, Index};
use std::sync::Arc;

use super::value::Value;

/// A row of values
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Row {
    values: Arc<[Value]>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self {
            values: Arc::from(Vec::new()),
        }
    }

    /// Create a row from a vector of values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            values: Arc::from(values),
        }
    }

    /// Number of columns
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the row has no columns
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the value at index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Borrow the values as a slice
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Iterate over values
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Copy the values out into an owned vector
    pub fn to_vec(&self) -> Vec<Value> {
        self.values.to_vec()
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Row {
    type Target = [Value];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl Index<usize> for Row {
    type Output = Value;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Build a [`Row`] from a list of expressions convertible into [`Value`]
///
/// ```
/// use quarry::{row, Value};
/// let r = row![1, "a", 2.5];
/// assert_eq!(r[1], Value::text("a"));
/// ```
#[macro_export]
macro_rules! row {
    ($($v:expr),* $(,)?) => {
        $crate::core::Row::from_values(vec![$($crate::core::Value::from($v)),*])
    };
}
