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

//! Grouping keys
//!
//! The key hash is computed once at construction with an order-sensitive
//! polynomial: `h = 17`, then `h = h * 31 + hash(v)` for each element, where a
//! NULL element contributes 0. Swapping two elements changes the hash, so
//! `("a", 1)` and `(1, "a")` land in different buckets.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use crate::core::Value;

const SEED: u64 = 17;
const MULTIPLIER: u64 = 31;

/// Hasher for individual elements; fixed seeds keep keys comparable across
/// threads of one process
fn element_hasher() -> &'static ahash::RandomState {
    static HASHER: OnceLock<ahash::RandomState> = OnceLock::new();
    HASHER.get_or_init(|| {
        ahash::RandomState::with_seeds(
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        )
    })
}

/// Hash of a single element; NULL hashes to 0
#[inline]
pub fn element_hash(value: &Value) -> u64 {
    if value.is_null() {
        0
    } else {
        element_hasher().hash_one(value)
    }
}

/// Order-sensitive hash of a value tuple
#[inline]
pub fn polynomial_hash(values: &[Value]) -> u64 {
    values.iter().fold(SEED, |h, v| {
        h.wrapping_mul(MULTIPLIER).wrapping_add(element_hash(v))
    })
}

/// Immutable tuple of GROUP BY values
#[derive(Clone)]
pub struct GroupKey {
    values: Box<[Value]>,
    hash: u64,
}

impl GroupKey {
    /// Create a key, computing its hash once
    pub fn new(values: impl Into<Box<[Value]>>) -> Self {
        let values = values.into();
        let hash = polynomial_hash(&values);
        Self { values, hash }
    }

    /// The key of the single group of an aggregation without GROUP BY
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Key made of the first `len` elements
    pub fn prefix(&self, len: usize) -> Self {
        Self::new(self.values[..len.min(self.values.len())].to_vec())
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The precomputed polynomial hash
    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for GroupKey {
    /// Pairwise, null-safe comparison
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.values == other.values
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GroupKey").field(&self.values).finish()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Value>> for GroupKey {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
