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

//! Hash map aliases used across the engine
//!
//! - `StringMap`/`StringSet` for names (AHash)
//! - `ValueSet` for DISTINCT tracking (AHash)
//! - `ConcurrentMap` for keys shared between scanning threads (DashMap + FxHash)

use std::hash::{BuildHasherDefault, Hash};

use ahash::{AHashMap, AHashSet};
use dashmap::DashMap;
use rustc_hash::FxHasher;

use crate::core::Value;

/// Type alias for FxHash's BuildHasher
pub type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Fast hash map for String keys
///
/// AHash handles variable-length keys well.
pub type StringMap<V> = AHashMap<String, V>;

/// Fast hash set for String keys
pub type StringSet = AHashSet<String>;

/// Hash set of runtime values
///
/// Relies on `Value`'s cross-type numeric equality, so `1`, `1.0` and
/// `1.00` occupy one slot.
pub type ValueSet = AHashSet<Value>;

/// Concurrent hash map
///
/// Sharded locking; reads and writes to different shards never contend.
pub type ConcurrentMap<K, V> = DashMap<K, V, FxBuildHasher>;

/// Create a new ConcurrentMap with default capacity
#[inline]
pub fn new_concurrent_map<K: Eq + Hash, V>() -> ConcurrentMap<K, V> {
    DashMap::with_hasher(FxBuildHasher::default())
}

/// Create a new ConcurrentMap with the given capacity
#[inline]
pub fn new_concurrent_map_with_capacity<K: Eq + Hash, V>(capacity: usize) -> ConcurrentMap<K, V> {
    DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default())
}
