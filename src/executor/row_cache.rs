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

//! Per-row cache of common subexpressions
//!
//! Each evaluating thread owns one cache per row scope. Slots are cleared at
//! the start of every row, so a value computed for one row is never seen by
//! another. Store and hit counts accumulate across rows until flushed into
//! the execution statistics.

use smallvec::SmallVec;

use crate::core::Value;

/// Slot vector for one row scope
#[derive(Debug, Clone, Default)]
pub struct RowCache {
    slots: SmallVec<[Option<Value>; 8]>,
    stores: u64,
    hits: u64,
}

impl RowCache {
    /// Create a cache with `slot_count` empty slots
    pub fn new(slot_count: usize) -> Self {
        let mut slots = SmallVec::with_capacity(slot_count);
        slots.resize(slot_count, None);
        Self {
            slots,
            stores: 0,
            hits: 0,
        }
    }

    /// Number of slots
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Empty every slot; called before the first program of a row
    #[inline]
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    /// Read a slot without counting a hit
    #[inline]
    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Read a filled slot, counting a hit
    #[inline]
    pub fn hit(&mut self, slot: usize) -> Option<Value> {
        let value = self.slots.get(slot).and_then(Option::clone)?;
        self.hits += 1;
        Some(value)
    }

    /// Fill a slot
    #[inline]
    pub fn store(&mut self, slot: usize, value: Value) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(value);
        self.stores += 1;
    }

    /// (stores, hits) since creation or the last [`take_counters`](Self::take_counters)
    #[inline]
    pub fn counters(&self) -> (u64, u64) {
        (self.stores, self.hits)
    }

    /// Return and clear the counters
    pub fn take_counters(&mut self) -> (u64, u64) {
        let out = (self.stores, self.hits);
        self.stores = 0;
        self.hits = 0;
        out
    }
}
