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

//! Group hierarchy
//!
//! Groups live in one arena and point at their parent by index. For GROUP BY
//! `[c0, .., cn-1]` a row's chain is the key of length n (level 0), its
//! prefix of length n-1 (level 1), and so on up to the empty key at level n.
//! Every ancestor is created before its child is published, so finding a
//! leaf in the key map implies its whole chain exists.
//!
//! Locking: a key-map shard lock may be held while taking the arena write
//! lock, never the reverse. Row processing takes the arena read lock only
//! after the chain is resolved and releases it before resolving the next
//! row.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::common::{new_concurrent_map, ConcurrentMap};
use crate::core::{Error, Result};

use super::group::{Group, GroupId};
use super::key::GroupKey;

/// Arena of groups plus the concurrent key index
pub struct GroupHierarchy {
    field_names: Arc<[String]>,
    index: ConcurrentMap<GroupKey, GroupId>,
    arena: RwLock<Vec<Group>>,
}

impl GroupHierarchy {
    /// Create a hierarchy for the given GROUP BY column names
    pub fn new(field_names: Vec<String>) -> Self {
        Self {
            field_names: Arc::from(field_names),
            index: new_concurrent_map(),
            arena: RwLock::new(Vec::new()),
        }
    }

    /// Number of GROUP BY columns; also the level of the root group
    #[inline]
    pub fn depth(&self) -> usize {
        self.field_names.len()
    }

    /// GROUP BY column names
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Number of groups, ancestors included
    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    /// True before the first group is created
    pub fn is_empty(&self) -> bool {
        self.arena.read().is_empty()
    }

    /// Find or create the group for a full key, creating its ancestors first
    ///
    /// Returns the leaf (level 0) group id.
    pub fn get_or_create_chain(&self, key: &GroupKey) -> Result<GroupId> {
        if key.len() != self.depth() {
            return Err(Error::internal(format!(
                "group key has {} values, hierarchy expects {}",
                key.len(),
                self.depth()
            )));
        }
        if let Some(id) = self.index.get(key) {
            return Ok(*id);
        }

        let mut parent = None;
        for len in 0..key.len() {
            parent = Some(self.get_or_create(key.prefix(len), parent));
        }
        Ok(self.get_or_create(key.clone(), parent))
    }

    /// Find or create one group; the parent must already exist
    fn get_or_create(&self, key: GroupKey, parent: Option<GroupId>) -> GroupId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        // Shard lock, then arena write lock
        match self.index.entry(key) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let group = Group::new(
                    parent,
                    Arc::clone(&self.field_names),
                    v.key().values().to_vec(),
                );
                let id = {
                    let mut arena = self.arena.write();
                    arena.push(group);
                    arena.len() - 1
                };
                v.insert(id);
                id
            }
        }
    }

    /// Lock the arena for reading
    pub fn read(&self) -> GroupArena<'_> {
        GroupArena {
            groups: self.arena.read(),
            depth: self.depth(),
        }
    }
}

impl std::fmt::Debug for GroupHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupHierarchy")
            .field("field_names", &self.field_names)
            .field("groups", &self.len())
            .finish()
    }
}

/// Read access to the arena
pub struct GroupArena<'a> {
    groups: RwLockReadGuard<'a, Vec<Group>>,
    depth: usize,
}

impl GroupArena<'_> {
    /// The group `level` parent hops above `id` (0 = the group itself)
    pub fn group(&self, id: GroupId, level: usize) -> Result<&Group> {
        let mut current = self.get(id)?;
        for _ in 0..level {
            let parent = current.parent().ok_or(Error::GroupLevelOutOfRange {
                level,
                depth: self.depth,
            })?;
            current = self.get(parent)?;
        }
        Ok(current)
    }

    fn get(&self, id: GroupId) -> Result<&Group> {
        self.groups
            .get(id)
            .ok_or_else(|| Error::concurrency_invariant(format!("group {} is not in the arena", id)))
    }

    /// Count one row on a group and every ancestor
    pub fn hit_chain(&self, id: GroupId) -> Result<()> {
        let mut next = Some(id);
        while let Some(id) = next {
            let group = self.get(id)?;
            group.hit();
            next = group.parent();
        }
        Ok(())
    }

    /// Groups keyed on every GROUP BY column, in creation order
    pub fn leaves(&self) -> impl Iterator<Item = &Group> + '_ {
        let depth = self.depth;
        self.groups
            .iter()
            .filter(move |g| g.field_values().len() == depth)
    }

    /// Ids of the leaf groups, in creation order
    pub fn leaf_ids(&self) -> Vec<GroupId> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.field_values().len() == self.depth)
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if no group exists
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
