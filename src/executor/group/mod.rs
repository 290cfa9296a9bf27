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

//! Hash-keyed grouping runtime
//!
//! - [`GroupKey`]: immutable value tuple with an order-sensitive hash
//! - [`Group`]: hit counter plus binding accumulators
//! - [`GroupHierarchy`]: arena of groups chained by parent index

#[allow(clippy::module_inception)]
mod group;
mod hierarchy;
mod key;

pub use group::{Group, GroupId, GroupValue};
pub use hierarchy::{GroupArena, GroupHierarchy};
pub use key::{element_hash, polynomial_hash, GroupKey};

/// Seen-set behind a DISTINCT aggregate binding
pub type DistinctSet = crate::common::ValueSet;
