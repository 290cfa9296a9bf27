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

//! Data sources
//!
//! - [`RowSource`] - the adapter trait external sources implement
//! - [`MemoryTable`], [`FnSource`] - in-memory and closure-backed sources
//! - [`SourceCatalog`] - name to source registry used at compile time

pub mod catalog;
pub mod memory;
pub mod traits;

pub use catalog::SourceCatalog;
pub use memory::{FnSource, MemoryTable};
pub use traits::RowSource;
