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

//! Bound plan model
//!
//! The input to the optimizer: named CTE definitions with their resolved
//! references, the outer query, and bound expressions carrying determinism
//! and aggregate metadata. Parsing and binding happen upstream.

pub mod expr;
pub mod query;

pub use expr::{
    avg, avg_distinct, call, case_of, case_when, col, count, count_distinct, count_star, lit,
    max, max_distinct, min, min_distinct, sum, sum_distinct, volatile_call, AggregateCall,
    AggregateKind, BinaryOp, CaseExpr, Expr, FunctionCall, UnaryOp,
};
pub use query::{BoundPlan, CteDefinition, Query, SelectItem, SelectQuery};
