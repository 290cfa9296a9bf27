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

//! Row evaluator
//!
//! Pairs a VM with the row cache of one scope. Each worker thread creates its
//! own evaluator per partition, so neither the VM stack nor the cache is ever
//! shared.

use crate::core::{Error, Result, Value};

use super::context::ExecutionStats;
use super::expression::{ExprVM, Program};
use super::row_cache::RowCache;

/// Evaluates the compiled programs of one row scope
pub struct RowEvaluator {
    vm: ExprVM,
    cache: RowCache,
}

impl RowEvaluator {
    /// Create an evaluator with `slot_count` cache slots
    pub fn new(slot_count: usize) -> Self {
        Self {
            vm: ExprVM::new(),
            cache: RowCache::new(slot_count),
        }
    }

    /// Start a new row, dropping every cached value of the previous one
    #[inline]
    pub fn begin_row(&mut self) {
        self.cache.reset();
    }

    /// Evaluate a program against the current row
    #[inline]
    pub fn evaluate(&mut self, program: &Program, row: &[Value]) -> Result<Value> {
        self.vm.execute(program, row, &mut self.cache)
    }

    /// Evaluate a predicate; NULL and FALSE both reject the row
    pub fn evaluate_bool(&mut self, program: &Program, row: &[Value]) -> Result<bool> {
        match self.evaluate(program, row)? {
            Value::Boolean(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            Value::Null => Ok(false),
            other => Err(Error::type_error(format!(
                "predicate must be boolean, got {}",
                other.data_type()
            ))),
        }
    }

    /// Move the cache counters into the execution statistics
    pub fn flush_stats(&mut self, stats: &ExecutionStats) {
        let (stores, hits) = self.cache.take_counters();
        stats.record_cse(stores, hits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::expression::Op;

    #[test]
    fn test_predicate_semantics() {
        let mut ev = RowEvaluator::new(0);
        let row = [Value::Null, Value::Boolean(true), Value::text("x")];
        let load = |i| Program::new(vec![Op::LoadColumn(i), Op::Return]);
        assert!(!ev.evaluate_bool(&load(0), &row).unwrap());
        assert!(ev.evaluate_bool(&load(1), &row).unwrap());
        assert!(ev.evaluate_bool(&load(2), &row).is_err());
    }

    #[test]
    fn test_flush_stats() {
        let stats = ExecutionStats::default();
        let mut ev = RowEvaluator::new(1);
        let prog = Program::new(vec![
            Op::LoadSlotOrJump(0, 3),
            Op::LoadConst(Value::Integer(1)),
            Op::StoreSlot(0),
            Op::Return,
        ]);
        for _ in 0..3 {
            ev.begin_row();
            ev.evaluate(&prog, &[]).unwrap();
            ev.evaluate(&prog, &[]).unwrap();
        }
        ev.flush_stats(&stats);
        let s = stats.snapshot();
        assert_eq!((s.cse_stores, s.cse_hits), (3, 3));
    }
}
