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

//! COUNT aggregate functions

use crate::core::{Result, Value};
use crate::executor::group::Group;
use crate::functions::{
    AggregateBinding, AggregateFunction, FunctionInfo, FunctionSignature, FunctionType,
};

/// COUNT(*) - the number of rows that reached the group
///
/// Reads the group's hit counter, so it needs no accumulator of its own.
#[derive(Default)]
pub struct CountStarFunction;

impl AggregateFunction for CountStarFunction {
    fn name(&self) -> &str {
        "COUNT"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "COUNT",
            FunctionType::Aggregate,
            "Returns the number of rows in the group",
            FunctionSignature::exact(0),
        )
    }

    fn accumulate(&self, _group: &Group, _binding: &AggregateBinding, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn result(&self, group: &Group, _binding: &AggregateBinding) -> Result<Value> {
        Ok(Value::Integer(group.hits() as i64))
    }

    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(CountStarFunction)
    }
}

/// COUNT(column) - the number of non-NULL values
#[derive(Default)]
pub struct CountFunction;

impl AggregateFunction for CountFunction {
    fn name(&self) -> &str {
        "COUNT"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "COUNT",
            FunctionType::Aggregate,
            "Returns the number of non-NULL values in the specified column",
            FunctionSignature::exact(1),
        )
    }

    fn accumulate(&self, group: &Group, binding: &AggregateBinding, value: &Value) -> Result<()> {
        if !value.is_null() {
            group.increment_int_value(&binding.value)?;
        }
        Ok(())
    }

    fn result(&self, group: &Group, binding: &AggregateBinding) -> Result<Value> {
        Ok(Value::Integer(group.int_value(&binding.value)?.unwrap_or(0)))
    }

    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(CountFunction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::aggregate::test_group;

    #[test]
    fn test_count_star_reads_hits() {
        let g = test_group();
        let b = AggregateBinding::new("c");
        for _ in 0..3 {
            g.hit();
        }
        assert_eq!(CountStarFunction.result(&g, &b).unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_count_column_ignores_nulls() {
        let g = test_group();
        let b = AggregateBinding::new("c");
        let count = CountFunction;
        count.accumulate(&g, &b, &Value::from(1)).unwrap();
        count.accumulate(&g, &b, &Value::Null).unwrap();
        count.accumulate(&g, &b, &Value::from("x")).unwrap();
        assert_eq!(count.result(&g, &b).unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_count_empty_is_zero() {
        let g = test_group();
        let b = AggregateBinding::new("c");
        assert_eq!(CountFunction.result(&g, &b).unwrap(), Value::Integer(0));
        assert_eq!(CountStarFunction.result(&g, &b).unwrap(), Value::Integer(0));
    }
}
