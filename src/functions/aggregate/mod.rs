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

//! Aggregate Functions
//!
//! This module provides aggregate functions for SQL queries:
//!
//! - [`CountStarFunction`] - COUNT(*)
//! - [`CountFunction`] - COUNT(column)
//! - [`SumFunction`] - SUM(column)
//! - [`AvgFunction`] - AVG(column)
//! - [`MinFunction`] - MIN(column)
//! - [`MaxFunction`] - MAX(column)
//! - [`DistinctAggregate`] - the DISTINCT variant of any of the above
//!
//! Every numeric input is converted through [`ToDecimal`], so integers,
//! floats and decimals feeding one binding accumulate and compare as one
//! type.

mod avg;
mod count;
mod max;
mod min;
mod sum;

pub use avg::AvgFunction;
pub use count::{CountFunction, CountStarFunction};
pub use max::MaxFunction;
pub use min::MinFunction;
pub use sum::SumFunction;

use rust_decimal::Decimal;

use crate::core::{Error, Result, ToDecimal, Value};
use crate::executor::group::Group;

use super::{AggregateBinding, AggregateFunction, FunctionInfo};

/// Convert an aggregate argument to the decimal accumulator type
pub(crate) fn decimal_arg(function: &str, value: &Value) -> Result<Decimal> {
    value
        .to_decimal()
        .ok_or_else(|| Error::aggregate_type(function, value.data_type().to_string()))
}

/// DISTINCT wrapper: forwards each distinct non-NULL value once per group
pub struct DistinctAggregate {
    inner: Box<dyn AggregateFunction>,
}

impl DistinctAggregate {
    /// Wrap an aggregate function
    pub fn new(inner: Box<dyn AggregateFunction>) -> Self {
        Self { inner }
    }
}

impl AggregateFunction for DistinctAggregate {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn info(&self) -> FunctionInfo {
        self.inner.info()
    }

    fn accumulate(&self, group: &Group, binding: &AggregateBinding, value: &Value) -> Result<()> {
        if group.insert_distinct(&binding.seen, value)? {
            self.inner.accumulate(group, binding, value)?;
        }
        Ok(())
    }

    fn result(&self, group: &Group, binding: &AggregateBinding) -> Result<Value> {
        self.inner.result(group, binding)
    }

    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(DistinctAggregate {
            inner: self.inner.clone_box(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_group() -> Group {
    use std::sync::Arc;
    Group::new(None, Arc::from(Vec::<String>::new()), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_arg() {
        assert_eq!(decimal_arg("SUM", &Value::from(2)).unwrap(), Decimal::from(2));
        assert_eq!(decimal_arg("SUM", &Value::from(0.5)).unwrap(), Decimal::new(5, 1));
        assert!(matches!(
            decimal_arg("SUM", &Value::from("x")),
            Err(Error::AggregateType { .. })
        ));
    }

    #[test]
    fn test_distinct_across_numeric_subtypes() {
        let g = test_group();
        let b = AggregateBinding::new("s");
        let sum = DistinctAggregate::new(Box::new(SumFunction));
        for v in [Value::from(1), Value::from(1.0), Value::Decimal(Decimal::ONE), Value::from(2)] {
            sum.accumulate(&g, &b, &v).unwrap();
        }
        assert_eq!(sum.result(&g, &b).unwrap(), Value::from(3));

        let g = test_group();
        let count = DistinctAggregate::new(Box::new(CountFunction));
        for v in [1, 2, 2, 3, 3, 3] {
            count.accumulate(&g, &b, &Value::from(v)).unwrap();
        }
        assert_eq!(count.result(&g, &b).unwrap(), Value::from(3));
        assert_eq!(count.name(), "COUNT");
    }
}
