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

//! AVG aggregate function

use rust_decimal::Decimal;

use crate::core::{Error, Result, Value};
use crate::executor::group::Group;
use crate::functions::{
    AggregateBinding, AggregateFunction, FunctionInfo, FunctionSignature, FunctionType,
};

use super::decimal_arg;

/// AVG aggregate function
///
/// Keeps a decimal sum and a non-NULL count under two bindings. Averaging
/// zero values is a division by zero and fails the query.
#[derive(Default)]
pub struct AvgFunction;

impl AggregateFunction for AvgFunction {
    fn name(&self) -> &str {
        "AVG"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "AVG",
            FunctionType::Aggregate,
            "Returns the average of all non-NULL values in the specified column",
            FunctionSignature::exact(1),
        )
    }

    fn accumulate(&self, group: &Group, binding: &AggregateBinding, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        group.add_decimal_value(&binding.value, decimal_arg("AVG", value)?)?;
        group.increment_int_value(&binding.count)?;
        Ok(())
    }

    fn result(&self, group: &Group, binding: &AggregateBinding) -> Result<Value> {
        let count = group.int_value(&binding.count)?.unwrap_or(0);
        if count == 0 {
            return Err(Error::aggregate_division_by_zero("AVG", binding.name()));
        }
        let sum = group.decimal_value(&binding.value)?.unwrap_or(Decimal::ZERO);
        sum.checked_div(Decimal::from(count))
            .map(Value::Decimal)
            .ok_or_else(|| Error::NumericOverflow(format!("AVG of '{}'", binding.name())))
    }

    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(AvgFunction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::aggregate::test_group;

    #[test]
    fn test_avg() {
        let g = test_group();
        let b = AggregateBinding::new("a");
        for v in [Value::from(1), Value::Null, Value::from(2.0), Value::from(6)] {
            AvgFunction.accumulate(&g, &b, &v).unwrap();
        }
        assert_eq!(AvgFunction.result(&g, &b).unwrap(), Value::from(3));
    }

    #[test]
    fn test_avg_of_nothing_is_an_error() {
        let g = test_group();
        let b = AggregateBinding::new("a");
        AvgFunction.accumulate(&g, &b, &Value::Null).unwrap();
        assert_eq!(
            AvgFunction.result(&g, &b).unwrap_err(),
            Error::aggregate_division_by_zero("AVG", "a")
        );
    }
}
