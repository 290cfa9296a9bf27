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

//! SUM aggregate function

use crate::core::{Result, Value};
use crate::executor::group::Group;
use crate::functions::{
    AggregateBinding, AggregateFunction, FunctionInfo, FunctionSignature, FunctionType,
};

use super::decimal_arg;

/// SUM aggregate function
///
/// Returns the decimal sum of all non-NULL values, or NULL when the group saw
/// none.
#[derive(Default)]
pub struct SumFunction;

impl AggregateFunction for SumFunction {
    fn name(&self) -> &str {
        "SUM"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "SUM",
            FunctionType::Aggregate,
            "Returns the sum of all non-NULL values in the specified column",
            FunctionSignature::exact(1),
        )
    }

    fn accumulate(&self, group: &Group, binding: &AggregateBinding, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        group.add_decimal_value(&binding.value, decimal_arg("SUM", value)?)?;
        Ok(())
    }

    fn result(&self, group: &Group, binding: &AggregateBinding) -> Result<Value> {
        Ok(group
            .decimal_value(&binding.value)?
            .map(Value::Decimal)
            .unwrap_or(Value::Null))
    }

    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(SumFunction)
    }
}
