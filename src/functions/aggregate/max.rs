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

//! MAX aggregate function

use rust_decimal::Decimal;

use crate::core::{Result, Value};
use crate::executor::group::Group;
use crate::functions::{
    AggregateBinding, AggregateFunction, FunctionInfo, FunctionSignature, FunctionType,
};

use super::decimal_arg;

/// MAX aggregate function
///
/// The accumulator starts at [`Decimal::MIN`]. A group with no hits, or with
/// no non-NULL input, reports NULL rather than the sentinel.
#[derive(Default)]
pub struct MaxFunction;

impl MaxFunction {
    /// Value of the accumulator, the sentinel if nothing was folded in
    pub fn raw_state(group: &Group, binding: &AggregateBinding) -> Result<Decimal> {
        Ok(group.decimal_value(&binding.value)?.unwrap_or(Decimal::MIN))
    }
}

impl AggregateFunction for MaxFunction {
    fn name(&self) -> &str {
        "MAX"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "MAX",
            FunctionType::Aggregate,
            "Returns the maximum non-NULL value in the specified column",
            FunctionSignature::exact(1),
        )
    }

    fn accumulate(&self, group: &Group, binding: &AggregateBinding, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        group.update_decimal_if_greater(&binding.value, decimal_arg("MAX", value)?)?;
        Ok(())
    }

    fn result(&self, group: &Group, binding: &AggregateBinding) -> Result<Value> {
        if group.hits() == 0 || !group.has_binding(&binding.value) {
            return Ok(Value::Null);
        }
        Ok(Value::Decimal(Self::raw_state(group, binding)?))
    }

    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(MaxFunction)
    }
}
