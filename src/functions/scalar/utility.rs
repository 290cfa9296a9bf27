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

//! Utility scalar functions

use crate::core::{Error, Result, Value};
use crate::functions::{FunctionInfo, FunctionSignature, FunctionType, ScalarFunction};

// ============================================================================
// COALESCE
// ============================================================================

/// COALESCE function - returns the first non-null argument
///
/// Arguments are evaluated before the call, like any other function.
#[derive(Default)]
pub struct CoalesceFunction;

impl ScalarFunction for CoalesceFunction {
    fn name(&self) -> &str {
        "COALESCE"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "COALESCE",
            FunctionType::Scalar,
            "Returns the first non-null value in a list",
            FunctionSignature::variadic(),
        )
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        if args.is_empty() {
            return Err(Error::invalid_argument(
                "COALESCE requires at least 1 argument",
            ));
        }

        // Return the first non-null value
        Ok(args
            .iter()
            .find(|arg| !arg.is_null())
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(CoalesceFunction)
    }
}
