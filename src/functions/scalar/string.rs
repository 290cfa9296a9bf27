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

//! String scalar functions

use crate::core::{Error, Result, Value};
use crate::functions::{FunctionInfo, FunctionSignature, FunctionType, ScalarFunction};
use crate::validate_arg_count;

use super::value_to_string;

// ============================================================================
// UPPER
// ============================================================================

/// UPPER function - converts a string to uppercase
#[derive(Default)]
pub struct UpperFunction;

impl ScalarFunction for UpperFunction {
    fn name(&self) -> &str {
        "UPPER"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "UPPER",
            FunctionType::Scalar,
            "Converts a string to uppercase",
            FunctionSignature::exact(1),
        )
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        validate_arg_count!(args, "UPPER", 1);

        if args[0].is_null() {
            return Ok(Value::Null);
        }

        Ok(Value::text(value_to_string(&args[0]).to_uppercase()))
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(UpperFunction)
    }
}

// ============================================================================
// LOWER
// ============================================================================

/// LOWER function - converts a string to lowercase
#[derive(Default)]
pub struct LowerFunction;

impl ScalarFunction for LowerFunction {
    fn name(&self) -> &str {
        "LOWER"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "LOWER",
            FunctionType::Scalar,
            "Converts a string to lowercase",
            FunctionSignature::exact(1),
        )
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        validate_arg_count!(args, "LOWER", 1);

        if args[0].is_null() {
            return Ok(Value::Null);
        }

        Ok(Value::text(value_to_string(&args[0]).to_lowercase()))
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(LowerFunction)
    }
}

// ============================================================================
// LENGTH
// ============================================================================

/// LENGTH function - number of characters in a string
#[derive(Default)]
pub struct LengthFunction;

impl ScalarFunction for LengthFunction {
    fn name(&self) -> &str {
        "LENGTH"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "LENGTH",
            FunctionType::Scalar,
            "Returns the number of characters in a string",
            FunctionSignature::exact(1),
        )
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        validate_arg_count!(args, "LENGTH", 1);

        match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::Text(s) => Ok(Value::Integer(s.chars().count() as i64)),
            Value::Boolean(_) => Err(Error::invalid_argument("LENGTH argument must be a string")),
            other => Ok(Value::Integer(other.to_string().chars().count() as i64)),
        }
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(LengthFunction)
    }
}
