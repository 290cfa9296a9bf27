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

//! Math scalar functions

use rand::Rng;
use rust_decimal::RoundingStrategy;

use crate::core::{Error, Result, Value};
use crate::functions::{FunctionInfo, FunctionSignature, FunctionType, ScalarFunction};
use crate::validate_arg_count;

use super::value_to_i64;

// ============================================================================
// ABS
// ============================================================================

/// ABS function - returns the absolute value of a number
#[derive(Default)]
pub struct AbsFunction;

impl ScalarFunction for AbsFunction {
    fn name(&self) -> &str {
        "ABS"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "ABS",
            FunctionType::Scalar,
            "Returns the absolute value of a number",
            FunctionSignature::exact(1),
        )
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        validate_arg_count!(args, "ABS", 1);

        match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| Error::NumericOverflow("ABS".to_string())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
            _ => Err(Error::invalid_argument("ABS argument must be a number")),
        }
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(AbsFunction)
    }
}

// ============================================================================
// ROUND
// ============================================================================

/// ROUND function - rounds a number to a specified number of decimal places
#[derive(Default)]
pub struct RoundFunction;

impl ScalarFunction for RoundFunction {
    fn name(&self) -> &str {
        "ROUND"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "ROUND",
            FunctionType::Scalar,
            "Rounds a number to a specified number of decimal places",
            FunctionSignature::new(1, 2),
        )
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        validate_arg_count!(args, "ROUND", 1, 2);

        if args[0].is_null() {
            return Ok(Value::Null);
        }

        // Default to 0 decimal places if not specified
        let places = if args.len() == 2 && !args[1].is_null() {
            value_to_i64(&args[1])
                .ok_or_else(|| Error::invalid_argument("ROUND decimal places must be an integer"))?
        } else {
            0
        };

        match &args[0] {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Decimal(d) => {
                let dp = places.clamp(0, 28) as u32;
                Ok(Value::Decimal(
                    d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
                ))
            }
            Value::Float(f) => {
                let shift = 10_f64.powi(places.clamp(-308, 308) as i32);
                Ok(Value::Float((f * shift).round() / shift))
            }
            _ => Err(Error::invalid_argument("ROUND first argument must be a number")),
        }
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(RoundFunction)
    }
}

// ============================================================================
// RANDOM
// ============================================================================

/// RANDOM function - returns a random float in [0, 1)
///
/// Volatile: two calls in one row are never merged into one.
#[derive(Default)]
pub struct RandomFunction;

impl ScalarFunction for RandomFunction {
    fn name(&self) -> &str {
        "RANDOM"
    }

    fn info(&self) -> FunctionInfo {
        FunctionInfo::new(
            "RANDOM",
            FunctionType::Scalar,
            "Returns a random float between 0 (inclusive) and 1 (exclusive)",
            FunctionSignature::exact(0),
        )
        .volatile()
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        validate_arg_count!(args, "RANDOM", 0);

        // Use thread-local RNG for proper randomness
        let random = rand::rng().random::<f64>();

        Ok(Value::Float(random))
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(RandomFunction)
    }
}
