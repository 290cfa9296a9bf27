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

//! Scalar Functions
//!
//! A small builtin set; callers add their own through
//! [`FunctionRegistry::register_fn`](crate::functions::FunctionRegistry::register_fn).

mod math;
mod string;
mod utility;

pub use math::{AbsFunction, RandomFunction, RoundFunction};
pub use string::{LengthFunction, LowerFunction, UpperFunction};
pub use utility::CoalesceFunction;

use crate::core::Value;

#[macro_export]
macro_rules! validate_arg_count {
    // Exact count
    ($args:expr, $name:expr, $exact:expr) => {
        if $args.len() != $exact {
            return Err($crate::core::Error::invalid_argument(format!(
                "{} requires exactly {} argument{}, got {}",
                $name,
                $exact,
                if $exact == 1 { "" } else { "s" },
                $args.len()
            )));
        }
    };
    // Range (min to max inclusive)
    ($args:expr, $name:expr, $min:expr, $max:expr) => {
        if $args.len() < $min || $args.len() > $max {
            return Err($crate::core::Error::invalid_argument(format!(
                "{} requires {} to {} arguments, got {}",
                $name,
                $min,
                $max,
                $args.len()
            )));
        }
    };
}

/// Convert a Value to a string representation
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Text(s) => s.to_string(),
        other => other.to_string(),
    }
}

/// Try to convert a Value to i64
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) => Some(*f as i64),
        Value::Text(s) => s.parse().ok(),
        other => other.as_int64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&Value::Integer(42)), "42");
        assert_eq!(value_to_string(&Value::Float(3.5)), "3.5");
        assert_eq!(value_to_string(&Value::text("hello")), "hello");
        assert_eq!(value_to_string(&Value::Boolean(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
    }

    #[test]
    fn test_value_to_i64() {
        assert_eq!(value_to_i64(&Value::Integer(42)), Some(42));
        assert_eq!(value_to_i64(&Value::Float(3.7)), Some(3));
        assert_eq!(value_to_i64(&Value::text("100")), Some(100));
        assert_eq!(value_to_i64(&Value::Null), None);
    }
}
