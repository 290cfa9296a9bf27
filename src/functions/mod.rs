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

//! Functions
//!
//! Scalar functions are opaque calls resolved by name through a
//! [`FunctionRegistry`]. Aggregate functions keep no state of their own:
//! they fold values into the [`Group`](crate::executor::group::Group) that
//! owns the aggregate's binding.

pub mod aggregate;
pub mod registry;
pub mod scalar;

use crate::core::{Error, Result, Value};
use crate::executor::group::Group;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionType {
    /// Aggregate function (operates on multiple rows)
    Aggregate,
    /// Scalar function (operates on a single row)
    Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Minimum number of arguments
    pub min_args: usize,
    /// Maximum number of arguments
    pub max_args: usize,
}

impl FunctionSignature {
    /// Create a new function signature
    pub fn new(min_args: usize, max_args: usize) -> Self {
        Self { min_args, max_args }
    }

    /// Signature with an exact argument count
    pub fn exact(count: usize) -> Self {
        Self::new(count, count)
    }

    /// Signature accepting one or more arguments
    pub fn variadic() -> Self {
        Self::new(1, usize::MAX)
    }

    /// Validate argument count
    pub fn validate_arg_count(&self, count: usize) -> Result<()> {
        if count < self.min_args {
            return Err(Error::invalid_argument(format!(
                "expected at least {} arguments, got {}",
                self.min_args, count
            )));
        }
        if count > self.max_args {
            return Err(Error::invalid_argument(format!(
                "expected at most {} arguments, got {}",
                self.max_args, count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Function name
    pub name: String,
    /// Function type
    pub function_type: FunctionType,
    /// Description
    pub description: String,
    /// Signature
    pub signature: FunctionSignature,
    /// Same arguments always give the same result, with no side effects
    pub deterministic: bool,
}

impl FunctionInfo {
    /// Create a new deterministic function info
    pub fn new(
        name: impl Into<String>,
        function_type: FunctionType,
        description: impl Into<String>,
        signature: FunctionSignature,
    ) -> Self {
        Self {
            name: name.into(),
            function_type,
            description: description.into(),
            signature,
            deterministic: true,
        }
    }

    /// Mark the function as volatile
    pub fn volatile(mut self) -> Self {
        self.deterministic = false;
        self
    }

    /// Get the function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the function type
    pub fn function_type(&self) -> FunctionType {
        self.function_type
    }

    /// Get the description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the signature
    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }
}

/// Names of the accumulators an aggregate call owns inside a group
///
/// Built once per call at compile time so the per-row path never formats
/// strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateBinding {
    /// Primary accumulator (sum, count, min or max)
    pub value: Box<str>,
    /// Secondary counter (AVG's non-null count)
    pub count: Box<str>,
    /// Seen-set of a DISTINCT call
    pub seen: Box<str>,
}

impl AggregateBinding {
    /// Derive every accumulator name from one binding name
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        Self {
            value: Box::from(name),
            count: format!("{}#n", name).into_boxed_str(),
            seen: format!("{}#seen", name).into_boxed_str(),
        }
    }

    /// The binding name
    pub fn name(&self) -> &str {
        &self.value
    }
}

/// Trait for aggregate functions
///
/// Implementations are stateless; the group passed in holds the state. NULL
/// inputs never reach `accumulate` except for functions that count rows.
pub trait AggregateFunction: Send + Sync {
    /// Get the function name
    fn name(&self) -> &str;

    /// Get function information
    fn info(&self) -> FunctionInfo;

    /// Fold one non-NULL value into the group
    fn accumulate(&self, group: &Group, binding: &AggregateBinding, value: &Value) -> Result<()>;

    /// Read the final value out of the group
    fn result(&self, group: &Group, binding: &AggregateBinding) -> Result<Value>;

    /// Clone the function into a new instance
    fn clone_box(&self) -> Box<dyn AggregateFunction>;
}

/// Trait for scalar functions
pub trait ScalarFunction: Send + Sync {
    /// Get the function name
    fn name(&self) -> &str;

    /// Get function information
    fn info(&self) -> FunctionInfo;

    /// Evaluate the function with the given arguments
    fn evaluate(&self, args: &[Value]) -> Result<Value>;

    /// Clone the function into a new instance
    fn clone_box(&self) -> Box<dyn ScalarFunction>;
}

// Re-export main types
pub use aggregate::{
    AvgFunction, CountFunction, CountStarFunction, DistinctAggregate, MaxFunction, MinFunction,
    SumFunction,
};
pub use registry::FunctionRegistry;
pub use scalar::{
    AbsFunction, CoalesceFunction, LengthFunction, LowerFunction, RandomFunction, RoundFunction,
    UpperFunction,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_signature_validation() {
        let sig = FunctionSignature::exact(1);
        assert!(sig.validate_arg_count(1).is_ok());
        assert!(sig.validate_arg_count(0).is_err());
        assert!(sig.validate_arg_count(2).is_err());
    }

    #[test]
    fn test_variadic_signature() {
        let sig = FunctionSignature::variadic();
        assert!(sig.validate_arg_count(1).is_ok());
        assert!(sig.validate_arg_count(10).is_ok());
        assert!(sig.validate_arg_count(0).is_err());
    }

    #[test]
    fn test_function_info() {
        let info = FunctionInfo::new("TEST", FunctionType::Scalar, "Test function", FunctionSignature::exact(0));
        assert_eq!(info.name, "TEST");
        assert!(info.deterministic);
        assert!(!info.volatile().deterministic);
    }

    #[test]
    fn test_binding_names() {
        let b = AggregateBinding::new("agg0");
        assert_eq!(b.name(), "agg0");
        assert_ne!(b.count, b.value);
        assert_ne!(b.seen, b.count);
    }
}
