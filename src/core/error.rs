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

//! Error types for Quarry
//!
//! Every failure the engine can report is a variant of [`Error`]. The variants
//! fall into four families, each with a classification predicate:
//!
//! - compile-time plan errors ([`Error::is_compile_error`]), raised before
//!   anything executes
//! - aggregate errors ([`Error::is_aggregate_error`])
//! - task faults ([`Error::is_task_fault`]), raised from inside a parallel unit
//! - concurrency invariant violations, which must never surface

use thiserror::Error;

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Quarry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Plan errors (compile time)
    // =========================================================================
    /// CTE references form a cycle
    #[error("circular CTE reference: {}", path.join(" -> "))]
    CircularCteReference { path: Vec<String> },

    /// Two CTEs declared under the same name
    #[error("CTE '{0}' is declared more than once")]
    DuplicateCte(String),

    /// Table or CTE not found
    #[error("table or CTE '{0}' not found")]
    TableNotFound(String),

    /// Column not found in the input of a query block
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// Scalar function not registered
    #[error("function '{0}' not found")]
    FunctionNotFound(String),

    /// Structurally invalid plan
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Invalid argument or option
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Evaluation errors
    // =========================================================================
    /// Type error during expression evaluation
    #[error("type error: {0}")]
    Type(String),

    /// Scalar division by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Numeric overflow in arithmetic or accumulation
    #[error("numeric overflow in {0}")]
    NumericOverflow(String),

    /// Scalar function failed
    #[error("function '{function}' failed: {message}")]
    FunctionFailed { function: String, message: String },

    // =========================================================================
    // Aggregate errors
    // =========================================================================
    /// AVG (or another ratio aggregate) saw zero non-null contributions
    #[error("division by zero in {function} for '{binding}': no non-null input")]
    AggregateDivisionByZero { function: String, binding: String },

    /// Aggregate input could not be converted to its accumulator type
    #[error("aggregate {function} cannot accept {value_type} input")]
    AggregateType {
        function: String,
        value_type: String,
    },

    /// Group level addresses an ancestor that does not exist
    #[error("group level {level} out of range (depth {depth})")]
    GroupLevelOutOfRange { level: usize, depth: usize },

    // =========================================================================
    // Task faults
    // =========================================================================
    /// A CTE task failed; the inner error is the original fault
    #[error("CTE '{cte}' failed: {reason}")]
    CteFailed { cte: String, reason: Box<Error> },

    /// A parallel unit panicked
    #[error("task '{task}' panicked: {message}")]
    TaskPanicked { task: String, message: String },

    // =========================================================================
    // Other errors
    // =========================================================================
    /// Shared state was observed in a state that correct synchronization rules out
    #[error("concurrency invariant violated: {0}")]
    ConcurrencyInvariant(String),

    /// Query cancelled by the caller or by a sibling fault
    #[error("query cancelled")]
    QueryCancelled,

    /// Internal error for unexpected conditions
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new CircularCteReference error
    pub fn circular_cte(path: Vec<String>) -> Self {
        Error::CircularCteReference { path }
    }

    /// Create a new InvalidPlan error
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Error::InvalidPlan(message.into())
    }

    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Create a new Type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Create a new FunctionFailed error
    pub fn function_failed(function: impl Into<String>, message: impl Into<String>) -> Self {
        Error::FunctionFailed {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a new AggregateDivisionByZero error
    pub fn aggregate_division_by_zero(
        function: impl Into<String>,
        binding: impl Into<String>,
    ) -> Self {
        Error::AggregateDivisionByZero {
            function: function.into(),
            binding: binding.into(),
        }
    }

    /// Create a new AggregateType error
    pub fn aggregate_type(function: impl Into<String>, value_type: impl Into<String>) -> Self {
        Error::AggregateType {
            function: function.into(),
            value_type: value_type.into(),
        }
    }

    /// Wrap a fault raised while materializing a CTE
    ///
    /// Cancellation passes through unwrapped so callers can still recognize it.
    pub fn cte_failed(cte: impl Into<String>, reason: Error) -> Self {
        match reason {
            Error::QueryCancelled => Error::QueryCancelled,
            other @ Error::CteFailed { .. } => other,
            other => Error::CteFailed {
                cte: cte.into(),
                reason: Box::new(other),
            },
        }
    }

    /// Create a new TaskPanicked error
    pub fn task_panicked(task: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TaskPanicked {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a new ConcurrencyInvariant error
    pub fn concurrency_invariant(message: impl Into<String>) -> Self {
        Error::ConcurrencyInvariant(message.into())
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error aborts compilation before execution starts
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Error::CircularCteReference { .. }
                | Error::DuplicateCte(_)
                | Error::TableNotFound(_)
                | Error::ColumnNotFound(_)
                | Error::FunctionNotFound(_)
                | Error::InvalidPlan(_)
        )
    }

    /// Check if this is an aggregate runtime error
    pub fn is_aggregate_error(&self) -> bool {
        match self {
            Error::AggregateDivisionByZero { .. }
            | Error::AggregateType { .. }
            | Error::GroupLevelOutOfRange { .. } => true,
            Error::CteFailed { reason, .. } => reason.is_aggregate_error(),
            _ => false,
        }
    }

    /// Check if this is a fault raised inside a parallel unit
    pub fn is_task_fault(&self) -> bool {
        matches!(self, Error::CteFailed { .. } | Error::TaskPanicked { .. })
    }

    /// Check if this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::QueryCancelled)
    }

    /// The innermost error, looking through CTE fault wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::CteFailed { reason, .. } => reason.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::circular_cte(vec!["a".into(), "b".into(), "a".into()]).to_string(),
            "circular CTE reference: a -> b -> a"
        );
        assert_eq!(
            Error::TableNotFound("orders".to_string()).to_string(),
            "table or CTE 'orders' not found"
        );
        assert_eq!(
            Error::aggregate_division_by_zero("AVG", "avg_price").to_string(),
            "division by zero in AVG for 'avg_price': no non-null input"
        );
        assert_eq!(Error::QueryCancelled.to_string(), "query cancelled");
    }

    #[test]
    fn test_cte_failed_wrapping() {
        let err = Error::cte_failed("totals", Error::DivisionByZero);
        assert_eq!(err.to_string(), "CTE 'totals' failed: division by zero");
        assert!(err.is_task_fault());
        assert_eq!(err.root_cause(), &Error::DivisionByZero);

        // Already wrapped faults keep the innermost CTE name
        let nested = Error::cte_failed("outer", err.clone());
        assert_eq!(nested, err);

        // Cancellation is never wrapped
        assert_eq!(
            Error::cte_failed("x", Error::QueryCancelled),
            Error::QueryCancelled
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::circular_cte(vec![]).is_compile_error());
        assert!(Error::DuplicateCte("a".into()).is_compile_error());
        assert!(!Error::QueryCancelled.is_compile_error());

        let avg = Error::aggregate_division_by_zero("AVG", "x");
        assert!(avg.is_aggregate_error());
        assert!(Error::cte_failed("c", avg).is_aggregate_error());

        assert!(Error::task_panicked("c", "boom").is_task_fault());
        assert!(!Error::DivisionByZero.is_task_fault());
        assert!(Error::QueryCancelled.is_cancelled());
    }
}
