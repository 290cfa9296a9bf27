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

//! Function Registry
//!
//! Each executor owns its registry; nothing is registered process-wide, so
//! two engines can carry different user functions side by side.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::StringMap;
use crate::core::{Result, Value};

use super::aggregate::{AvgFunction, CountFunction, MaxFunction, MinFunction, SumFunction};
use super::scalar::{
    AbsFunction, CoalesceFunction, LengthFunction, LowerFunction, RandomFunction, RoundFunction,
    UpperFunction,
};
use super::{AggregateFunction, FunctionInfo, FunctionSignature, FunctionType, ScalarFunction};

/// Type alias for aggregate function factory
type AggregateFnFactory = Arc<dyn Fn() -> Box<dyn AggregateFunction> + Send + Sync>;
/// Type alias for scalar function factory
type ScalarFnFactory = Arc<dyn Fn() -> Box<dyn ScalarFunction> + Send + Sync>;
/// Body of a caller-supplied scalar function
type ScalarFnBody = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Function registry for SQL functions
pub struct FunctionRegistry {
    /// Aggregate functions
    aggregate_functions: RwLock<StringMap<AggregateFnFactory>>,
    /// Scalar functions
    scalar_functions: RwLock<StringMap<ScalarFnFactory>>,
    /// Function info cache
    function_info: RwLock<StringMap<FunctionInfo>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new function registry with all built-in functions registered
    pub fn new() -> Self {
        let registry = Self::empty();

        // Register built-in aggregate functions
        registry.register_aggregate::<CountFunction>();
        registry.register_aggregate::<SumFunction>();
        registry.register_aggregate::<AvgFunction>();
        registry.register_aggregate::<MinFunction>();
        registry.register_aggregate::<MaxFunction>();

        // Register built-in scalar functions
        registry.register_scalar::<UpperFunction>();
        registry.register_scalar::<LowerFunction>();
        registry.register_scalar::<LengthFunction>();
        registry.register_scalar::<AbsFunction>();
        registry.register_scalar::<RoundFunction>();
        registry.register_scalar::<RandomFunction>();
        registry.register_scalar::<CoalesceFunction>();

        registry
    }

    /// Create a registry with no functions at all
    pub fn empty() -> Self {
        Self {
            aggregate_functions: RwLock::new(StringMap::default()),
            scalar_functions: RwLock::new(StringMap::default()),
            function_info: RwLock::new(StringMap::default()),
        }
    }

    /// Register an aggregate function
    pub fn register_aggregate<F: AggregateFunction + Default + 'static>(&self) {
        let instance = F::default();
        let name = instance.name().to_uppercase();
        let info = instance.info();

        self.aggregate_functions
            .write()
            .insert(name.clone(), Arc::new(|| Box::new(F::default())));
        self.function_info.write().insert(name, info);
    }

    /// Register a scalar function
    pub fn register_scalar<F: ScalarFunction + Default + 'static>(&self) {
        let instance = F::default();
        let name = instance.name().to_uppercase();
        let info = instance.info();

        self.scalar_functions
            .write()
            .insert(name.clone(), Arc::new(|| Box::new(F::default())));
        self.function_info.write().insert(name, info);
    }

    /// Register a scalar function from a closure
    ///
    /// Replaces any function of the same name, builtins included.
    pub fn register_fn<F>(&self, name: &str, deterministic: bool, body: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.to_uppercase();
        let mut info = FunctionInfo::new(
            name.clone(),
            FunctionType::Scalar,
            "User-defined function",
            FunctionSignature::new(0, usize::MAX),
        );
        info.deterministic = deterministic;

        let function = ClosureFunction {
            info: info.clone(),
            body: Arc::new(body),
        };
        self.scalar_functions
            .write()
            .insert(name.clone(), Arc::new(move || Box::new(function.clone())));
        self.function_info.write().insert(name, info);
    }

    /// Get a new instance of an aggregate function by name
    pub fn get_aggregate(&self, name: &str) -> Option<Box<dyn AggregateFunction>> {
        let funcs = self.aggregate_functions.read();
        if let Some(f) = funcs.get(name) {
            return Some(f());
        }
        funcs.get(&name.to_uppercase()).map(|f| f())
    }

    /// Get a new instance of a scalar function by name
    pub fn get_scalar(&self, name: &str) -> Option<Box<dyn ScalarFunction>> {
        let funcs = self.scalar_functions.read();
        if let Some(f) = funcs.get(name) {
            return Some(f());
        }
        funcs.get(&name.to_uppercase()).map(|f| f())
    }

    /// Get function information
    pub fn get_info(&self, name: &str) -> Option<FunctionInfo> {
        self.function_info.read().get(&name.to_uppercase()).cloned()
    }

    /// Check if a function name is an aggregate function
    pub fn is_aggregate(&self, name: &str) -> bool {
        self.aggregate_functions
            .read()
            .contains_key(&name.to_uppercase())
    }

    /// Check if a function name is a scalar function
    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalar_functions
            .read()
            .contains_key(&name.to_uppercase())
    }

    /// True if the named function is known and deterministic
    ///
    /// Unknown names report false so they are never cached.
    pub fn is_deterministic(&self, name: &str) -> bool {
        self.function_info
            .read()
            .get(&name.to_uppercase())
            .is_some_and(|info| info.deterministic)
    }

    /// List all registered function names
    pub fn list_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.function_info.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.list_functions())
            .finish()
    }
}

/// Scalar function backed by a closure
#[derive(Clone)]
struct ClosureFunction {
    info: FunctionInfo,
    body: ScalarFnBody,
}

impl ScalarFunction for ClosureFunction {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn info(&self) -> FunctionInfo {
        self.info.clone()
    }

    fn evaluate(&self, args: &[Value]) -> Result<Value> {
        (self.body)(args)
    }

    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(self.clone())
    }
}
