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

//! Query Execution
//!
//! [`Executor`] compiles a [`BoundPlan`] once: the CTE graph is analyzed and
//! dead CTEs dropped, every surviving CTE and the outer query are compiled
//! into [`CompiledQuery`] values, and the result is a [`CompiledPlan`] that
//! can run any number of times. Running a plan materializes CTEs level by
//! level into a fresh [`CteRegistry`] and then evaluates the outer query.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::core::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::optimizer::{plan_ctes, CompilationOptions};
use crate::plan::{BoundPlan, Query};
use crate::storage::SourceCatalog;

use super::block::{BlockInput, CompiledBlock};
use super::context::ExecutionContext;
use super::cte::CteRegistry;
use super::result::ResultTable;
use super::scheduler::{CteTask, LevelScheduler};

/// A compiled UNION ALL of one or more blocks
#[derive(Debug)]
pub struct CompiledQuery {
    columns: Vec<String>,
    branches: Vec<CompiledBlock>,
}

impl CompiledQuery {
    /// Compile every branch; `resolve` maps a relation name to its input
    fn compile<R>(
        query: &Query,
        resolve: &R,
        functions: &FunctionRegistry,
        options: &CompilationOptions,
    ) -> Result<Self>
    where
        R: Fn(&str) -> Result<(BlockInput, Vec<String>)>,
    {
        let Some(first) = query.branches.first() else {
            return Err(Error::invalid_plan("query has no SELECT block"));
        };
        let columns = first.output_columns();

        let mut branches = Vec::with_capacity(query.branches.len());
        for select in &query.branches {
            let (input, input_columns) = resolve(&select.from)?;
            let block = CompiledBlock::compile(select, input, &input_columns, functions, options)?;
            if block.columns().len() != columns.len() {
                return Err(Error::invalid_plan(format!(
                    "UNION ALL branches select {} and {} columns",
                    columns.len(),
                    block.columns().len()
                )));
            }
            branches.push(block);
        }

        Ok(Self { columns, branches })
    }

    /// Output column names (taken from the first branch)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Compiled branches
    pub fn branches(&self) -> &[CompiledBlock] {
        &self.branches
    }

    /// Run every branch and concatenate their rows
    pub fn execute(&self, ctes: &CteRegistry, ctx: &ExecutionContext) -> Result<ResultTable> {
        let mut result = ResultTable::empty(self.columns.clone());
        for block in &self.branches {
            let table = block.execute(ctes, ctx)?;
            result.extend(table.into_rows());
        }
        Ok(result)
    }
}

/// A surviving CTE ready to materialize
#[derive(Debug)]
pub struct CompiledCte {
    name: String,
    level: usize,
    query: CompiledQuery,
}

impl CompiledCte {
    /// Level the CTE runs at
    pub fn level(&self) -> usize {
        self.level
    }

    /// Output column names
    pub fn columns(&self) -> &[String] {
        self.query.columns()
    }
}

impl CteTask for CompiledCte {
    fn name(&self) -> &str {
        &self.name
    }

    fn materialize(&self, ctes: &CteRegistry, ctx: &ExecutionContext) -> Result<ResultTable> {
        self.query.execute(ctes, ctx)
    }
}

/// Compiles and runs bound plans against a catalog of row sources
///
/// The executor owns no per-query state; every call to
/// [`CompiledPlan::execute`] uses the statistics and cancellation token of
/// the context it is given.
#[derive(Debug, Clone)]
pub struct Executor {
    catalog: Arc<SourceCatalog>,
    functions: Arc<FunctionRegistry>,
    options: CompilationOptions,
}

impl Executor {
    /// Create an executor with the builtin functions and default options
    pub fn new(catalog: SourceCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            functions: Arc::new(FunctionRegistry::new()),
            options: CompilationOptions::default(),
        }
    }

    /// Use a specific function registry
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Use specific compilation options
    pub fn with_options(mut self, options: CompilationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Compile a plan
    ///
    /// Fails without running anything on a CTE cycle, a duplicate CTE name,
    /// or any name that does not resolve.
    pub fn compile(&self, plan: &BoundPlan) -> Result<CompiledPlan> {
        let mut plan = plan.clone();
        let cte_plan = plan_ctes(&mut plan)?;

        let mut level_of = FxHashMap::default();
        for (level, members) in cte_plan.levels.iter().enumerate() {
            for &i in members {
                level_of.insert(i, level);
            }
        }

        // Level by level, so every producer's columns are known before its
        // consumers are compiled
        let compile_order: Vec<usize> = cte_plan.levels.iter().flatten().copied().collect();
        let mut ctes: Vec<CompiledCte> = Vec::with_capacity(compile_order.len());
        let mut compiled_index: FxHashMap<String, usize> = FxHashMap::default();
        let mut compiled_of: FxHashMap<usize, usize> = FxHashMap::default();
        for &plan_index in &compile_order {
            let def = &plan.ctes[plan_index];
            let resolve = |name: &str| self.resolve(name, &compiled_index, &ctes);
            let query = CompiledQuery::compile(&def.query, &resolve, &self.functions, &self.options)?;
            compiled_index.insert(def.key(), ctes.len());
            compiled_of.insert(plan_index, ctes.len());
            ctes.push(CompiledCte {
                name: def.name.clone(),
                level: level_of.get(&plan_index).copied().unwrap_or(0),
                query,
            });
        }

        let resolve = |name: &str| self.resolve(name, &compiled_index, &ctes);
        let query = CompiledQuery::compile(&plan.query, &resolve, &self.functions, &self.options)?;

        let mut levels = vec![Vec::new(); cte_plan.levels.len()];
        for (i, cte) in ctes.iter().enumerate() {
            levels[cte.level].push(i);
        }

        // Sequential runs follow declaration order
        let order = cte_plan
            .order
            .iter()
            .map(|i| {
                compiled_of.get(i).copied().ok_or_else(|| {
                    Error::internal(format!("CTE {} is scheduled but was not compiled", i))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let pool = match self.options.max_threads {
            Some(threads) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("quarry-worker-{}", i))
                    .build()
                    .map_err(|e| Error::internal(format!("failed to build worker pool: {}", e)))?,
            )),
            None => None,
        };

        tracing::debug!(
            ctes = ctes.len(),
            levels = levels.len(),
            eliminated = cte_plan.eliminated.len(),
            "plan compiled"
        );

        Ok(CompiledPlan {
            order,
            ctes,
            levels,
            eliminated: cte_plan.eliminated,
            query,
            options: self.options.clone(),
            pool,
        })
    }

    /// Compile and run a plan with a fresh context
    pub fn execute(&self, plan: &BoundPlan) -> Result<ResultTable> {
        self.compile(plan)?.execute(&ExecutionContext::new())
    }

    /// Find the input of a block: a compiled CTE first, then a source
    fn resolve(
        &self,
        name: &str,
        compiled: &FxHashMap<String, usize>,
        ctes: &[CompiledCte],
    ) -> Result<(BlockInput, Vec<String>)> {
        let key = name.to_lowercase();
        if let Some(&i) = compiled.get(&key) {
            return Ok((BlockInput::Cte(key), ctes[i].columns().to_vec()));
        }
        match self.catalog.get(name) {
            Some(source) => {
                let columns = source.columns().to_vec();
                Ok((BlockInput::Source(source), columns))
            }
            None => Err(Error::TableNotFound(name.to_string())),
        }
    }
}

/// A compiled plan
pub struct CompiledPlan {
    /// Surviving CTEs, level by level
    ctes: Vec<CompiledCte>,
    /// Indices into `ctes` per level
    levels: Vec<Vec<usize>>,
    /// Indices into `ctes` in sequential run order
    order: Vec<usize>,
    eliminated: Vec<String>,
    query: CompiledQuery,
    options: CompilationOptions,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CompiledPlan {
    /// Run the plan
    ///
    /// Returns the complete result or the first failure; a failed run never
    /// returns rows.
    pub fn execute(&self, ctx: &ExecutionContext) -> Result<ResultTable> {
        match &self.pool {
            Some(pool) => pool.install(|| self.run(ctx)),
            None => self.run(ctx),
        }
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<ResultTable> {
        let start = Instant::now();
        let scheduler = if self.options.parallel_ctes() {
            LevelScheduler::parallel()
        } else {
            LevelScheduler::sequential()
        };

        let mut registry = CteRegistry::new();
        scheduler.run(&self.ctes, &self.levels, &self.order, ctx, &mut registry)?;
        ctx.check_cancelled()?;

        let result = self.query.execute(&registry, ctx)?;
        tracing::debug!(
            rows = result.row_count(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "plan executed"
        );
        Ok(result)
    }

    /// Names of the CTEs that will run, level by level
    pub fn levels(&self) -> Vec<Vec<String>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|&i| self.ctes[i].name.clone()).collect())
            .collect()
    }

    /// Names of CTEs removed because nothing reads them
    pub fn eliminated(&self) -> &[String] {
        &self.eliminated
    }

    /// Output column names
    pub fn columns(&self) -> &[String] {
        self.query.columns()
    }

    /// Options the plan was compiled with
    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Text description of levels, eliminated CTEs and CSE slots
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "mode: {}", self.options.parallelization);
        for (n, level) in self.levels.iter().enumerate() {
            let names: Vec<&str> = level.iter().map(|&i| self.ctes[i].name.as_str()).collect();
            let _ = writeln!(out, "level {}: {}", n, names.join(", "));
        }
        if !self.eliminated.is_empty() {
            let _ = writeln!(out, "eliminated: {}", self.eliminated.join(", "));
        }
        for &i in &self.order {
            let cte = &self.ctes[i];
            let _ = writeln!(out, "cte {}:", cte.name);
            for block in cte.query.branches() {
                block.describe("  ", &mut out);
            }
        }
        let _ = writeln!(out, "query:");
        for block in self.query.branches() {
            block.describe("  ", &mut out);
        }
        out
    }
}

impl std::fmt::Debug for CompiledPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPlan")
            .field("levels", &self.levels())
            .field("eliminated", &self.eliminated)
            .field("columns", &self.columns())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::plan::{col, count_star, lit, sum, CteDefinition, SelectQuery};
    use crate::storage::MemoryTable;
    use crate::row;

    fn executor() -> Executor {
        let mut catalog = SourceCatalog::new();
        catalog.register(
            MemoryTable::with_columns("t", &["k", "v"], vec![row![1, 10], row![1, 20], row![2, 5]])
                .unwrap(),
        );
        catalog.register(MemoryTable::with_columns("base", &["k", "v"], vec![row![7, 70]]).unwrap());
        Executor::new(catalog)
    }

    #[test]
    fn test_levels_and_elimination() {
        let plan = BoundPlan::new(
            vec![
                CteDefinition::new("a", SelectQuery::from("t").select(col("k")).select(col("v"))),
                CteDefinition::new("b", SelectQuery::from("a").select(col("v"))),
                CteDefinition::new("unused", SelectQuery::from("t").select(col("k"))),
            ],
            SelectQuery::from("b").select(col("v")),
        );
        let compiled = executor().compile(&plan).unwrap();
        assert_eq!(compiled.levels(), vec![vec!["a".to_string()], vec!["b".to_string()]]);
        assert_eq!(compiled.eliminated(), &["unused".to_string()]);

        let result = compiled.execute(&ExecutionContext::new()).unwrap();
        assert_eq!(result.row_count(), 3);
        let description = compiled.describe();
        assert!(description.contains("level 1: b"));
        assert!(description.contains("eliminated: unused"));
    }

    #[test]
    fn test_forward_reference() {
        let plan = BoundPlan::new(
            vec![
                CteDefinition::new("late", SelectQuery::from("early").select(col("k"))),
                CteDefinition::new("early", SelectQuery::from("t").select(col("k"))),
            ],
            SelectQuery::from("late").select(col("k")),
        );
        for options in [CompilationOptions::default(), CompilationOptions::sequential()] {
            let result = executor().with_options(options).execute(&plan).unwrap();
            assert_eq!(result.row_count(), 3);
        }
    }

    #[test]
    fn test_union_all() {
        let q = Query::from(SelectQuery::from("t").select(col("k")))
            .union_all(SelectQuery::from("t").select(col("v")));
        let result = executor().execute(&BoundPlan::simple(q)).unwrap();
        assert_eq!(result.columns(), &["k".to_string()]);
        assert_eq!(result.row_count(), 6);

        let bad = Query::from(SelectQuery::from("t").select(col("k")))
            .union_all(SelectQuery::from("t").select(col("k")).select(col("v")));
        assert!(matches!(
            executor().compile(&BoundPlan::simple(bad)),
            Err(Error::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_resolution_errors() {
        let missing = BoundPlan::simple(SelectQuery::from("nope").select(col("k")));
        assert_eq!(
            executor().compile(&missing).unwrap_err(),
            Error::TableNotFound("nope".into())
        );

        let bad_column = BoundPlan::simple(SelectQuery::from("t").select(col("zzz")));
        assert!(matches!(
            executor().compile(&bad_column),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_cte_shadows_source() {
        let plan = BoundPlan::new(
            vec![CteDefinition::new(
                "T",
                SelectQuery::from("base").select(col("k")).select(col("v")),
            )],
            SelectQuery::from("t").select(sum(col("v"))),
        );
        let result = executor().execute(&plan).unwrap();
        assert_eq!(result.rows()[0][0], Value::from(70));

        // Reading its own name is a cycle, not a read of the source
        let plan = BoundPlan::new(
            vec![CteDefinition::new(
                "t",
                SelectQuery::from("t").filter(col("k").eq(lit(2))).select(col("k")),
            )],
            SelectQuery::from("t").select(count_star()),
        );
        assert!(matches!(
            executor().compile(&plan),
            Err(Error::CircularCteReference { .. })
        ));
    }

    #[test]
    fn test_dedicated_pool() {
        let plan = BoundPlan::simple(SelectQuery::from("t").select(count_star()));
        let exec = executor().with_options(CompilationOptions::default().with_max_threads(2));
        let result = exec.execute(&plan).unwrap();
        assert_eq!(result.rows()[0][0], Value::from(3));
    }
}
