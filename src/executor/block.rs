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

//! Query block execution
//!
//! A block reads one input relation (a source or a materialized CTE),
//! filters it and either projects each row or folds the rows into the group
//! hierarchy. Row work is split into partitions above the row threshold;
//! every partition owns its evaluator and therefore its row cache.

use std::sync::Arc;

use crate::core::{Error, Result, Row, Value};
use crate::functions::{
    AggregateBinding, AggregateFunction, CountStarFunction, DistinctAggregate, FunctionRegistry,
};
use crate::optimizer::{analyze_block, collect_aggregates, CompilationOptions, CseAnalysis};
use crate::plan::SelectQuery;
use crate::storage::RowSource;

use super::context::ExecutionContext;
use super::cte::CteRegistry;
use super::evaluator::RowEvaluator;
use super::expression::{CompileContext, ExprCompiler, Program};
use super::group::{GroupHierarchy, GroupKey};
use super::parallel::{run_partitions, Partitioning};
use super::result::{ResultTable, ResultWriter};

/// Where a block reads its rows from
#[derive(Clone)]
pub enum BlockInput {
    /// A CTE materialized earlier in the same execution
    Cte(String),
    /// A registered row source
    Source(Arc<dyn RowSource>),
}

impl BlockInput {
    /// Name of the relation
    pub fn name(&self) -> &str {
        match self {
            BlockInput::Cte(name) => name,
            BlockInput::Source(source) => source.name(),
        }
    }
}

impl std::fmt::Debug for BlockInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockInput::Cte(name) => write!(f, "Cte({})", name),
            BlockInput::Source(source) => write!(f, "Source({})", source.name()),
        }
    }
}

/// Rows of an input relation for the duration of one block
enum InputRows {
    Shared(Arc<ResultTable>),
    Owned(Vec<Row>),
}

impl InputRows {
    fn rows(&self) -> &[Row] {
        match self {
            InputRows::Shared(table) => table.rows(),
            InputRows::Owned(rows) => rows,
        }
    }
}

/// One aggregate call, bound to its accumulator names
pub(crate) struct CompiledAggregate {
    function: Box<dyn AggregateFunction>,
    /// None for COUNT(*)
    argument: Option<Program>,
    binding: AggregateBinding,
    level: usize,
    text: String,
}

/// Grouped part of a block
pub(crate) struct AggregatePlan {
    key_names: Vec<String>,
    keys: Vec<Program>,
    aggregates: Vec<CompiledAggregate>,
    having: Option<Program>,
    /// SELECT list over `[keys.., aggregates..]`
    projections: Vec<Program>,
}

pub(crate) enum BlockKind {
    Project(Vec<Program>),
    Aggregate(AggregatePlan),
}

/// A compiled SELECT block
pub struct CompiledBlock {
    input: BlockInput,
    columns: Vec<String>,
    filter: Option<Program>,
    kind: BlockKind,
    cse: CseAnalysis,
    partitioning: Partitioning,
    text: String,
}

impl CompiledBlock {
    /// Compile a block against the columns of its input
    pub fn compile(
        select: &SelectQuery,
        input: BlockInput,
        input_columns: &[String],
        functions: &FunctionRegistry,
        options: &CompilationOptions,
    ) -> Result<Self> {
        if select.projections.is_empty() {
            return Err(Error::invalid_plan(format!(
                "query block over '{}' selects no columns",
                select.from
            )));
        }

        let cse = if options.enable_cse {
            analyze_block(select, &|call| {
                call.deterministic && functions.is_deterministic(&call.name)
            })
        } else {
            CseAnalysis::disabled()
        };

        let input_ctx = CompileContext::new(input_columns, functions);
        let mut input_compiler = ExprCompiler::new(&input_ctx, &cse.input);
        let filter = select
            .filter
            .as_ref()
            .map(|f| input_compiler.compile(f))
            .transpose()?;

        let kind = if select.is_grouped() {
            let keys = select
                .group_by
                .iter()
                .map(|k| input_compiler.compile(k))
                .collect::<Result<Vec<_>>>()?;
            let depth = select.group_by.len();

            let calls = collect_aggregates(select);
            let mut aggregates = Vec::with_capacity(calls.len());
            for (i, (_, call)) in calls.iter().enumerate() {
                if call.level > depth {
                    return Err(Error::GroupLevelOutOfRange {
                        level: call.level,
                        depth,
                    });
                }
                let base: Box<dyn AggregateFunction> = match &call.argument {
                    None => Box::new(CountStarFunction),
                    Some(_) => functions
                        .get_aggregate(call.function.name())
                        .ok_or_else(|| Error::FunctionNotFound(call.function.name().to_string()))?,
                };
                let function: Box<dyn AggregateFunction> = if call.distinct && call.argument.is_some()
                {
                    Box::new(DistinctAggregate::new(base))
                } else {
                    base
                };
                let argument = call
                    .argument
                    .as_ref()
                    .map(|a| input_compiler.compile(a))
                    .transpose()?;
                aggregates.push(CompiledAggregate {
                    function,
                    argument,
                    binding: AggregateBinding::new(format!("agg{}", i)),
                    level: call.level,
                    text: crate::plan::Expr::Aggregate(call.clone()).to_string(),
                });
            }

            let fps: Vec<_> = calls.into_iter().map(|(fp, _)| fp).collect();
            let output_ctx = CompileContext::for_aggregated_rows(&select.group_by, &fps, functions);
            let mut output_compiler = ExprCompiler::new(&output_ctx, &cse.output);
            let having = select
                .having
                .as_ref()
                .map(|h| output_compiler.compile(h))
                .transpose()?;
            let projections = select
                .projections
                .iter()
                .map(|p| output_compiler.compile(&p.expr))
                .collect::<Result<Vec<_>>>()?;

            BlockKind::Aggregate(AggregatePlan {
                key_names: select.group_by.iter().map(|k| k.to_string()).collect(),
                keys,
                aggregates,
                having,
                projections,
            })
        } else {
            let projections = select
                .projections
                .iter()
                .map(|p| input_compiler.compile(&p.expr))
                .collect::<Result<Vec<_>>>()?;
            BlockKind::Project(projections)
        };

        Ok(Self {
            input,
            columns: select.output_columns(),
            filter,
            kind,
            cse,
            partitioning: Partitioning::from_options(options),
            text: select.to_string(),
        })
    }

    /// Output column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// CSE slots of this block
    pub fn cse(&self) -> &CseAnalysis {
        &self.cse
    }

    /// Relation the block reads
    pub fn input(&self) -> &BlockInput {
        &self.input
    }

    /// True if the block aggregates
    pub fn is_grouped(&self) -> bool {
        matches!(self.kind, BlockKind::Aggregate(_))
    }

    /// Execute the block
    pub fn execute(&self, ctes: &CteRegistry, ctx: &ExecutionContext) -> Result<ResultTable> {
        ctx.check_cancelled()?;
        let input = self.read_input(ctes, ctx)?;
        match &self.kind {
            BlockKind::Project(projections) => self.execute_projection(projections, input.rows(), ctx),
            BlockKind::Aggregate(plan) => self.execute_aggregation(plan, input.rows(), ctx),
        }
    }

    fn read_input(&self, ctes: &CteRegistry, ctx: &ExecutionContext) -> Result<InputRows> {
        match &self.input {
            BlockInput::Cte(name) => ctes.get(name).map(InputRows::Shared).ok_or_else(|| {
                Error::concurrency_invariant(format!(
                    "CTE '{}' read before its level was published",
                    name
                ))
            }),
            BlockInput::Source(source) => {
                let rows = source.scan(ctx)?;
                let width = source.columns().len();
                if let Some(bad) = rows.iter().find(|r| r.len() != width) {
                    return Err(Error::invalid_argument(format!(
                        "source '{}' returned a row of {} values for {} columns",
                        source.name(),
                        bad.len(),
                        width
                    )));
                }
                ctx.stats().record_scan(rows.len());
                Ok(InputRows::Owned(rows))
            }
        }
    }

    fn execute_projection(
        &self,
        projections: &[Program],
        rows: &[Row],
        ctx: &ExecutionContext,
    ) -> Result<ResultTable> {
        let writer = ResultWriter::new(self.columns.clone());
        let slots = self.cse.input.slot_count();

        run_partitions(rows, self.partitioning, ctx, |partition, scope| {
            let mut ev = RowEvaluator::new(slots);
            let mut out = Vec::with_capacity(partition.len());
            for row in partition {
                ev.begin_row();
                if let Some(filter) = &self.filter {
                    if !ev.evaluate_bool(filter, row)? {
                        continue;
                    }
                }
                let values = projections
                    .iter()
                    .map(|p| ev.evaluate(p, row))
                    .collect::<Result<Vec<Value>>>()?;
                out.push(Row::from_values(values));
            }
            ev.flush_stats(scope.stats());
            writer.append_batch(out);
            Ok(())
        })?;

        Ok(writer.finish())
    }

    fn execute_aggregation(
        &self,
        plan: &AggregatePlan,
        rows: &[Row],
        ctx: &ExecutionContext,
    ) -> Result<ResultTable> {
        let hierarchy = GroupHierarchy::new(plan.key_names.clone());
        if plan.keys.is_empty() {
            // Aggregates without GROUP BY report one row even for no input
            hierarchy.get_or_create_chain(&GroupKey::empty())?;
        }
        let slots = self.cse.input.slot_count();

        run_partitions(rows, self.partitioning, ctx, |partition, scope| {
            let mut ev = RowEvaluator::new(slots);
            let mut args: Vec<Option<Value>> = Vec::with_capacity(plan.aggregates.len());
            for row in partition {
                ev.begin_row();
                if let Some(filter) = &self.filter {
                    if !ev.evaluate_bool(filter, row)? {
                        continue;
                    }
                }
                let key = plan
                    .keys
                    .iter()
                    .map(|k| ev.evaluate(k, row))
                    .collect::<Result<Vec<Value>>>()?;
                args.clear();
                for agg in &plan.aggregates {
                    args.push(match &agg.argument {
                        Some(program) => Some(ev.evaluate(program, row)?),
                        None => None,
                    });
                }

                let id = hierarchy.get_or_create_chain(&GroupKey::new(key))?;
                let arena = hierarchy.read();
                arena.hit_chain(id)?;
                for (agg, arg) in plan.aggregates.iter().zip(&args) {
                    match arg {
                        Some(value) if !value.is_null() => {
                            let group = arena.group(id, agg.level)?;
                            agg.function.accumulate(group, &agg.binding, value)?;
                        }
                        _ => {}
                    }
                }
            }
            ev.flush_stats(scope.stats());
            Ok(())
        })?;

        ctx.stats().record_groups(hierarchy.len());
        self.emit_groups(plan, &hierarchy, ctx)
    }

    /// Turn every leaf group into an output row
    fn emit_groups(
        &self,
        plan: &AggregatePlan,
        hierarchy: &GroupHierarchy,
        ctx: &ExecutionContext,
    ) -> Result<ResultTable> {
        ctx.check_cancelled()?;
        let arena = hierarchy.read();
        let mut ev = RowEvaluator::new(self.cse.output.slot_count());
        let mut out = Vec::new();

        for id in arena.leaf_ids() {
            let leaf = arena.group(id, 0)?;
            let mut values: Vec<Value> =
                Vec::with_capacity(leaf.field_values().len() + plan.aggregates.len());
            values.extend_from_slice(leaf.field_values());
            for agg in &plan.aggregates {
                let group = arena.group(id, agg.level)?;
                values.push(agg.function.result(group, &agg.binding)?);
            }

            ev.begin_row();
            if let Some(having) = &plan.having {
                if !ev.evaluate_bool(having, &values)? {
                    continue;
                }
            }
            let projected = plan
                .projections
                .iter()
                .map(|p| ev.evaluate(p, &values))
                .collect::<Result<Vec<Value>>>()?;
            out.push(Row::from_values(projected));
        }
        ev.flush_stats(ctx.stats());
        Ok(ResultTable::new(self.columns.clone(), out))
    }

    /// Human-readable summary for plan descriptions
    pub(crate) fn describe(&self, indent: &str, out: &mut String) {
        use std::fmt::Write;
        let _ = writeln!(out, "{}{}", indent, self.text);
        if let BlockKind::Aggregate(plan) = &self.kind {
            for agg in &plan.aggregates {
                let _ = writeln!(
                    out,
                    "{}  aggregate {} -> {} (level {})",
                    indent,
                    agg.text,
                    agg.binding.name(),
                    agg.level
                );
            }
        }
        for (scope, analysis) in [("input", &self.cse.input), ("output", &self.cse.output)] {
            for c in analysis.candidates() {
                let _ = writeln!(
                    out,
                    "{}  cse {} slot {}: {} (x{})",
                    indent, scope, c.slot, c.expr_text, c.occurrences
                );
            }
        }
    }
}

impl std::fmt::Debug for CompiledBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledBlock")
            .field("input", &self.input)
            .field("columns", &self.columns)
            .field("grouped", &self.is_grouped())
            .finish()
    }
}
