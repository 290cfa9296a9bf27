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

// Expression Compiler
//
// Compiles bound expressions into VM programs. Compilation is where every
// name is resolved, so a missing column or function fails the whole plan
// before any row is read.
//
// One ExprCompiler compiles all programs of a row scope, in the order they
// run for each row. It tracks which cache slots are certainly filled by the
// time a given instruction runs:
//
//   - an occurrence reached on every row fills its slot; later occurrences
//     read the slot with LoadSlot
//   - an occurrence that may be skipped (right operand of AND/OR, CASE
//     branches after the first WHEN) compiles to LoadSlotOrJump, the
//     computation, then StoreSlot, and leaves the slot "maybe filled"
//
// A slot's computation therefore runs at most once per row, and never
// runs on a row whose evaluation short-circuits past every occurrence.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::ops::{Op, Target};
use super::program::{Program, ProgramBuilder};
use crate::core::{Error, Result, Value};
use crate::functions::FunctionRegistry;
use crate::optimizer::{fingerprint, CseScope, ExpressionFingerprint, FingerprintTable};
use crate::plan::{BinaryOp, CaseExpr, Expr, FunctionCall, UnaryOp};

/// Name resolution for one row layout
pub struct CompileContext<'a> {
    /// Column name -> index (case-insensitive)
    columns: FxHashMap<String, u16>,

    /// Subtrees that are columns of the row (GROUP BY keys and aggregate
    /// results of an aggregated row)
    bindings: FxHashMap<ExpressionFingerprint, u16>,

    /// Function registry
    functions: &'a FunctionRegistry,

    /// Rows are aggregated: bare columns must be GROUP BY keys
    aggregated: bool,
}

impl<'a> CompileContext<'a> {
    /// Context for rows of a relation with the given columns
    pub fn new(columns: &[String], functions: &'a FunctionRegistry) -> Self {
        let mut col_map = FxHashMap::default();
        for (i, col) in columns.iter().enumerate() {
            // First occurrence wins
            col_map.entry(col.to_lowercase()).or_insert(i as u16);
        }
        Self {
            columns: col_map,
            bindings: FxHashMap::default(),
            functions,
            aggregated: false,
        }
    }

    /// Context for aggregated rows laid out as `[keys.., aggregates..]`
    pub fn for_aggregated_rows(
        keys: &[Expr],
        aggregates: &[ExpressionFingerprint],
        functions: &'a FunctionRegistry,
    ) -> Self {
        let mut bindings = FxHashMap::default();
        for (i, fp) in keys
            .iter()
            .map(fingerprint)
            .chain(aggregates.iter().cloned())
            .enumerate()
        {
            bindings.entry(fp).or_insert(i as u16);
        }
        Self {
            columns: FxHashMap::default(),
            bindings,
            functions,
            aggregated: true,
        }
    }

    /// Find the index of a column
    pub fn column_index(&self, name: &str) -> Option<u16> {
        self.columns.get(&name.to_lowercase()).copied()
    }
}

/// Expression compiler for one row scope
pub struct ExprCompiler<'a> {
    ctx: &'a CompileContext<'a>,
    scope: &'a CseScope,
    /// Slots filled on every row before the next emitted instruction
    stored: FxHashSet<usize>,
    /// Slots that may or may not be filled
    pending: FxHashSet<usize>,
    /// Nesting depth of code that may be skipped
    conditional: usize,
    /// Subtree fingerprints of the expression being compiled
    fingerprints: FingerprintTable,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(ctx: &'a CompileContext<'a>, scope: &'a CseScope) -> Self {
        Self {
            ctx,
            scope,
            stored: FxHashSet::default(),
            pending: FxHashSet::default(),
            conditional: 0,
            fingerprints: FingerprintTable::default(),
        }
    }

    /// Compile the next program of the scope
    ///
    /// Programs must be compiled in the order they run for a row, and a
    /// program compiled here may only be skipped for a row if every program
    /// after it is skipped too (a failed WHERE ends the row).
    pub fn compile(&mut self, expr: &Expr) -> Result<Program> {
        let mut builder = ProgramBuilder::new();
        if self.ctx.aggregated || !self.scope.is_empty() {
            self.fingerprints = FingerprintTable::build(expr);
        }
        let compiled = self.compile_expr(expr, &mut builder);
        self.fingerprints = FingerprintTable::default();
        compiled?;
        builder.emit(Op::Return);
        if builder.len() > Target::MAX as usize {
            return Err(Error::invalid_plan(format!(
                "expression is too large to compile: {}",
                expr
            )));
        }
        Ok(builder.build())
    }

    /// Compile an expression, consulting bindings and cache slots first
    fn compile_expr(&mut self, expr: &Expr, builder: &mut ProgramBuilder) -> Result<()> {
        if matches!(expr, Expr::Literal(_)) {
            return self.compile_node(expr, builder);
        }

        let (binding, slot) = match self.fingerprints.get(expr) {
            Some(fp) => (self.ctx.bindings.get(fp).copied(), self.scope.slot_of(fp)),
            None => (None, None),
        };

        if let Some(idx) = binding {
            builder.emit(Op::LoadColumn(idx));
            return Ok(());
        }

        let Some(slot) = slot else {
            return self.compile_node(expr, builder);
        };

        if self.stored.contains(&slot) {
            builder.emit(Op::LoadSlot(slot as u16));
            return Ok(());
        }

        if self.conditional == 0 && !self.pending.contains(&slot) {
            self.compile_node(expr, builder)?;
            builder.emit(Op::StoreSlot(slot as u16));
            self.stored.insert(slot);
            return Ok(());
        }

        let slot_check = builder.position();
        builder.emit(Op::LoadSlotOrJump(slot as u16, 0));
        self.compile_node(expr, builder)?;
        builder.emit(Op::StoreSlot(slot as u16));
        let end = builder.position();
        builder.patch_jump(slot_check, end);

        if self.conditional == 0 {
            self.pending.remove(&slot);
            self.stored.insert(slot);
        } else {
            self.pending.insert(slot);
        }
        Ok(())
    }

    /// Run `f` with everything it emits marked as possibly skipped
    fn conditionally<F>(&mut self, builder: &mut ProgramBuilder, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &mut ProgramBuilder) -> Result<()>,
    {
        self.conditional += 1;
        let result = f(self, builder);
        self.conditional -= 1;
        result
    }

    /// Compile a node without checking bindings or slots for the node itself
    fn compile_node(&mut self, expr: &Expr, builder: &mut ProgramBuilder) -> Result<()> {
        match expr {
            Expr::Literal(Value::Null) => builder.emit(Op::LoadNull),
            Expr::Literal(value) => builder.emit(Op::LoadConst(value.clone())),

            Expr::Column(name) => {
                if self.ctx.aggregated {
                    return Err(Error::invalid_plan(format!(
                        "column '{}' must appear in GROUP BY or inside an aggregate",
                        name
                    )));
                }
                let idx = self
                    .ctx
                    .column_index(name)
                    .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
                builder.emit(Op::LoadColumn(idx));
            }

            Expr::Binary { op, left, right } => match op {
                // Short-circuit AND
                BinaryOp::And | BinaryOp::Or => {
                    self.compile_expr(left, builder)?;
                    let jump_pos = builder.position();
                    builder.emit(if *op == BinaryOp::And {
                        Op::And(0)
                    } else {
                        Op::Or(0)
                    });
                    self.conditionally(builder, |c, b| c.compile_expr(right, b))?;
                    builder.emit(if *op == BinaryOp::And {
                        Op::AndFinalize
                    } else {
                        Op::OrFinalize
                    });
                    // Skip right side and finalize when the left decides
                    let end_pos = builder.position();
                    builder.patch_jump(jump_pos, end_pos);
                }
                _ => {
                    self.compile_expr(left, builder)?;
                    self.compile_expr(right, builder)?;
                    builder.emit(match op {
                        BinaryOp::Add => Op::Add,
                        BinaryOp::Sub => Op::Sub,
                        BinaryOp::Mul => Op::Mul,
                        BinaryOp::Div => Op::Div,
                        BinaryOp::Mod => Op::Mod,
                        BinaryOp::Eq => Op::Eq,
                        BinaryOp::Ne => Op::Ne,
                        BinaryOp::Lt => Op::Lt,
                        BinaryOp::Le => Op::Le,
                        BinaryOp::Gt => Op::Gt,
                        BinaryOp::Ge => Op::Ge,
                        BinaryOp::Concat => Op::Concat,
                        BinaryOp::And | BinaryOp::Or => unreachable!(),
                    });
                }
            },

            Expr::Unary { op, expr } => {
                self.compile_expr(expr, builder)?;
                builder.emit(match op {
                    UnaryOp::Not => Op::Not,
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::IsNull => Op::IsNull,
                    UnaryOp::IsNotNull => Op::IsNotNull,
                });
            }

            Expr::Call(call) => self.compile_function(call, builder)?,

            Expr::Case(case) => self.compile_case(case, builder)?,

            Expr::Aggregate(_) => {
                return Err(Error::invalid_plan(format!(
                    "aggregate {} is not allowed here",
                    expr
                )));
            }
        }
        Ok(())
    }

    /// Compile a CASE expression
    ///
    /// Only the operand and the first WHEN run on every row.
    fn compile_case(&mut self, case: &CaseExpr, builder: &mut ProgramBuilder) -> Result<()> {
        if case.when_clauses.is_empty() {
            return Err(Error::invalid_plan("CASE without WHEN"));
        }
        let is_simple = case.operand.is_some();
        let mut end_jumps = Vec::with_capacity(case.when_clauses.len());

        // For simple CASE, compile the operand once
        if let Some(operand) = &case.operand {
            self.compile_expr(operand, builder)?;
        }

        for (i, (when, then)) in case.when_clauses.iter().enumerate() {
            let compile_when = |c: &mut Self, b: &mut ProgramBuilder| -> Result<()> {
                if is_simple {
                    b.emit(Op::Dup);
                    c.compile_expr(when, b)?;
                    b.emit(Op::CaseCompare);
                } else {
                    c.compile_expr(when, b)?;
                }
                Ok(())
            };
            if i == 0 {
                compile_when(self, builder)?;
            } else {
                self.conditionally(builder, compile_when)?;
            }

            // Jump to next branch unless the condition holds
            let when_pos = builder.position();
            builder.emit(Op::CaseWhen(0));

            if is_simple {
                builder.emit(Op::Pop);
            }
            self.conditionally(builder, |c, b| c.compile_expr(then, b))?;

            end_jumps.push(builder.position());
            builder.emit(Op::Jump(0));

            let next_pos = builder.position();
            builder.patch_jump(when_pos, next_pos);
        }

        if is_simple {
            builder.emit(Op::Pop);
        }
        match &case.else_value {
            Some(else_value) => {
                self.conditionally(builder, |c, b| c.compile_expr(else_value, b))?
            }
            None => builder.emit(Op::LoadNull),
        }

        let end_pos = builder.position();
        for pos in end_jumps {
            builder.patch_jump(pos, end_pos);
        }
        Ok(())
    }

    /// Compile a scalar function call
    fn compile_function(&mut self, call: &FunctionCall, builder: &mut ProgramBuilder) -> Result<()> {
        let func = self
            .ctx
            .functions
            .get_scalar(&call.name)
            .ok_or_else(|| Error::FunctionNotFound(call.name.clone()))?;
        func.info()
            .signature()
            .validate_arg_count(call.args.len())
            .map_err(|e| Error::invalid_plan(format!("{}: {}", func.name(), e)))?;
        let arg_count = u8::try_from(call.args.len()).map_err(|_| {
            Error::invalid_plan(format!("{}: too many arguments", func.name()))
        })?;

        for arg in &call.args {
            self.compile_expr(arg, builder)?;
        }
        builder.emit(Op::CallScalar {
            func: Arc::from(func),
            arg_count,
        });
        Ok(())
    }
}
