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

// Expression Virtual Machine
//
// Executes compiled Programs against one input row. Cached subexpressions
// live in the caller's RowCache, which the caller resets between rows.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use smallvec::SmallVec;

use super::ops::Op;
use super::program::Program;
use crate::core::{Error, Result, Value};
use crate::executor::row_cache::RowCache;

/// Inline capacity for the evaluation stack
const STACK_INLINE_CAPACITY: usize = 16;

/// Capacity for reusable args buffer (most functions have <= 4 args)
const ARGS_BUFFER_CAPACITY: usize = 8;

/// Expression Virtual Machine
///
/// The VM is reusable: call execute() with different rows. One VM belongs to
/// one thread at a time.
pub struct ExprVM {
    /// Evaluation stack (reused between executions)
    stack: SmallVec<[Value; STACK_INLINE_CAPACITY]>,

    /// Reusable buffer for function arguments
    args_buffer: SmallVec<[Value; ARGS_BUFFER_CAPACITY]>,
}

impl ExprVM {
    pub fn new() -> Self {
        Self {
            stack: SmallVec::new(),
            args_buffer: SmallVec::new(),
        }
    }

    /// Execute a program and return the result
    pub fn execute(&mut self, program: &Program, row: &[Value], cache: &mut RowCache) -> Result<Value> {
        if self.stack.capacity() < program.max_stack_depth() {
            self.stack
                .reserve(program.max_stack_depth() - self.stack.capacity());
        }
        self.stack.clear();

        let ops = program.ops();
        let mut pc: usize = 0;

        while pc < ops.len() {
            match &ops[pc] {
                // =============================================================
                // LOAD OPERATIONS
                // =============================================================
                Op::LoadColumn(idx) => {
                    let value = row.get(*idx as usize).cloned().ok_or_else(|| {
                        Error::internal(format!(
                            "column index {} out of range for a row of {} values",
                            idx,
                            row.len()
                        ))
                    })?;
                    self.stack.push(value);
                    pc += 1;
                }

                Op::LoadConst(value) => {
                    self.stack.push(value.clone());
                    pc += 1;
                }

                Op::LoadNull => {
                    self.stack.push(Value::Null);
                    pc += 1;
                }

                // =============================================================
                // ROW CACHE
                // =============================================================
                Op::LoadSlot(slot) => {
                    let value = cache.hit(*slot as usize).ok_or_else(|| {
                        Error::internal(format!("cache slot {} read before it was stored", slot))
                    })?;
                    self.stack.push(value);
                    pc += 1;
                }

                Op::LoadSlotOrJump(slot, target) => match cache.hit(*slot as usize) {
                    Some(value) => {
                        self.stack.push(value);
                        pc = *target as usize;
                    }
                    None => pc += 1,
                },

                Op::StoreSlot(slot) => {
                    let value = self.stack.last().cloned().unwrap_or(Value::Null);
                    cache.store(*slot as usize, value);
                    pc += 1;
                }

                // =============================================================
                // ARITHMETIC
                // =============================================================
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = Self::arithmetic(&ops[pc], &a, &b)?;
                    self.stack.push(result);
                    pc += 1;
                }

                Op::Neg => {
                    let v = self.pop();
                    let result = match v {
                        Value::Integer(i) => Value::Integer(
                            i.checked_neg()
                                .ok_or_else(|| Error::NumericOverflow("negation".into()))?,
                        ),
                        Value::Float(f) => Value::Float(-f),
                        Value::Decimal(d) => Value::Decimal(-d),
                        Value::Null => Value::Null,
                        other => {
                            return Err(Error::type_error(format!(
                                "cannot negate {}",
                                other.data_type()
                            )))
                        }
                    };
                    self.stack.push(result);
                    pc += 1;
                }

                Op::Concat => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = if a.is_null() || b.is_null() {
                        Value::Null
                    } else {
                        Value::text(format!("{}{}", a, b))
                    };
                    self.stack.push(result);
                    pc += 1;
                }

                // =============================================================
                // COMPARISON
                // =============================================================
                Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = Self::comparison(&ops[pc], &a, &b)?;
                    self.stack.push(result);
                    pc += 1;
                }

                Op::IsNull => {
                    let v = self.pop();
                    self.stack.push(Value::Boolean(v.is_null()));
                    pc += 1;
                }

                Op::IsNotNull => {
                    let v = self.pop();
                    self.stack.push(Value::Boolean(!v.is_null()));
                    pc += 1;
                }

                // =============================================================
                // LOGICAL OPERATIONS
                // =============================================================
                Op::And(jump_target) => {
                    // Short-circuit AND: if top is false, jump
                    let top = self.stack.last().unwrap_or(&Value::Null);
                    if Self::to_tribool(top)? == Some(false) {
                        pc = *jump_target as usize;
                    } else {
                        pc += 1;
                    }
                }

                Op::Or(jump_target) => {
                    // Short-circuit OR: if top is true, jump
                    let top = self.stack.last().unwrap_or(&Value::Null);
                    if Self::to_tribool(top)? == Some(true) {
                        pc = *jump_target as usize;
                    } else {
                        pc += 1;
                    }
                }

                Op::AndFinalize => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = match (Self::to_tribool(&a)?, Self::to_tribool(&b)?) {
                        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                        (Some(true), Some(true)) => Value::Boolean(true),
                        _ => Value::Null,
                    };
                    self.stack.push(result);
                    pc += 1;
                }

                Op::OrFinalize => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = match (Self::to_tribool(&a)?, Self::to_tribool(&b)?) {
                        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                        (Some(false), Some(false)) => Value::Boolean(false),
                        _ => Value::Null,
                    };
                    self.stack.push(result);
                    pc += 1;
                }

                Op::Not => {
                    let v = self.pop();
                    let result = match Self::to_tribool(&v)? {
                        Some(b) => Value::Boolean(!b),
                        None => Value::Null,
                    };
                    self.stack.push(result);
                    pc += 1;
                }

                // =============================================================
                // CASE EXPRESSION
                // =============================================================
                Op::CaseWhen(next_branch) => {
                    let cond = self.pop();
                    if Self::to_tribool(&cond)? == Some(true) {
                        pc += 1;
                    } else {
                        pc = *next_branch as usize;
                    }
                }

                Op::CaseCompare => {
                    let when_val = self.pop();
                    let case_val = self.pop();
                    let matched = case_val.compare(&when_val) == Some(Ordering::Equal);
                    self.stack.push(Value::Boolean(matched));
                    pc += 1;
                }

                Op::Jump(target) => {
                    pc = *target as usize;
                }

                Op::Dup => {
                    let top = self.stack.last().cloned().unwrap_or(Value::Null);
                    self.stack.push(top);
                    pc += 1;
                }

                Op::Pop => {
                    self.stack.pop();
                    pc += 1;
                }

                // =============================================================
                // FUNCTION CALLS
                // =============================================================
                Op::CallScalar { func, arg_count } => {
                    let start = self.stack.len().saturating_sub(*arg_count as usize);

                    // Reuse args_buffer to avoid allocation
                    self.args_buffer.clear();
                    self.args_buffer.extend(self.stack.drain(start..));

                    let result = func.evaluate(&self.args_buffer)?;
                    self.stack.push(result);
                    pc += 1;
                }

                Op::Return => {
                    return Ok(self.pop());
                }
            }
        }

        Ok(self.pop())
    }

    #[inline]
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    /// Three-valued truth of a value
    #[inline]
    fn to_tribool(v: &Value) -> Result<Option<bool>> {
        match v {
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Integer(i) => Ok(Some(*i != 0)),
            Value::Null => Ok(None),
            other => Err(Error::type_error(format!(
                "expected a boolean, got {}",
                other.data_type()
            ))),
        }
    }

    fn comparison(op: &Op, a: &Value, b: &Value) -> Result<Value> {
        if a.is_null() || b.is_null() {
            return Ok(Value::Null);
        }
        let ord = a.compare(b);
        let result = match (op, ord) {
            (Op::Eq, ord) => ord == Some(Ordering::Equal),
            (Op::Ne, ord) => ord != Some(Ordering::Equal),
            (_, None) => {
                return Err(Error::type_error(format!(
                    "cannot compare {} with {}",
                    a.data_type(),
                    b.data_type()
                )))
            }
            (Op::Lt, Some(o)) => o == Ordering::Less,
            (Op::Le, Some(o)) => o != Ordering::Greater,
            (Op::Gt, Some(o)) => o == Ordering::Greater,
            (_, Some(o)) => o != Ordering::Less,
        };
        Ok(Value::Boolean(result))
    }

    fn arithmetic(op: &Op, a: &Value, b: &Value) -> Result<Value> {
        if a.is_null() || b.is_null() {
            return Ok(Value::Null);
        }
        let name = match op {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            _ => "%",
        };
        let overflow = || Error::NumericOverflow(format!("operator {}", name));

        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => {
                if matches!(op, Op::Div | Op::Mod) && *y == 0 {
                    return Err(Error::DivisionByZero);
                }
                let r = match op {
                    Op::Add => x.checked_add(*y),
                    Op::Sub => x.checked_sub(*y),
                    Op::Mul => x.checked_mul(*y),
                    Op::Div => x.checked_div(*y),
                    _ => x.checked_rem(*y),
                };
                r.map(Value::Integer).ok_or_else(overflow)
            }
            (Value::Float(_), _) | (_, Value::Float(_)) if a.is_numeric() && b.is_numeric() => {
                let x = a.as_float64().unwrap_or(f64::NAN);
                let y = b.as_float64().unwrap_or(f64::NAN);
                if matches!(op, Op::Div | Op::Mod) && y == 0.0 {
                    return Err(Error::DivisionByZero);
                }
                Ok(Value::Float(match op {
                    Op::Add => x + y,
                    Op::Sub => x - y,
                    Op::Mul => x * y,
                    Op::Div => x / y,
                    _ => x % y,
                }))
            }
            _ if a.is_numeric() && b.is_numeric() => {
                let x: Decimal = a.as_decimal().ok_or_else(overflow)?;
                let y: Decimal = b.as_decimal().ok_or_else(overflow)?;
                if matches!(op, Op::Div | Op::Mod) && y.is_zero() {
                    return Err(Error::DivisionByZero);
                }
                let r = match op {
                    Op::Add => x.checked_add(y),
                    Op::Sub => x.checked_sub(y),
                    Op::Mul => x.checked_mul(y),
                    Op::Div => x.checked_div(y),
                    _ => x.checked_rem(y),
                };
                r.map(Value::Decimal).ok_or_else(overflow)
            }
            _ => Err(Error::type_error(format!(
                "cannot apply {} to {} and {}",
                name,
                a.data_type(),
                b.data_type()
            ))),
        }
    }
}

impl Default for ExprVM {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::expression::ProgramBuilder;

    fn run(ops: Vec<Op>, row: &[Value]) -> Result<Value> {
        let mut vm = ExprVM::new();
        let mut cache = RowCache::new(4);
        vm.execute(&Program::new(ops), row, &mut cache)
    }

    #[test]
    fn test_arithmetic_promotion() {
        let row = [Value::Integer(7), Value::Float(0.5), Value::Decimal(Decimal::new(25, 1))];
        let add = |i, j| run(vec![Op::LoadColumn(i), Op::LoadColumn(j), Op::Add, Op::Return], &row);
        assert_eq!(add(0, 0).unwrap(), Value::Integer(14));
        assert_eq!(add(0, 1).unwrap(), Value::Float(7.5));
        assert_eq!(add(0, 2).unwrap(), Value::Decimal(Decimal::new(95, 1)));
    }

    #[test]
    fn test_division_by_zero() {
        let row = [Value::Integer(1), Value::Integer(0)];
        let r = run(vec![Op::LoadColumn(0), Op::LoadColumn(1), Op::Div, Op::Return], &row);
        assert_eq!(r, Err(Error::DivisionByZero));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let row = [Value::Integer(i64::MAX), Value::Integer(1)];
        let r = run(vec![Op::LoadColumn(0), Op::LoadColumn(1), Op::Add, Op::Return], &row);
        assert!(matches!(r, Err(Error::NumericOverflow(_))));
    }

    #[test]
    fn test_three_valued_logic() {
        // NULL AND FALSE = FALSE, NULL OR TRUE = TRUE, NULL AND TRUE = NULL
        let cases = [
            (Value::Null, Value::Boolean(false), false, Value::Boolean(false)),
            (Value::Null, Value::Boolean(true), true, Value::Boolean(true)),
            (Value::Null, Value::Boolean(true), false, Value::Null),
        ];
        for (a, b, or, expected) in cases {
            let mut builder = ProgramBuilder::new();
            builder.emit(Op::LoadConst(a));
            let pos = builder.position();
            builder.emit(if or { Op::Or(0) } else { Op::And(0) });
            builder.emit(Op::LoadConst(b));
            builder.emit(if or { Op::OrFinalize } else { Op::AndFinalize });
            let end = builder.position();
            builder.patch_jump(pos, end);
            builder.emit(Op::Return);
            let mut cache = RowCache::new(0);
            let got = ExprVM::new().execute(&builder.build(), &[], &mut cache).unwrap();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_slot_ops() {
        let mut cache = RowCache::new(1);
        let mut vm = ExprVM::new();
        // slot0 = c0 * 2 computed on the first run, reused on the second
        let prog = Program::new(vec![
            Op::LoadSlotOrJump(0, 5),
            Op::LoadColumn(0),
            Op::LoadConst(Value::Integer(2)),
            Op::Mul,
            Op::StoreSlot(0),
            Op::Return,
        ]);
        let row = [Value::Integer(21)];
        assert_eq!(vm.execute(&prog, &row, &mut cache).unwrap(), Value::Integer(42));
        assert_eq!(vm.execute(&prog, &row, &mut cache).unwrap(), Value::Integer(42));
        assert_eq!(cache.counters(), (1, 1));

        // LoadSlot on an empty slot is a compiler bug, reported as internal
        cache.reset();
        let bad = Program::new(vec![Op::LoadSlot(0), Op::Return]);
        assert!(vm.execute(&bad, &row, &mut cache).is_err());
    }

    #[test]
    fn test_comparison_with_nulls_and_types() {
        let row = [Value::Null, Value::text("a"), Value::Integer(1)];
        let cmp = |i, j, op| run(vec![Op::LoadColumn(i), Op::LoadColumn(j), op, Op::Return], &row);
        assert_eq!(cmp(0, 2, Op::Eq).unwrap(), Value::Null);
        assert_eq!(cmp(1, 2, Op::Eq).unwrap(), Value::Boolean(false));
        assert!(cmp(1, 2, Op::Lt).is_err());
    }
}
