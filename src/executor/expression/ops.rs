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

// Compiled Expression Operations
//
// The instruction set of the expression VM. Operands are resolved at
// compile time: columns become row indices, functions become shared
// handles and cached subexpressions become slot numbers.

use std::sync::Arc;

use crate::core::Value;
use crate::functions::ScalarFunction;

/// Jump targets and column indices are program-local
pub type Target = u16;

/// A single VM instruction
#[derive(Clone)]
pub enum Op {
    // =========================================================================
    // LOAD OPERATIONS
    // =========================================================================
    /// Push the value of an input column
    LoadColumn(u16),
    /// Push a constant
    LoadConst(Value),
    /// Push NULL
    LoadNull,

    // =========================================================================
    // ROW CACHE
    // =========================================================================
    /// Push a slot that is always filled at this point of the row
    LoadSlot(u16),
    /// If the slot is filled, push it and jump; otherwise fall through to the
    /// code that computes it
    LoadSlotOrJump(u16, Target),
    /// Copy the top of the stack into a slot
    StoreSlot(u16),

    // =========================================================================
    // ARITHMETIC
    // =========================================================================
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Concat,

    // =========================================================================
    // COMPARISON
    // =========================================================================
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,

    // =========================================================================
    // LOGICAL
    // =========================================================================
    /// Short-circuit AND: jump if the top is FALSE, keeping it
    And(Target),
    /// Short-circuit OR: jump if the top is TRUE, keeping it
    Or(Target),
    /// Combine two operands with three-valued AND
    AndFinalize,
    /// Combine two operands with three-valued OR
    OrFinalize,
    Not,

    // =========================================================================
    // CASE
    // =========================================================================
    /// Pop a condition; jump to the next branch unless it is TRUE
    CaseWhen(Target),
    /// Pop the WHEN value and the operand copy below it, push equality
    CaseCompare,
    Jump(Target),
    Dup,
    Pop,

    // =========================================================================
    // FUNCTIONS
    // =========================================================================
    CallScalar {
        func: Arc<dyn ScalarFunction>,
        arg_count: u8,
    },

    Return,
}

impl Op {
    /// Net stack effect along the fall-through path
    pub(crate) fn stack_effect(&self) -> i32 {
        match self {
            Op::LoadColumn(_)
            | Op::LoadConst(_)
            | Op::LoadNull
            | Op::LoadSlot(_)
            | Op::Dup => 1,

            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Concat
            | Op::Eq
            | Op::Ne
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::AndFinalize
            | Op::OrFinalize
            | Op::CaseCompare
            | Op::CaseWhen(_)
            | Op::Pop => -1,

            Op::CallScalar { arg_count, .. } => 1 - *arg_count as i32,

            Op::LoadSlotOrJump(..)
            | Op::StoreSlot(_)
            | Op::Neg
            | Op::IsNull
            | Op::IsNotNull
            | Op::Not
            | Op::And(_)
            | Op::Or(_)
            | Op::Jump(_)
            | Op::Return => 0,
        }
    }
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::LoadColumn(idx) => write!(f, "LoadColumn({})", idx),
            Op::LoadConst(v) => write!(f, "LoadConst({:?})", v),
            Op::LoadNull => write!(f, "LoadNull"),
            Op::LoadSlot(s) => write!(f, "LoadSlot({})", s),
            Op::LoadSlotOrJump(s, t) => write!(f, "LoadSlotOrJump({}, {})", s, t),
            Op::StoreSlot(s) => write!(f, "StoreSlot({})", s),
            Op::Add => write!(f, "Add"),
            Op::Sub => write!(f, "Sub"),
            Op::Mul => write!(f, "Mul"),
            Op::Div => write!(f, "Div"),
            Op::Mod => write!(f, "Mod"),
            Op::Neg => write!(f, "Neg"),
            Op::Concat => write!(f, "Concat"),
            Op::Eq => write!(f, "Eq"),
            Op::Ne => write!(f, "Ne"),
            Op::Lt => write!(f, "Lt"),
            Op::Le => write!(f, "Le"),
            Op::Gt => write!(f, "Gt"),
            Op::Ge => write!(f, "Ge"),
            Op::IsNull => write!(f, "IsNull"),
            Op::IsNotNull => write!(f, "IsNotNull"),
            Op::And(t) => write!(f, "And({})", t),
            Op::Or(t) => write!(f, "Or({})", t),
            Op::AndFinalize => write!(f, "AndFinalize"),
            Op::OrFinalize => write!(f, "OrFinalize"),
            Op::Not => write!(f, "Not"),
            Op::CaseWhen(t) => write!(f, "CaseWhen({})", t),
            Op::CaseCompare => write!(f, "CaseCompare"),
            Op::Jump(t) => write!(f, "Jump({})", t),
            Op::Dup => write!(f, "Dup"),
            Op::Pop => write!(f, "Pop"),
            Op::CallScalar { func, arg_count } => {
                write!(f, "CallScalar({}, {})", func.name(), arg_count)
            }
            Op::Return => write!(f, "Return"),
        }
    }
}
