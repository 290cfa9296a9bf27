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

// Compiled Expression Program
//
// A Program is the compiled form of one bound expression: a linear
// operation sequence plus the stack depth it needs.

use super::ops::{Op, Target};
use crate::core::Value;

/// Compiled expression program
#[derive(Clone)]
pub struct Program {
    /// The operation sequence
    ops: Vec<Op>,

    /// Maximum stack depth needed (for pre-allocation)
    max_stack_depth: usize,
}

impl Program {
    /// Create a new program from operations
    pub fn new(ops: Vec<Op>) -> Self {
        let max_stack_depth = Self::compute_stack_depth(&ops);
        Self {
            ops,
            max_stack_depth,
        }
    }

    /// Create a program that returns NULL
    pub fn null() -> Self {
        Self::new(vec![Op::LoadNull, Op::Return])
    }

    /// Create a program that returns a constant value
    pub fn constant(value: Value) -> Self {
        Self::new(vec![Op::LoadConst(value), Op::Return])
    }

    /// Get the operations
    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Get the maximum stack depth needed
    #[inline]
    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    /// Number of operations
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Cache slots this program reads or writes
    pub fn slots(&self) -> Vec<u16> {
        let mut out: Vec<u16> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::LoadSlot(s) | Op::LoadSlotOrJump(s, _) | Op::StoreSlot(s) => Some(*s),
                _ => None,
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Upper bound of the stack depth
    ///
    /// Walks the ops linearly, so values pushed on branches that are never
    /// taken together are counted together. Over-estimating only costs a
    /// larger reservation.
    fn compute_stack_depth(ops: &[Op]) -> usize {
        let mut depth: i32 = 0;
        let mut max_depth: i32 = 0;
        for op in ops {
            depth = (depth + op.stack_effect()).max(0);
            max_depth = max_depth.max(depth);
        }
        max_depth as usize
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("ops", &self.ops)
            .field("max_stack_depth", &self.max_stack_depth)
            .finish()
    }
}

/// Builder for constructing programs
pub struct ProgramBuilder {
    ops: Vec<Op>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::with_capacity(32),
        }
    }

    /// Emit an operation
    #[inline]
    pub fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Get current position (for jump targets)
    #[inline]
    pub fn position(&self) -> Target {
        self.ops.len() as Target
    }

    /// Number of emitted operations
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Patch a jump target at a specific position
    pub fn patch_jump(&mut self, pos: Target, target: Target) {
        if let Some(op) = self.ops.get_mut(pos as usize) {
            match op {
                Op::And(t)
                | Op::Or(t)
                | Op::Jump(t)
                | Op::CaseWhen(t)
                | Op::LoadSlotOrJump(_, t) => *t = target,
                _ => {}
            }
        }
    }

    /// Build the final program
    pub fn build(self) -> Program {
        Program::new(self.ops)
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
