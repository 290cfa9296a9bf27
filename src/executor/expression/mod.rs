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

// Compiled Expression VM
//
// Bound expressions are compiled once per plan into linear instruction
// sequences and executed by a stack VM, with no recursion per row.
//
//   ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//   │    Expr     │ ──► │ ExprCompiler │ ──► │   Program   │
//   │   (bound)   │     │  (+ CSE)     │     │  (bytecode) │
//   └─────────────┘     └──────────────┘     └─────────────┘
//                                                   │
//                                                   ▼
//   ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//   │   Result    │ ◄── │    ExprVM    │ ◄── │ Row + Cache │
//   │   (Value)   │     │              │     │             │
//   └─────────────┘     └──────────────┘     └─────────────┘

mod compiler;
mod ops;
mod program;
mod vm;

pub use compiler::{CompileContext, ExprCompiler};
pub use ops::{Op, Target};
pub use program::{Program, ProgramBuilder};
pub use vm::ExprVM;
