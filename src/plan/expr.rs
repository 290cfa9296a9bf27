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

//! Bound expression trees
//!
//! Expressions arrive already bound: function calls carry their determinism
//! flag and aggregate calls carry their DISTINCT flag and group level.

use std::fmt;

use crate::core::Value;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
}

impl BinaryOp {
    /// SQL spelling of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "||",
        }
    }

    /// True for operators whose right operand may be skipped
    pub fn short_circuits(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Aggregate function kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    /// Upper-case SQL name
    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
        }
    }
}

/// A scalar function call
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
    /// Set by the binder; a non-deterministic call is never cached
    pub deterministic: bool,
}

/// CASE [operand] WHEN .. THEN .. [ELSE ..] END
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub operand: Option<Box<Expr>>,
    pub when_clauses: Vec<(Expr, Expr)>,
    pub else_value: Option<Box<Expr>>,
}

/// An aggregate call
///
/// `argument` is `None` only for `COUNT(*)`. `level` selects which group of
/// the row's group chain owns the state: 0 is the finest group (all GROUP
/// BY columns), 1 its parent (last column dropped), and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateKind,
    pub argument: Option<Box<Expr>>,
    pub distinct: bool,
    pub level: usize,
}

/// A bound expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call(FunctionCall),
    Case(CaseExpr),
    Aggregate(AggregateCall),
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    /// True if this expression or any subexpression is an aggregate call
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expr::Aggregate(_)) {
                found = true;
            }
        });
        found
    }

    /// Pre-order traversal over this expression and its children
    ///
    /// Aggregate arguments are visited too.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) => Vec::new(),
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Unary { expr, .. } => vec![expr.as_ref()],
            Expr::Call(call) => call.args.iter().collect(),
            Expr::Case(case) => {
                let mut out: Vec<&Expr> = Vec::new();
                if let Some(op) = &case.operand {
                    out.push(op.as_ref());
                }
                for (when, then) in &case.when_clauses {
                    out.push(when);
                    out.push(then);
                }
                if let Some(e) = &case.else_value {
                    out.push(e.as_ref());
                }
                out
            }
            Expr::Aggregate(agg) => agg.argument.iter().map(|a| a.as_ref()).collect(),
        }
    }

    // =========================================================================
    // Builder helpers
    // =========================================================================

    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn add(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Add, right)
    }

    pub fn sub(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Sub, right)
    }

    pub fn mul(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Mul, right)
    }

    pub fn div(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Div, right)
    }

    pub fn modulo(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Mod, right)
    }

    pub fn eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Ne, right)
    }

    pub fn lt(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn le(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Le, right)
    }

    pub fn gt(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn ge(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Ge, right)
    }

    pub fn and(self, right: Expr) -> Expr {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Or, right)
    }

    pub fn concat(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Concat, right)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(self),
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::IsNotNull,
            expr: Box::new(self),
        }
    }

    /// Re-target an aggregate call at another group level
    ///
    /// No-op for anything that is not an aggregate.
    pub fn at_level(self, level: usize) -> Expr {
        match self {
            Expr::Aggregate(mut agg) => {
                agg.level = level;
                Expr::Aggregate(agg)
            }
            other => other,
        }
    }
}

/// Column reference
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Literal value
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Deterministic scalar call
pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call(FunctionCall {
        name: name.into(),
        args,
        deterministic: true,
    })
}

/// Non-deterministic scalar call (never cached)
pub fn volatile_call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call(FunctionCall {
        name: name.into(),
        args,
        deterministic: false,
    })
}

/// Searched CASE
pub fn case_when(when_clauses: Vec<(Expr, Expr)>, else_value: Option<Expr>) -> Expr {
    Expr::Case(CaseExpr {
        operand: None,
        when_clauses,
        else_value: else_value.map(Box::new),
    })
}

/// Simple CASE with an operand
pub fn case_of(operand: Expr, when_clauses: Vec<(Expr, Expr)>, else_value: Option<Expr>) -> Expr {
    Expr::Case(CaseExpr {
        operand: Some(Box::new(operand)),
        when_clauses,
        else_value: else_value.map(Box::new),
    })
}

fn aggregate(function: AggregateKind, argument: Option<Expr>, distinct: bool) -> Expr {
    Expr::Aggregate(AggregateCall {
        function,
        argument: argument.map(Box::new),
        distinct,
        level: 0,
    })
}

pub fn count_star() -> Expr {
    aggregate(AggregateKind::Count, None, false)
}

pub fn count(arg: Expr) -> Expr {
    aggregate(AggregateKind::Count, Some(arg), false)
}

pub fn count_distinct(arg: Expr) -> Expr {
    aggregate(AggregateKind::Count, Some(arg), true)
}

pub fn sum(arg: Expr) -> Expr {
    aggregate(AggregateKind::Sum, Some(arg), false)
}

pub fn sum_distinct(arg: Expr) -> Expr {
    aggregate(AggregateKind::Sum, Some(arg), true)
}

pub fn avg(arg: Expr) -> Expr {
    aggregate(AggregateKind::Avg, Some(arg), false)
}

pub fn avg_distinct(arg: Expr) -> Expr {
    aggregate(AggregateKind::Avg, Some(arg), true)
}

pub fn min(arg: Expr) -> Expr {
    aggregate(AggregateKind::Min, Some(arg), false)
}

pub fn min_distinct(arg: Expr) -> Expr {
    aggregate(AggregateKind::Min, Some(arg), true)
}

pub fn max(arg: Expr) -> Expr {
    aggregate(AggregateKind::Max, Some(arg), false)
}

pub fn max_distinct(arg: Expr) -> Expr {
    aggregate(AggregateKind::Max, Some(arg), true)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(Value::Text(s)) => write!(f, "'{}'", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {}", expr),
                UnaryOp::Neg => write!(f, "-{}", expr),
                UnaryOp::IsNull => write!(f, "{} IS NULL", expr),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", expr),
            },
            Expr::Call(call) => {
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Case(case) => {
                write!(f, "CASE")?;
                if let Some(op) = &case.operand {
                    write!(f, " {}", op)?;
                }
                for (when, then) in &case.when_clauses {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(e) = &case.else_value {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expr::Aggregate(agg) => {
                write!(f, "{}(", agg.function.name())?;
                if agg.distinct {
                    write!(f, "DISTINCT ")?;
                }
                match &agg.argument {
                    Some(arg) => write!(f, "{}", arg)?,
                    None => write!(f, "*")?,
                }
                write!(f, ")")?;
                if agg.level > 0 {
                    write!(f, "@{}", agg.level)?;
                }
                Ok(())
            }
        }
    }
}
