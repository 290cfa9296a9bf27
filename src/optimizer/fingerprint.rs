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

//! Structural expression fingerprints
//!
//! Two subtrees with the same fingerprint compute the same value for the
//! same input row (given determinism). Names are case-folded and quoted,
//! and literals carry their type, so `1` and `1.0` stay distinct.

use std::fmt;
use std::fmt::Write;

use rustc_hash::FxHashMap;

use crate::core::Value;
use crate::plan::{BinaryOp, Expr, UnaryOp};

/// Canonical structural identity of an expression subtree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpressionFingerprint(String);

impl ExpressionFingerprint {
    /// The canonical text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpressionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of a whole expression
pub fn fingerprint(expr: &Expr) -> ExpressionFingerprint {
    let mut out = String::with_capacity(32);
    write_expr(expr, &mut out);
    ExpressionFingerprint(out)
}

/// Build a node fingerprint from already-computed child fingerprints
///
/// Produces exactly what [`fingerprint`] would for the same node, without
/// walking the children again.
pub(crate) fn compose(expr: &Expr, children: &[ExpressionFingerprint]) -> ExpressionFingerprint {
    let mut out = String::with_capacity(32);
    write_head(expr, &mut out);
    out.push('(');
    match expr {
        Expr::Case(case) => {
            // operand?, (when, then)*, else? flattened in children order
            let mut it = children.iter();
            if case.operand.is_some() {
                push_child(&mut out, it.next());
            }
            out.push('|');
            for _ in &case.when_clauses {
                push_child(&mut out, it.next());
                out.push(':');
                push_child(&mut out, it.next());
                out.push('|');
            }
            if case.else_value.is_some() {
                out.push_str("else:");
                push_child(&mut out, it.next());
            }
        }
        _ => {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(child.as_str());
            }
        }
    }
    out.push(')');
    ExpressionFingerprint(out)
}

fn push_child(out: &mut String, child: Option<&ExpressionFingerprint>) {
    if let Some(c) = child {
        out.push_str(c.as_str());
    }
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Column(_) | Expr::Literal(_) => write_head(expr, out),
        _ => {
            let children: Vec<ExpressionFingerprint> =
                expr.children().into_iter().map(fingerprint).collect();
            out.push_str(compose(expr, &children).as_str());
        }
    }
}

/// Fingerprints of every subtree of one expression, keyed by node address
///
/// Built bottom-up in one pass, so callers that need the fingerprint of
/// each node while walking a tree do not re-walk the subtrees. Addresses
/// are only compared, never dereferenced; a table is meaningful only while
/// the expression it was built from is alive and unmoved.
#[derive(Default)]
pub(crate) struct FingerprintTable {
    nodes: FxHashMap<*const Expr, ExpressionFingerprint>,
}

impl FingerprintTable {
    pub(crate) fn build(expr: &Expr) -> Self {
        let mut nodes = FxHashMap::default();
        fill(expr, &mut nodes);
        Self { nodes }
    }

    /// Fingerprint of a node of the tree the table was built from
    #[inline]
    pub(crate) fn get(&self, node: &Expr) -> Option<&ExpressionFingerprint> {
        self.nodes.get(&(node as *const Expr))
    }
}

fn fill(expr: &Expr, nodes: &mut FxHashMap<*const Expr, ExpressionFingerprint>) -> ExpressionFingerprint {
    let fp = match expr {
        Expr::Column(_) | Expr::Literal(_) => {
            let mut out = String::with_capacity(16);
            write_head(expr, &mut out);
            ExpressionFingerprint(out)
        }
        _ => {
            let children: Vec<ExpressionFingerprint> = expr
                .children()
                .into_iter()
                .map(|child| fill(child, nodes))
                .collect();
            compose(expr, &children)
        }
    };
    nodes.insert(expr as *const Expr, fp.clone());
    fp
}

/// Node label without children
fn write_head(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Column(name) => {
            let _ = write!(out, "col:{:?}", name.to_lowercase());
        }
        Expr::Literal(value) => write_literal(value, out),
        Expr::Binary { op, .. } => {
            out.push_str("bin:");
            out.push_str(binary_tag(*op));
        }
        Expr::Unary { op, .. } => {
            out.push_str("un:");
            out.push_str(match op {
                UnaryOp::Not => "not",
                UnaryOp::Neg => "neg",
                UnaryOp::IsNull => "isnull",
                UnaryOp::IsNotNull => "notnull",
            });
        }
        Expr::Call(call) => {
            let _ = write!(out, "fn:{:?}", call.name.to_lowercase());
        }
        Expr::Case(case) => {
            out.push_str(if case.operand.is_some() {
                "case:simple"
            } else {
                "case:searched"
            });
        }
        Expr::Aggregate(agg) => {
            let _ = write!(
                out,
                "agg:{}{}@{}",
                agg.function.name().to_lowercase(),
                if agg.distinct { ":distinct" } else { "" },
                agg.level
            );
            if agg.argument.is_none() {
                out.push_str(":star");
            }
        }
    }
}

fn write_literal(value: &Value, out: &mut String) {
    let _ = match value {
        Value::Null => write!(out, "lit:null"),
        Value::Integer(v) => write!(out, "lit:int:{}", v),
        Value::Float(v) => write!(out, "lit:float:{:?}", v),
        Value::Decimal(d) => write!(out, "lit:dec:{}", d.normalize()),
        Value::Text(s) => write!(out, "lit:text:{:?}", s),
        Value::Boolean(b) => write!(out, "lit:bool:{}", b),
    };
}

fn binary_tag(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::Lt => "lt",
        BinaryOp::Le => "le",
        BinaryOp::Gt => "gt",
        BinaryOp::Ge => "ge",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Concat => "concat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{call, case_of, case_when, col, count_star, lit, sum};

    #[test]
    fn test_structural_identity() {
        let a = call("F", vec![col("V")]).add(lit(10));
        let b = call("f", vec![col("v")]).add(lit(10));
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).as_str(), r#"bin:add(fn:"f"(col:"v"),lit:int:10)"#);
    }

    #[test]
    fn test_literal_types_are_distinct() {
        assert_ne!(fingerprint(&lit(1)), fingerprint(&lit(1.0)));
        assert_ne!(fingerprint(&lit("1")), fingerprint(&lit(1)));
    }

    #[test]
    fn test_names_cannot_forge_structure() {
        // One column whose name looks like two arguments
        let forged = call("coalesce", vec![col("a,col:b")]);
        let real = call("coalesce", vec![col("a"), col("b")]);
        assert_ne!(fingerprint(&forged), fingerprint(&real));

        let odd_fn = call("f(col:a),g", vec![col("b")]);
        let nested = call("f", vec![col("a")]);
        assert_ne!(fingerprint(&odd_fn), fingerprint(&nested));
    }

    #[test]
    fn test_table_matches_fingerprint() {
        let e = call("f", vec![col("v").add(lit(1))]).mul(case_when(
            vec![(col("k").gt(lit(0)), col("v"))],
            Some(lit(0)),
        ));
        let table = FingerprintTable::build(&e);
        let mut checked = 0;
        e.visit(&mut |node| {
            assert_eq!(table.get(node), Some(&fingerprint(node)));
            checked += 1;
        });
        assert!(checked > 5);
        assert_eq!(table.get(&col("v")), None);
    }

    #[test]
    fn test_operand_order_matters() {
        let ab = col("a").sub(col("b"));
        let ba = col("b").sub(col("a"));
        assert_ne!(fingerprint(&ab), fingerprint(&ba));
    }

    #[test]
    fn test_case_shapes_do_not_alias() {
        // (WHEN x THEN y) vs simple CASE x WHEN y
        let searched = case_when(vec![(col("x"), col("y"))], None);
        let simple = case_of(col("x"), vec![(col("y"), lit(1))], None);
        assert_ne!(fingerprint(&searched), fingerprint(&simple));

        let with_else = case_when(vec![(col("x"), col("y"))], Some(lit(0)));
        assert_ne!(fingerprint(&searched), fingerprint(&with_else));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(fingerprint(&count_star()).as_str(), "agg:count@0:star()");
        assert_ne!(
            fingerprint(&sum(col("v"))),
            fingerprint(&sum(col("v")).at_level(1))
        );
    }

    #[test]
    fn test_compose_matches_fingerprint() {
        let e = case_of(
            col("k"),
            vec![(lit(1), call("f", vec![col("v")]))],
            Some(lit("z")),
        );
        let children: Vec<ExpressionFingerprint> =
            e.children().into_iter().map(fingerprint).collect();
        assert_eq!(compose(&e, &children), fingerprint(&e));
    }
}
