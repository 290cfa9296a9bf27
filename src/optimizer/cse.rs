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

//! Common subexpression analysis
//!
//! Each query block has up to two row scopes. The input scope covers
//! everything evaluated against a source row: WHERE, then the SELECT list
//! for a plain block, or the GROUP BY keys and aggregate arguments for a
//! grouped one. The output scope covers HAVING and the SELECT list of a
//! grouped block, evaluated once per group; there aggregate calls and GROUP
//! BY keys are inputs, not computations.
//!
//! Within a scope every subtree is fingerprinted. A subtree gets a cache
//! slot when it is non-trivial, deterministic and occurs at least twice.
//! The expression compiler turns the first reachable occurrence into a
//! compute-and-store and the others into slot reads.

use rustc_hash::FxHashMap;

use crate::plan::{AggregateCall, Expr, FunctionCall, SelectQuery};

use super::fingerprint::{fingerprint, ExpressionFingerprint, FingerprintTable};

/// A cached subexpression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CseCandidate {
    pub fingerprint: ExpressionFingerprint,
    /// Display form of the first occurrence
    pub expr_text: String,
    pub occurrences: usize,
    pub slot: usize,
}

/// Slot assignment for one row scope
#[derive(Debug, Clone, Default)]
pub struct CseScope {
    slots: FxHashMap<ExpressionFingerprint, usize>,
    candidates: Vec<CseCandidate>,
}

impl CseScope {
    /// Slot assigned to a fingerprint, if it is cached
    #[inline]
    pub fn slot_of(&self, fp: &ExpressionFingerprint) -> Option<usize> {
        self.slots.get(fp).copied()
    }

    /// Number of slots a row cache for this scope needs
    pub fn slot_count(&self) -> usize {
        self.candidates.len()
    }

    /// True when nothing in the scope is cached
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Cached subexpressions in slot order
    pub fn candidates(&self) -> &[CseCandidate] {
        &self.candidates
    }
}

/// CSE slots for a query block
#[derive(Debug, Clone, Default)]
pub struct CseAnalysis {
    pub input: CseScope,
    pub output: CseScope,
}

impl CseAnalysis {
    /// Analysis that caches nothing (CSE disabled)
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Aggregate calls of a grouped block, deduplicated by fingerprint, in the
/// order the SELECT list and then HAVING mention them
///
/// Both the analyzer and the executor use this order, so argument
/// evaluation order per row is the same in both.
pub fn collect_aggregates(select: &SelectQuery) -> Vec<(ExpressionFingerprint, AggregateCall)> {
    let mut out: Vec<(ExpressionFingerprint, AggregateCall)> = Vec::new();
    let mut push = |e: &Expr| {
        e.visit(&mut |node| {
            if let Expr::Aggregate(agg) = node {
                let fp = fingerprint(node);
                if !out.iter().any(|(seen, _)| seen == &fp) {
                    out.push((fp, agg.clone()));
                }
            }
        })
    };
    for item in &select.projections {
        push(&item.expr);
    }
    if let Some(having) = &select.having {
        push(having);
    }
    out
}

struct Counter<'a, D: Fn(&FunctionCall) -> bool> {
    deterministic: &'a D,
    /// Fingerprints treated as opaque inputs (output scope only)
    leaves: Vec<ExpressionFingerprint>,
    output_scope: bool,
    counts: FxHashMap<ExpressionFingerprint, usize>,
    /// First occurrence order, for stable slot numbering
    order: Vec<(ExpressionFingerprint, String)>,
}

impl<'a, D: Fn(&FunctionCall) -> bool> Counter<'a, D> {
    fn new(deterministic: &'a D, output_scope: bool, leaves: Vec<ExpressionFingerprint>) -> Self {
        Self {
            deterministic,
            leaves,
            output_scope,
            counts: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Count every eligible subtree of one expression
    fn count(&mut self, expr: &Expr) {
        let table = FingerprintTable::build(expr);
        self.count_node(expr, &table);
    }

    /// Count `expr` and its subtrees; returns whether `expr` is deterministic
    fn count_node(&mut self, expr: &Expr, table: &FingerprintTable) -> bool {
        let Some(fp) = table.get(expr) else {
            return false;
        };
        if self.output_scope
            && (matches!(expr, Expr::Aggregate(_)) || self.leaves.contains(fp))
        {
            return true;
        }

        match expr {
            Expr::Column(_) | Expr::Literal(_) => true,
            _ => {
                let mut deterministic = match expr {
                    Expr::Call(call) => call.deterministic && (self.deterministic)(call),
                    _ => true,
                };
                for child in expr.children() {
                    deterministic &= self.count_node(child, table);
                }
                if deterministic && !matches!(expr, Expr::Aggregate(_)) {
                    let n = self.counts.entry(fp.clone()).or_insert(0);
                    if *n == 0 {
                        self.order.push((fp.clone(), expr.to_string()));
                    }
                    *n += 1;
                }
                deterministic
            }
        }
    }

    fn finish(self) -> CseScope {
        let mut scope = CseScope::default();
        for (fp, text) in self.order {
            let occurrences = self.counts.get(&fp).copied().unwrap_or(0);
            if occurrences >= 2 {
                let slot = scope.candidates.len();
                scope.slots.insert(fp.clone(), slot);
                scope.candidates.push(CseCandidate {
                    fingerprint: fp,
                    expr_text: text,
                    occurrences,
                    slot,
                });
            }
        }
        scope
    }
}

/// Assign cache slots for one query block
///
/// `deterministic` is consulted for every function call in addition to the
/// call's own flag, so a function the registry knows to be volatile is
/// never cached even if the binder marked the call deterministic.
pub fn analyze_block<D>(select: &SelectQuery, deterministic: &D) -> CseAnalysis
where
    D: Fn(&FunctionCall) -> bool,
{
    let mut input = Counter::new(deterministic, false, Vec::new());
    if let Some(filter) = &select.filter {
        input.count(filter);
    }

    if !select.is_grouped() {
        for item in &select.projections {
            input.count(&item.expr);
        }
        let analysis = CseAnalysis {
            input: input.finish(),
            output: CseScope::default(),
        };
        log_analysis(select, &analysis);
        return analysis;
    }

    for key in &select.group_by {
        input.count(key);
    }
    for (_, agg) in collect_aggregates(select) {
        if let Some(arg) = &agg.argument {
            input.count(arg);
        }
    }

    let keys: Vec<ExpressionFingerprint> = select.group_by.iter().map(fingerprint).collect();
    let mut output = Counter::new(deterministic, true, keys);
    if let Some(having) = &select.having {
        output.count(having);
    }
    for item in &select.projections {
        output.count(&item.expr);
    }

    let analysis = CseAnalysis {
        input: input.finish(),
        output: output.finish(),
    };
    log_analysis(select, &analysis);
    analysis
}

fn log_analysis(select: &SelectQuery, analysis: &CseAnalysis) {
    if analysis.input.is_empty() && analysis.output.is_empty() {
        return;
    }
    tracing::debug!(
        from = %select.from,
        input_slots = analysis.input.slot_count(),
        output_slots = analysis.output.slot_count(),
        "assigned CSE slots"
    );
    for c in analysis.input.candidates().iter().chain(analysis.output.candidates()) {
        tracing::trace!(slot = c.slot, occurrences = c.occurrences, expr = %c.expr_text, "CSE candidate");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{call, case_when, col, count_star, lit, sum, volatile_call};

    fn always(_: &FunctionCall) -> bool {
        true
    }

    fn f(v: &str) -> Expr {
        call("f", vec![col(v)])
    }

    #[test]
    fn test_repeated_call_across_where_and_select() {
        // SELECT f(v), f(v) + 10 FROM t WHERE f(v) > 100
        let q = SelectQuery::from("t")
            .select(f("v"))
            .select(f("v").add(lit(10)))
            .filter(f("v").gt(lit(100)));
        let a = analyze_block(&q, &always);

        assert_eq!(a.input.slot_count(), 1);
        let c = &a.input.candidates()[0];
        assert_eq!(c.occurrences, 3);
        assert_eq!(c.expr_text, "f(v)");
        assert_eq!(a.input.slot_of(&fingerprint(&f("v"))), Some(0));
        assert!(a.output.is_empty());
    }

    #[test]
    fn test_single_occurrence_and_trivial_nodes_are_not_cached() {
        let q = SelectQuery::from("t")
            .select(col("a"))
            .select(col("a"))
            .select(lit(1))
            .select(lit(1))
            .select(f("v"));
        let a = analyze_block(&q, &always);
        assert!(a.input.is_empty());
    }

    #[test]
    fn test_non_deterministic_calls_are_never_cached() {
        let r = || volatile_call("random", vec![]);
        let q = SelectQuery::from("t")
            .select(r())
            .select(r().add(col("x")))
            .select(r().add(col("x")));
        assert!(analyze_block(&q, &always).input.is_empty());

        // The registry can veto a call the binder marked deterministic
        let q = SelectQuery::from("t").select(f("v")).select(f("v"));
        let a = analyze_block(&q, &|c: &FunctionCall| c.name != "f");
        assert!(a.input.is_empty());
    }

    #[test]
    fn test_case_branches_participate() {
        let q = SelectQuery::from("t")
            .select(case_when(vec![(f("v").gt(lit(1)), f("v"))], Some(lit(0))))
            .select(f("v"));
        let a = analyze_block(&q, &always);
        assert_eq!(a.input.candidates()[0].occurrences, 3);
    }

    #[test]
    fn test_grouped_block_scopes() {
        // SELECT k, SUM(g(v)) * 2, SUM(g(v)) * 2 + 1 FROM t
        // WHERE g(v) > 0 GROUP BY k HAVING SUM(g(v)) > 10
        let g = || call("g", vec![col("v")]);
        let q = SelectQuery::from("t")
            .select(col("k"))
            .select(sum(g()).mul(lit(2)))
            .select(sum(g()).mul(lit(2)).add(lit(1)))
            .select(count_star())
            .filter(g().gt(lit(0)))
            .group_by(col("k"))
            .having(sum(g()).gt(lit(10)));
        let a = analyze_block(&q, &always);

        // g(v) in WHERE and as the (single, deduplicated) SUM argument
        assert_eq!(a.input.slot_count(), 1);
        assert_eq!(a.input.candidates()[0].occurrences, 2);

        // SUM(g(v)) * 2 twice; SUM itself is an input, not a candidate
        assert_eq!(a.output.slot_count(), 1);
        assert_eq!(a.output.candidates()[0].expr_text, "(SUM(g(v)) * 2)");
    }

    #[test]
    fn test_collect_aggregates_dedups_in_order() {
        let q = SelectQuery::from("t")
            .select(sum(col("v")))
            .select(count_star())
            .select(sum(col("v")).add(lit(1)))
            .group_by(col("k"))
            .having(count_star().gt(lit(1)));
        let aggs = collect_aggregates(&q);
        let names: Vec<String> = aggs.iter().map(|(fp, _)| fp.to_string()).collect();
        assert_eq!(names, vec!["agg:sum@0(col:v)", "agg:count@0:star()"]);
    }
}
