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

//! Bound query blocks, CTE definitions and the plan handed to the optimizer

use std::fmt;

use super::expr::Expr;

/// One projected expression with an optional output name
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    /// Output column name: the alias, the bare column name, or the
    /// expression text
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.expr) {
            (Some(alias), _) => alias.clone(),
            (None, Expr::Column(name)) => name.clone(),
            (None, expr) => expr.to_string(),
        }
    }
}

/// A single SELECT block over one input relation
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Source table or CTE name
    pub from: String,
    pub filter: Option<Expr>,
    pub projections: Vec<SelectItem>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

impl SelectQuery {
    /// Start a block reading from `table`
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            from: table.into(),
            filter: None,
            projections: Vec::new(),
            group_by: Vec::new(),
            having: None,
        }
    }

    /// Add a projection
    pub fn select(mut self, expr: Expr) -> Self {
        self.projections.push(SelectItem { expr, alias: None });
        self
    }

    /// Add an aliased projection
    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.projections.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Set the WHERE clause; a second call ANDs the predicates
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Append a GROUP BY key
    pub fn group_by(mut self, key: Expr) -> Self {
        self.group_by.push(key);
        self
    }

    /// Set the HAVING clause
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(predicate);
        self
    }

    /// True if the block aggregates (GROUP BY or any aggregate call)
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self.projections.iter().any(|p| p.expr.contains_aggregate())
    }

    /// Output column names in projection order
    pub fn output_columns(&self) -> Vec<String> {
        self.projections.iter().map(SelectItem::output_name).collect()
    }
}

/// UNION ALL of one or more SELECT blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub branches: Vec<SelectQuery>,
}

impl Query {
    /// Lower-cased names of every relation the query reads, deduplicated,
    /// in first-seen order
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for branch in &self.branches {
            let name = branch.from.to_lowercase();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Append another branch (UNION ALL)
    pub fn union_all(mut self, branch: SelectQuery) -> Self {
        self.branches.push(branch);
        self
    }
}

impl From<SelectQuery> for Query {
    fn from(select: SelectQuery) -> Self {
        Query {
            branches: vec![select],
        }
    }
}

/// A named subquery
#[derive(Debug, Clone, PartialEq)]
pub struct CteDefinition {
    pub name: String,
    pub query: Query,
    /// Lower-cased names of the CTEs this subquery reads
    pub references: Vec<String>,
    /// Set by dead-CTE elimination; unreachable CTEs are never executed
    pub reachable: bool,
}

impl CteDefinition {
    /// Create a definition; references are resolved by [`BoundPlan::new`]
    pub fn new(name: impl Into<String>, query: impl Into<Query>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            references: Vec::new(),
            reachable: true,
        }
    }

    /// Lower-cased name used for every lookup
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// CTE definitions plus the outer query
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPlan {
    pub ctes: Vec<CteDefinition>,
    pub query: Query,
}

impl BoundPlan {
    /// Bind a plan, resolving each CTE's references against the declared
    /// CTE names
    ///
    /// A CTE name shadows any source table of the same name.
    pub fn new(ctes: Vec<CteDefinition>, query: impl Into<Query>) -> Self {
        let names: Vec<String> = ctes.iter().map(CteDefinition::key).collect();
        let ctes = ctes
            .into_iter()
            .map(|mut cte| {
                cte.references = cte
                    .query
                    .referenced_tables()
                    .into_iter()
                    .filter(|t| names.contains(t))
                    .collect();
                cte
            })
            .collect();
        Self {
            ctes,
            query: query.into(),
        }
    }

    /// A plan without CTEs
    pub fn simple(query: impl Into<Query>) -> Self {
        Self::new(Vec::new(), query)
    }

    /// CTEs read directly by the outer query
    pub fn root_references(&self) -> Vec<String> {
        self.query
            .referenced_tables()
            .into_iter()
            .filter(|t| self.ctes.iter().any(|c| &c.key() == t))
            .collect()
    }

    /// Find a CTE by (case-insensitive) name
    pub fn cte(&self, name: &str) -> Option<&CteDefinition> {
        let key = name.to_lowercase();
        self.ctes.iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for (i, item) in self.projections.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item.expr)?;
            if let Some(alias) = &item.alias {
                write!(f, " AS {}", alias)?;
            }
        }
        write!(f, " FROM {}", self.from)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {}", filter)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            for (i, key) in self.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", key)?;
            }
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {}", having)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::{col, lit, sum};

    #[test]
    fn test_bind_resolves_cte_references() {
        let a = CteDefinition::new("A", SelectQuery::from("orders").select(col("id")));
        let b = CteDefinition::new(
            "b",
            Query::from(SelectQuery::from("a").select(col("id")))
                .union_all(SelectQuery::from("Orders").select(col("id"))),
        );
        let plan = BoundPlan::new(vec![a, b], SelectQuery::from("B").select(col("id")));

        assert!(plan.cte("a").is_some_and(|c| c.references.is_empty()));
        assert_eq!(plan.cte("B").map(|c| c.references.clone()), Some(vec!["a".to_string()]));
        assert_eq!(plan.root_references(), vec!["b".to_string()]);
    }

    #[test]
    fn test_select_builder() {
        let q = SelectQuery::from("t")
            .select(col("k"))
            .select_as(sum(col("v")), "total")
            .filter(col("v").gt(lit(0)))
            .filter(col("k").is_not_null())
            .group_by(col("k"));

        assert!(q.is_grouped());
        assert_eq!(q.output_columns(), vec!["k", "total"]);
        assert_eq!(
            q.to_string(),
            "SELECT k, SUM(v) AS total FROM t WHERE ((v > 0) AND k IS NOT NULL) GROUP BY k"
        );
    }

    #[test]
    fn test_output_name_falls_back_to_expression_text() {
        let q = SelectQuery::from("t").select(col("a").add(lit(1)));
        assert_eq!(q.output_columns(), vec!["(a + 1)"]);
        assert!(!q.is_grouped());
    }
}
