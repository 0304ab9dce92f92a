use sqlparser::ast::{ObjectName, Query, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::api::middleware::AppError;

/// SQL validation for model-generated queries.
///
/// Generated SQL is untrusted input: it must be a single read-only query and
/// may only read from the table the question was asked about.
pub struct SqlValidator;

/// Walks a statement and stops at the first relation outside the allowed set.
///
/// CTE names are scoped: a name defined by a query's WITH clause only covers
/// relations inside that query, including its subqueries.
struct TableScope {
    target: String,
    ctes: Vec<HashSet<String>>,
}

impl TableScope {
    fn new(table: &str) -> Self {
        Self {
            target: normalize_identifier(table),
            ctes: Vec::new(),
        }
    }

    fn is_visible_cte(&self, name: &str) -> bool {
        self.ctes.iter().any(|scope| scope.contains(name))
    }
}

impl Visitor for TableScope {
    type Break = String;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        let names = query
            .with
            .iter()
            .flat_map(|with| with.cte_tables.iter())
            .map(|cte| normalize_identifier(&cte.alias.name.value))
            .collect();
        self.ctes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.ctes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            TableFactor::Table { name, args: Some(_), .. } | TableFactor::Function { name, .. } => {
                ControlFlow::Break(format!("Table function '{}' is not allowed.", name))
            }
            TableFactor::TableFunction { expr, .. } => {
                ControlFlow::Break(format!("Table function '{}' is not allowed.", expr))
            }
            _ => ControlFlow::Continue(()),
        }
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts: Vec<String> = relation
            .0
            .iter()
            .map(|part| normalize_identifier(&part.to_string()))
            .collect();
        let Some((name, qualifiers)) = parts.split_last() else {
            return ControlFlow::Continue(());
        };

        let is_target = name == &self.target && qualifiers.iter().all(|q| q == "main");
        let is_cte = qualifiers.is_empty() && self.is_visible_cte(name);
        if is_target || is_cte {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(format!("Query reads from '{}'.", parts.join(".")))
        }
    }
}

fn normalize_identifier(ident: &str) -> String {
    ident.trim().trim_matches('"').to_lowercase()
}

impl SqlValidator {
    fn parse(sql: &str) -> Result<Vec<Statement>, AppError> {
        let dialect = DuckDbDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(sql)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        parser
            .parse_statements()
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))
    }

    /// Parse `sql` and require exactly one query statement
    fn parse_single_query(sql: &str) -> Result<Statement, AppError> {
        let mut ast = Self::parse(sql)?;

        if ast.is_empty() {
            return Err(AppError::InvalidSql("Empty SQL query".to_string()));
        }
        if ast.len() > 1 {
            return Err(AppError::InvalidSql(format!(
                "Expected a single statement, found {}.",
                ast.len()
            )));
        }

        let stmt = ast.remove(0);
        match stmt {
            Statement::Query(_) => Ok(stmt),
            other => {
                let keyword = other
                    .to_string()
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_uppercase();
                Err(AppError::InvalidSql(format!(
                    "{} statements are not allowed. Only SELECT queries are permitted.",
                    keyword
                )))
            }
        }
    }

    /// Reject relations other than `table` (optionally qualified by `main`) and CTEs in scope
    fn check_relations(stmt: &Statement, table: &str) -> Result<(), AppError> {
        match stmt.visit(&mut TableScope::new(table)) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(reason) => Err(AppError::InvalidSql(format!(
                "{} Only table '{}' may be queried.",
                reason, table
            ))),
        }
    }

    /// Validate a query that may only read from `table`
    pub fn validate_for_table(sql: &str, table: &str) -> Result<String, AppError> {
        let stmt = Self::parse_single_query(sql)?;
        Self::check_relations(&stmt, table)?;
        Ok(sql.to_string())
    }

    /// Check if query has LIMIT clause and append if missing
    /// Uses AST parsing to properly detect LIMIT clauses, avoiding false positives
    pub fn ensure_limit(sql: &str, default_limit: u64) -> Result<String, AppError> {
        let stmt = Self::parse_single_query(sql)?;
        Ok(Self::append_limit(sql, &stmt, default_limit).0)
    }

    fn append_limit(sql: &str, stmt: &Statement, default_limit: u64) -> (String, bool) {
        if Self::check_limit_in_statement(stmt) {
            (sql.to_string(), false)
        } else {
            // On its own line so a trailing `--` comment cannot swallow it
            let trimmed_sql = sql.trim().trim_end_matches(';').trim_end();
            (format!("{}\nLIMIT {}", trimmed_sql, default_limit), true)
        }
    }

    /// Check if a statement has a LIMIT clause using AST analysis
    fn check_limit_in_statement(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => query.limit_clause.is_some(),
            _ => false,
        }
    }

    /// Validate and prepare a generated query.
    ///
    /// With `table` set, only that table may be read. With `default_limit`
    /// set, a LIMIT is appended when the query has none. Returns the SQL to
    /// run and whether a LIMIT was appended.
    pub fn validate_and_prepare(
        sql: &str,
        table: Option<&str>,
        default_limit: Option<u64>,
    ) -> Result<(String, bool), AppError> {
        let stmt = Self::parse_single_query(sql)?;
        if let Some(table) = table {
            Self::check_relations(&stmt, table)?;
        }

        Ok(match default_limit {
            Some(limit) => Self::append_limit(sql, &stmt, limit),
            None => (sql.to_string(), false),
        })
    }
}
