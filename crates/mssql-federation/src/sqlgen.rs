//! T-SQL scan synthesis with pushdown classification.
//!
//! The generated SELECT is a server-side prefilter: the host engine
//! re-applies every filter to the returned rows, so the generator is free
//! to push only what it can render exactly ("safe by default"). ORDER BY
//! pushes only when SQL Server's NULL ordering provably matches the
//! request; TOP N only when the whole ORDER BY pushed.

use std::fmt::Write as _;

use mssql_values::render_literal;

use crate::cache::TableSnapshot;
use crate::expr::{FilterExpr, ScalarExpr, ScalarFunc, SortKey};
use crate::scan::ScanPlan;

/// Longest IN-list that still pushes; longer lists stay residual.
pub const MAX_PUSHED_IN_LIST: usize = 100;

/// NVARCHAR cast width cap for non-MAX columns.
const NVARCHAR_CAP: i32 = 4000;

/// Escape a T-SQL identifier: bracket quoting with `]` doubled.
#[must_use]
pub fn escape_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('[');
    for ch in name.chars() {
        if ch == ']' {
            out.push(']');
        }
        out.push(ch);
    }
    out.push(']');
    out
}

/// Result of rendering one scan.
#[derive(Debug, Clone)]
pub struct RenderedScan {
    /// The SELECT statement to send.
    pub sql: String,
    /// Projected column names in output order; empty for the count-only
    /// `SELECT 1` projection.
    pub projected_columns: Vec<String>,
    /// Indices of `plan.filters` that were (at least partially) pushed.
    /// The host re-applies all filters regardless.
    pub pushed_filters: Vec<usize>,
    /// Length of the ORDER BY prefix that was pushed.
    pub pushed_sort_keys: usize,
    /// Whether TOP N was emitted.
    pub top_applied: bool,
}

/// Scan SQL generator for one bound table.
#[derive(Debug, Clone, Copy)]
pub struct QueryGen<'a> {
    table: &'a TableSnapshot,
    /// Cast non-UTF-8 VARCHAR/CHAR projections to NVARCHAR.
    varchar_to_nvarchar: bool,
    /// ORDER BY pushdown gate.
    order_pushdown: bool,
}

impl<'a> QueryGen<'a> {
    /// Generator with the attachment's pushdown policy.
    #[must_use]
    pub fn new(table: &'a TableSnapshot, varchar_to_nvarchar: bool, order_pushdown: bool) -> Self {
        Self {
            table,
            varchar_to_nvarchar,
            order_pushdown,
        }
    }

    /// Render the SELECT for a scan plan.
    #[must_use]
    pub fn render(&self, plan: &ScanPlan) -> RenderedScan {
        let mut sql = String::from("SELECT ");

        let pushed_sort_keys = if self.order_pushdown {
            self.pushable_sort_prefix(&plan.order_by)
        } else {
            0
        };
        let order_fully_pushed = pushed_sort_keys == plan.order_by.len();

        let top_applied = match plan.top_n {
            Some(n) if order_fully_pushed => {
                let _ = write!(sql, "TOP {n} ");
                true
            }
            _ => false,
        };

        let projected_columns = self.projected_names(plan);
        sql.push_str(&self.render_projection(plan));
        let _ = write!(
            sql,
            " FROM {}.{}",
            escape_ident(&plan.table.schema),
            escape_ident(&plan.table.name)
        );

        let mut pushed_filters = Vec::new();
        let mut predicates = Vec::new();
        for (index, filter) in plan.filters.iter().enumerate() {
            if let Some(fragment) = self.render_filter(filter) {
                predicates.push(fragment);
                pushed_filters.push(index);
            }
        }
        if !predicates.is_empty() {
            let _ = write!(sql, " WHERE {}", predicates.join(" AND "));
        }

        if pushed_sort_keys > 0 {
            let keys: Vec<String> = plan.order_by[..pushed_sort_keys]
                .iter()
                .filter_map(|key| self.render_sort_key(key))
                .collect();
            let _ = write!(sql, " ORDER BY {}", keys.join(", "));
        }

        RenderedScan {
            sql,
            projected_columns,
            pushed_filters,
            pushed_sort_keys,
            top_applied,
        }
    }

    /// Output column names in projection order (projection ordinals, then
    /// any primary-key columns added for row identity).
    fn projected_names(&self, plan: &ScanPlan) -> Vec<String> {
        let mut names: Vec<String> = plan
            .projection
            .iter()
            .filter_map(|&ordinal| plan.table.columns.get(ordinal))
            .map(|c| c.name.clone())
            .collect();

        if plan.include_rowid {
            for pk in &plan.table.primary_key {
                if !names.iter().any(|n| n == pk) {
                    names.push(pk.clone());
                }
            }
        }
        names
    }

    /// Projection list; `SELECT 1` for the empty (count-only) projection.
    fn render_projection(&self, plan: &ScanPlan) -> String {
        let names = self.projected_names(plan);
        if names.is_empty() {
            return "1".to_string();
        }

        names
            .iter()
            .map(|name| self.render_projected_column(name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One projected column, with the NVARCHAR cast policy applied to
    /// non-UTF-8 single-byte character columns.
    fn render_projected_column(&self, name: &str) -> String {
        let escaped = escape_ident(name);
        let Some(column) = self.table.column(name) else {
            return escaped;
        };

        if self.varchar_to_nvarchar
            && column.is_single_byte_char()
            && !column.collation_is_utf8()
        {
            let width = if column.max_length < 0 {
                "MAX".to_string()
            } else {
                column.max_length.min(NVARCHAR_CAP).to_string()
            };
            return format!("CAST({escaped} AS NVARCHAR({width})) AS {escaped}");
        }

        escaped
    }

    /// Render a scalar expression, or `None` when it has no exact T-SQL
    /// form over this table.
    fn render_scalar(&self, expr: &ScalarExpr) -> Option<String> {
        match expr {
            ScalarExpr::Column(name) => {
                // Unknown columns make the whole predicate residual.
                self.table.column(name)?;
                Some(escape_ident(name))
            }
            ScalarExpr::Literal(value) => Some(render_literal(value)),
            ScalarExpr::Func { func, args } => self.render_func(*func, args),
        }
    }

    fn render_func(&self, func: ScalarFunc, args: &[ScalarExpr]) -> Option<String> {
        match func {
            ScalarFunc::Year
            | ScalarFunc::Month
            | ScalarFunc::Day
            | ScalarFunc::Upper
            | ScalarFunc::Lower
            | ScalarFunc::Length
            | ScalarFunc::Trim => {
                let [arg] = args else { return None };
                Some(format!("{}({})", func.tsql_name(), self.render_scalar(arg)?))
            }
            ScalarFunc::DateDiff => {
                let [part, from, to] = args else { return None };
                // The date part is a bare keyword, not a quoted literal.
                let ScalarExpr::Literal(part_value) = part else {
                    return None;
                };
                let part = part_value.as_str()?;
                if !matches!(
                    part,
                    "year" | "quarter" | "month" | "week" | "day" | "hour" | "minute" | "second"
                ) {
                    return None;
                }
                Some(format!(
                    "DATEDIFF({part}, {}, {})",
                    self.render_scalar(from)?,
                    self.render_scalar(to)?
                ))
            }
        }
    }

    /// Render a filter, or `None` to leave it residual.
    fn render_filter(&self, filter: &FilterExpr) -> Option<String> {
        match filter {
            FilterExpr::Compare { op, left, right } => Some(format!(
                "{} {} {}",
                self.render_scalar(left)?,
                op.tsql(),
                self.render_scalar(right)?
            )),
            FilterExpr::IsNull { expr, negated } => Some(format!(
                "{} IS {}NULL",
                self.render_scalar(expr)?,
                if *negated { "NOT " } else { "" }
            )),
            FilterExpr::And(children) => {
                // Pushing any subset of a conjunction is safe; the host
                // re-applies the full predicate.
                let fragments: Vec<String> = children
                    .iter()
                    .filter_map(|c| self.render_filter(c))
                    .collect();
                if fragments.is_empty() {
                    None
                } else {
                    Some(format!("({})", fragments.join(" AND ")))
                }
            }
            FilterExpr::Or(children) => {
                // A disjunction only pushes whole: dropping a branch would
                // filter out rows the host still needs.
                let fragments: Vec<String> = children
                    .iter()
                    .map(|c| self.render_filter(c))
                    .collect::<Option<_>>()?;
                Some(format!("({})", fragments.join(" OR ")))
            }
            FilterExpr::Not(inner) => Some(format!("NOT ({})", self.render_filter(inner)?)),
            FilterExpr::Between { expr, low, high } => Some(format!(
                "{} BETWEEN {} AND {}",
                self.render_scalar(expr)?,
                render_literal(low),
                render_literal(high)
            )),
            FilterExpr::InList { expr, values } => {
                if values.len() > MAX_PUSHED_IN_LIST {
                    return None;
                }
                if values.is_empty() {
                    return Some("1 = 0".to_string());
                }
                let list: Vec<String> = values.iter().map(render_literal).collect();
                Some(format!(
                    "{} IN ({})",
                    self.render_scalar(expr)?,
                    list.join(", ")
                ))
            }
            FilterExpr::Like {
                expr,
                pattern,
                case_insensitive,
            } => {
                if *case_insensitive {
                    // ILIKE only pushes when the column's collation folds
                    // case anyway; otherwise the host keeps it.
                    let column = expr.base_column()?;
                    let info = self.table.column(column)?;
                    if !info.collation_is_case_insensitive() {
                        return None;
                    }
                }
                Some(format!(
                    "{} LIKE {}",
                    self.render_scalar(expr)?,
                    render_literal(&mssql_values::SqlValue::from(pattern.as_str()))
                ))
            }
            FilterExpr::Opaque => None,
        }
    }

    /// Longest ORDER BY prefix that pushes safely.
    ///
    /// A key pushes when it renders (column or mapped single-column
    /// function) and either its column is NOT NULL or the requested NULL
    /// placement matches SQL Server's fixed behavior: NULLs first under
    /// ASC, NULLs last under DESC.
    #[must_use]
    pub fn pushable_sort_prefix(&self, keys: &[SortKey]) -> usize {
        let mut prefix = 0;
        for key in keys {
            if self.render_sort_key(key).is_none() {
                break;
            }
            let nullable = key
                .expr
                .base_column()
                .and_then(|name| self.table.column(name))
                .is_none_or(|c| c.nullable);
            if nullable {
                let server_placement_matches = key.nulls_first == key.ascending;
                if !server_placement_matches {
                    break;
                }
            }
            prefix += 1;
        }
        prefix
    }

    fn render_sort_key(&self, key: &SortKey) -> Option<String> {
        // Sort keys are column references or mapped functions of one
        // column; bare literals make no sense here.
        key.expr.base_column()?;
        Some(format!(
            "{} {}",
            self.render_scalar(&key.expr)?,
            if key.ascending { "ASC" } else { "DESC" }
        ))
    }
}
