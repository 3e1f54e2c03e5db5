//! Neutral expression shapes handed over by the host engine at bind time.
//!
//! The host's own expression trees are translated into these before
//! pushdown planning; anything the host cannot express here arrives as
//! [`FilterExpr::Opaque`] and stays host-side.

use mssql_values::SqlValue;

/// Scalar functions with a fixed T-SQL mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunc {
    /// `year(x)` -> `YEAR(x)`
    Year,
    /// `month(x)` -> `MONTH(x)`
    Month,
    /// `day(x)` -> `DAY(x)`
    Day,
    /// `upper(x)` -> `UPPER(x)`
    Upper,
    /// `lower(x)` -> `LOWER(x)`
    Lower,
    /// `length(x)` -> `LEN(x)`
    Length,
    /// `trim(x)` -> `TRIM(x)`
    Trim,
    /// `date_diff(part, a, b)` -> `DATEDIFF(part, a, b)`
    DateDiff,
}

impl ScalarFunc {
    /// The T-SQL function name.
    #[must_use]
    pub const fn tsql_name(&self) -> &'static str {
        match self {
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::Day => "DAY",
            Self::Upper => "UPPER",
            Self::Lower => "LOWER",
            Self::Length => "LEN",
            Self::Trim => "TRIM",
            Self::DateDiff => "DATEDIFF",
        }
    }
}

/// A scalar expression over one table's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    /// A direct column reference by name.
    Column(String),
    /// A constant.
    Literal(SqlValue),
    /// A mapped function call.
    Func {
        /// Which function.
        func: ScalarFunc,
        /// Arguments in order. For `DateDiff` the first argument is the
        /// date-part keyword as a string literal.
        args: Vec<ScalarExpr>,
    },
}

impl ScalarExpr {
    /// The referenced column when this is a bare column or a mapped
    /// function over exactly one column.
    #[must_use]
    pub fn base_column(&self) -> Option<&str> {
        match self {
            Self::Column(name) => Some(name),
            Self::Func { args, .. } => {
                let mut columns = args.iter().filter_map(|a| match a {
                    Self::Column(name) => Some(name.as_str()),
                    _ => None,
                });
                let first = columns.next()?;
                if columns.next().is_some() {
                    return None;
                }
                Some(first)
            }
            Self::Literal(_) => None,
        }
    }
}

/// Comparison operators with direct T-SQL equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// T-SQL operator text.
    #[must_use]
    pub const fn tsql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A filter predicate candidate for pushdown.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Binary comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left side.
        left: ScalarExpr,
        /// Right side.
        right: ScalarExpr,
    },
    /// `IS NULL` / `IS NOT NULL`.
    IsNull {
        /// Tested expression.
        expr: ScalarExpr,
        /// True for `IS NOT NULL`.
        negated: bool,
    },
    /// Conjunction.
    And(Vec<FilterExpr>),
    /// Disjunction.
    Or(Vec<FilterExpr>),
    /// Negation.
    Not(Box<FilterExpr>),
    /// Range check, inclusive on both ends.
    Between {
        /// Tested expression.
        expr: ScalarExpr,
        /// Lower bound.
        low: SqlValue,
        /// Upper bound.
        high: SqlValue,
    },
    /// Membership in a literal list.
    InList {
        /// Tested expression.
        expr: ScalarExpr,
        /// Candidate values.
        values: Vec<SqlValue>,
    },
    /// Pattern match with `%` and `_` wildcards.
    Like {
        /// Tested expression.
        expr: ScalarExpr,
        /// The pattern.
        pattern: String,
        /// True for case-insensitive matching (ILIKE).
        case_insensitive: bool,
    },
    /// A host expression with no remote rendering; always residual.
    Opaque,
}

/// One ORDER BY key as requested by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Sort expression.
    pub expr: ScalarExpr,
    /// Ascending order.
    pub ascending: bool,
    /// NULLs sort before non-NULLs.
    pub nulls_first: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_column_of_function() {
        let expr = ScalarExpr::Func {
            func: ScalarFunc::Year,
            args: vec![ScalarExpr::Column("created_at".into())],
        };
        assert_eq!(expr.base_column(), Some("created_at"));
    }

    #[test]
    fn base_column_rejects_multi_column_funcs() {
        let expr = ScalarExpr::Func {
            func: ScalarFunc::DateDiff,
            args: vec![
                ScalarExpr::Literal(SqlValue::from("day")),
                ScalarExpr::Column("a".into()),
                ScalarExpr::Column("b".into()),
            ],
        };
        assert_eq!(expr.base_column(), None);
    }

    #[test]
    fn literal_has_no_base_column() {
        assert_eq!(ScalarExpr::Literal(SqlValue::Int(1)).base_column(), None);
    }
}
