//! T-SQL literal rendering.
//!
//! Scan queries go out as SQL batches with values rendered inline, so the
//! rendering must be injection-safe: strings double their closing quotes,
//! binary becomes hex, temporal values use unambiguous ISO forms.

use std::fmt::Write as _;

use crate::value::SqlValue;

/// Render a value as a T-SQL literal.
#[must_use]
pub fn render_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        SqlValue::TinyInt(v) => v.to_string(),
        SqlValue::SmallInt(v) => v.to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::BigInt(v) => v.to_string(),
        SqlValue::Float(v) => render_float(f64::from(*v)),
        SqlValue::Double(v) => render_float(*v),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::String(s) | SqlValue::Xml(s) => render_string(s),
        SqlValue::Binary(data) => {
            let mut out = String::with_capacity(2 + data.len() * 2);
            out.push_str("0x");
            for byte in data.iter() {
                let _ = write!(out, "{byte:02X}");
            }
            out
        }
        SqlValue::Uuid(u) => format!("'{u}'"),
        SqlValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        SqlValue::Time(t) => format!("'{}'", t.format("%H:%M:%S%.7f")),
        SqlValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.7f")),
        SqlValue::DateTimeOffset(dt) => {
            format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.7f %:z"))
        }
    }
}

/// Strings render as national character literals with doubled quotes.
fn render_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 3);
    out.push_str("N'");
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// SQL Server has no NaN/infinity; those render as NULL.
fn render_float(v: f64) -> String {
    if v.is_finite() {
        format!("{v:?}")
    } else {
        "NULL".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;
    use chrono::{NaiveDate, NaiveTime};

    use super::*;

    #[test]
    fn numbers_render_bare() {
        assert_eq!(render_literal(&SqlValue::Int(-5)), "-5");
        assert_eq!(render_literal(&SqlValue::BigInt(1 << 40)), "1099511627776");
        assert_eq!(render_literal(&SqlValue::Bool(true)), "1");
        assert_eq!(render_literal(&SqlValue::Double(1.5)), "1.5");
    }

    #[test]
    fn strings_quote_and_escape() {
        assert_eq!(render_literal(&SqlValue::from("ok")), "N'ok'");
        assert_eq!(
            render_literal(&SqlValue::from("O'Brien")),
            "N'O''Brien'"
        );
    }

    #[test]
    fn binary_renders_as_hex() {
        let v = SqlValue::Binary(Bytes::from_static(&[0xDE, 0xAD, 0x01]));
        assert_eq!(render_literal(&v), "0xDEAD01");
    }

    #[test]
    fn temporal_iso_forms() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(render_literal(&SqlValue::Date(d)), "'2024-02-29'");

        let t = NaiveTime::from_hms_micro_opt(13, 5, 0, 250_000).unwrap();
        assert_eq!(render_literal(&SqlValue::Time(t)), "'13:05:00.2500000'");
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(render_literal(&SqlValue::Double(f64::NAN)), "NULL");
        assert_eq!(render_literal(&SqlValue::Double(f64::INFINITY)), "NULL");
    }

    #[test]
    fn null_renders_as_keyword() {
        assert_eq!(render_literal(&SqlValue::Null), "NULL");
    }
}
