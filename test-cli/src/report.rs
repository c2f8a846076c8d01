//! Parsing of `mysql`/`psql` count tables and the expected-vs-actual check.
//!
//! The parsers are positional: they rely on the default text output of each
//! client and silently report `?` for tables they cannot find.

use std::collections::BTreeMap;
use std::io::Write;

use crate::error::{Error, Result};

pub const UNKNOWN: &str = "?";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCounts(BTreeMap<String, String>);

impl TableCounts {
    pub fn get(&self, table: &str) -> &str {
        self.0.get(table).map(String::as_str).unwrap_or(UNKNOWN)
    }

    fn insert(&mut self, table: &str, count: &str) {
        self.0.insert(table.to_string(), count.to_string());
    }
}

/// `mysql -e` batch output: one tab separated row per table, count second.
pub fn parse_mysql_counts(output: &str) -> TableCounts {
    let mut counts = TableCounts::default();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 {
            counts.insert(fields[0], fields[1]);
        }
    }

    counts
}

/// `psql` aligned output: `table | count`, so the count is the last field.
pub fn parse_postgres_counts(output: &str) -> TableCounts {
    let mut counts = TableCounts::default();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 3 {
            counts.insert(fields[0], fields[fields.len() - 1]);
        }
    }

    counts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    entries: Vec<(String, String)>,
}

impl Expectation {
    pub fn new<I, T, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: Into<String>,
        C: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(table, count)| (table.into(), count.into()))
                .collect(),
        }
    }

    pub fn matches(&self, actual: &TableCounts) -> bool {
        self.entries
            .iter()
            .all(|(table, expected)| actual.get(table) == expected)
    }

    fn render_expected(&self, sep: &str) -> String {
        self.entries
            .iter()
            .map(|(table, count)| format!("{table}={count}"))
            .collect::<Vec<_>>()
            .join(sep)
    }

    fn render_actual(&self, actual: &TableCounts, sep: &str) -> String {
        self.entries
            .iter()
            .map(|(table, _)| format!("{table}={}", actual.get(table)))
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// Prints the expected and actual counts followed by `Result: PASSED` or
/// `Result: FAILED`; a mismatch is returned as [`Error::Verification`].
pub fn verify_report<W: Write>(
    out: &mut W,
    expected: &Expectation,
    actual: &TableCounts,
) -> Result<()> {
    writeln!(out, "Expected: {}", expected.render_expected(", "))?;
    writeln!(out, "Actual: {}", expected.render_actual(actual, ", "))?;

    if !expected.matches(actual) {
        writeln!(out, "Result: FAILED")?;
        return Err(Error::Verification {
            expected: expected.render_expected(" "),
            actual: expected.render_actual(actual, " "),
        });
    }

    writeln!(out, "Result: PASSED")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_tab_separated() {
        let counts = parse_mysql_counts("users\t2\norders\t4");
        assert_eq!(counts.get("users"), "2");
        assert_eq!(counts.get("orders"), "4");
    }

    #[test]
    fn mysql_header_row_is_harmless() {
        let counts = parse_mysql_counts("tbl\tcnt\nusers\t2\norders\t4\n");
        assert_eq!(counts.get("users"), "2");
        assert_eq!(counts.get("products"), UNKNOWN);
    }

    #[test]
    fn postgres_aligned_table() {
        let output = "\
   tbl    | cnt
----------+-----
 users    |   5
 orders   |   5
 products |   4
(3 rows)
";
        let counts = parse_postgres_counts(output);
        assert_eq!(counts.get("users"), "5");
        assert_eq!(counts.get("orders"), "5");
        assert_eq!(counts.get("products"), "4");
    }

    #[test]
    fn postgres_ignores_short_rows() {
        let counts = parse_postgres_counts("users 5\n(1 row)");
        assert_eq!(counts.get("users"), UNKNOWN);
    }

    #[test]
    fn passing_report() {
        let expected = Expectation::new([("users", "2"), ("orders", "4")]);
        let actual = parse_mysql_counts("users\t2\norders\t4");
        let mut out = Vec::new();

        verify_report(&mut out, &expected, &actual).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Expected: users=2, orders=4\nActual: users=2, orders=4\nResult: PASSED\n"
        );
    }

    #[test]
    fn failing_report_carries_both_sides() {
        let expected = Expectation::new([("users", "2"), ("orders", "4")]);
        let actual = parse_mysql_counts("users\t2\norders\t3");
        let mut out = Vec::new();

        let err = verify_report(&mut out, &expected, &actual).unwrap_err();

        assert!(String::from_utf8(out).unwrap().ends_with("Result: FAILED\n"));
        assert_eq!(
            err.to_string(),
            "verification failed: expected users=2 orders=4, got users=2 orders=3"
        );
    }

    #[test]
    fn missing_table_fails() {
        let expected = Expectation::new([("users", "5"), ("orders", "5"), ("products", "4")]);
        let actual = parse_postgres_counts(" users | 5\n orders | 5\n");

        assert!(!expected.matches(&actual));
    }
}
