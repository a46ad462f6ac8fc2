//! Financial statement pivot.
//!
//! Long-format `(account, reference_date, value)` lines become one daily
//! column per account. A report stays in force until superseded; days
//! before the first report of an account take that first report's value.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::StatementLine;

use super::align::{as_of_fill, back_fill_leading, dedupe_observations};

/// Pivot statement lines into per-account columns on `axis`.
///
/// Lines without a parsed value are ignored. Accounts come back sorted by
/// name; accounts with no usable line are omitted.
pub fn pivot_accounts(lines: &[StatementLine], axis: &[NaiveDate]) -> BTreeMap<String, Vec<f64>> {
    let mut by_account: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for line in lines {
        if let Some(value) = line.value {
            by_account
                .entry(line.account.as_str())
                .or_default()
                .push((line.reference_date, value));
        }
    }

    let mut columns = BTreeMap::new();
    for (account, observations) in by_account {
        let observations = dedupe_observations(observations);
        if observations.is_empty() {
            continue;
        }
        let mut values = as_of_fill(axis, &observations);
        back_fill_leading(&mut values);
        columns.insert(account.to_string(), values);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn line(account: &str, date: &str, value: Option<f64>) -> StatementLine {
        StatementLine {
            account: account.into(),
            reference_date: d(date),
            value,
        }
    }

    #[test]
    fn quarterly_reports_become_daily_steps() {
        let axis = vec![d("2024-01-02"), d("2024-03-29"), d("2024-04-02"), d("2024-07-01")];
        let lines = vec![
            line("3.01", "2024-03-31", Some(100.0)),
            line("3.01", "2024-06-30", Some(120.0)),
        ];
        let cols = pivot_accounts(&lines, &axis);
        let revenue = &cols["3.01"];
        // Before the first report: back-filled.
        assert_eq!(revenue[0], 100.0);
        assert_eq!(revenue[1], 100.0);
        assert_eq!(revenue[2], 100.0);
        assert_eq!(revenue[3], 120.0);
    }

    #[test]
    fn unparsed_values_are_ignored() {
        let axis = vec![d("2024-01-02")];
        let lines = vec![line("1.01", "2023-12-31", None), line("2.01", "2023-12-31", Some(7.0))];
        let cols = pivot_accounts(&lines, &axis);
        assert!(!cols.contains_key("1.01"));
        assert_eq!(cols["2.01"], vec![7.0]);
    }

    #[test]
    fn accounts_are_sorted() {
        let axis = vec![d("2024-01-02")];
        let lines = vec![
            line("b", "2023-12-31", Some(1.0)),
            line("a", "2023-12-31", Some(2.0)),
        ];
        let names: Vec<_> = pivot_accounts(&lines, &axis).into_keys().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
