//! As-of alignment of dated observations onto a date axis.
//!
//! Each axis date sees the latest finite observation dated on or before it.
//! Axis dates before the first observation get NaN, so no value from the
//! future of a row ever leaks into it.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Collapse observations to one value per date, keeping only finite values.
///
/// Duplicate dates are averaged.
pub fn dedupe_observations(observations: impl IntoIterator<Item = (NaiveDate, f64)>) -> Vec<(NaiveDate, f64)> {
    let mut by_date: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (date, value) in observations {
        if !value.is_finite() {
            continue;
        }
        let slot = by_date.entry(date).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }
    by_date
        .into_iter()
        .map(|(date, (sum, n))| (date, sum / n as f64))
        .collect()
}

/// Forward-fill sorted, deduplicated observations onto `axis`.
///
/// `axis` must be ascending; `observations` must be ascending by date.
pub fn as_of_fill(axis: &[NaiveDate], observations: &[(NaiveDate, f64)]) -> Vec<f64> {
    let mut out = Vec::with_capacity(axis.len());
    let mut cursor = 0;
    let mut current = f64::NAN;
    for date in axis {
        while cursor < observations.len() && observations[cursor].0 <= *date {
            current = observations[cursor].1;
            cursor += 1;
        }
        out.push(current);
    }
    out
}

/// Replace the leading run of NaN with the first finite value.
pub fn back_fill_leading(values: &mut [f64]) {
    let Some(first) = values.iter().copied().find(|v| v.is_finite()) else {
        return;
    };
    for v in values.iter_mut() {
        if v.is_finite() {
            break;
        }
        *v = first;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn as_of_fill_carries_last_known_value() {
        let axis = vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04"), d("2024-01-08")];
        let obs = vec![(d("2024-01-03"), 5.0), (d("2024-01-06"), 6.0)];
        let filled = as_of_fill(&axis, &obs);
        assert!(filled[0].is_nan());
        assert_eq!(filled[1], 5.0);
        assert_eq!(filled[2], 5.0);
        // Weekend observation becomes visible on the next axis date.
        assert_eq!(filled[3], 6.0);
    }

    #[test]
    fn as_of_fill_never_looks_ahead() {
        let axis = vec![d("2024-01-02")];
        let obs = vec![(d("2024-01-03"), 1.0)];
        assert!(as_of_fill(&axis, &obs)[0].is_nan());
    }

    #[test]
    fn dedupe_averages_and_drops_non_finite() {
        let obs = dedupe_observations(vec![
            (d("2024-01-03"), 2.0),
            (d("2024-01-02"), f64::NAN),
            (d("2024-01-03"), 4.0),
            (d("2024-01-01"), 1.0),
        ]);
        assert_eq!(obs, vec![(d("2024-01-01"), 1.0), (d("2024-01-03"), 3.0)]);
    }

    #[test]
    fn back_fill_only_touches_leading_gap() {
        let mut values = vec![f64::NAN, f64::NAN, 3.0, f64::NAN, 4.0];
        back_fill_leading(&mut values);
        assert_eq!(values[0], 3.0);
        assert_eq!(values[1], 3.0);
        assert!(values[3].is_nan());
    }

    #[test]
    fn back_fill_all_nan_is_noop() {
        let mut values = vec![f64::NAN; 3];
        back_fill_leading(&mut values);
        assert!(values.iter().all(|v| v.is_nan()));
    }
}
