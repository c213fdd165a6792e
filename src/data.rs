//! The decoded tabular dataset handed to the analysis pipeline, and the
//! number formatting used when presenting results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable { headers, rows }
    }

    /// Convenience constructor for literal tables.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    /// Cell at `row`/`column`; short rows yield `None` for trailing columns.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Groups the integer part of `value` with commas: `1234567.8` → `1,234,568`.
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        grouped.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

pub fn format_currency(value: f64) -> String {
    if value < 0.0 {
        format!("-${}", group_thousands(-value))
    } else {
        format!("${}", group_thousands(value))
    }
}

/// Unit prices keep cents: `$0.42`.
pub fn format_unit_price(value: f64) -> String {
    format!("${value:.2}")
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn format_ratio(value: f64) -> String {
    format!("{value:.2}")
}
