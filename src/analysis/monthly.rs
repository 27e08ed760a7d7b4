//! Month bucketing.
//!
//! Statement dates are free-form strings. A date is bucketed only if it
//! parses with one of [`DATE_FORMATS`]; everything else is left out of the
//! monthly view (but still counts towards totals).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::Transaction;

use super::decimal_string;

/// Accepted statement date formats, tried in order. `%b` matches month
/// abbreviations case-insensitively, so `01JAN2024` and `01 Jan 2024` both
/// parse.
pub const DATE_FORMATS: &[&str] = &[
    "%d%b%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
];

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Calendar month a transaction falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Parse a statement date string.
    pub fn parse(date: &str) -> Option<Self> {
        let date = date.trim();
        if date.is_empty() {
            return None;
        }
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
            .map(|d| Self {
                year: d.year(),
                month: d.month(),
            })
    }

    /// Display label, e.g. `Jan 2024`.
    pub fn label(&self) -> String {
        let idx = (self.month as usize).saturating_sub(1).min(11);
        format!("{} {}", MONTH_ABBREVIATIONS[idx], self.year)
    }
}

/// `YYYY-MM`; lexicographic order is chronological.
impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSummary {
    pub month: String,
    pub label: String,
    #[serde(with = "decimal_string")]
    pub income: Decimal,
    #[serde(with = "decimal_string")]
    pub expenses: Decimal,
    pub income_count: usize,
    pub expense_count: usize,
    #[serde(with = "decimal_string")]
    pub net: Decimal,
}

impl MonthSummary {
    fn empty(key: MonthKey) -> Self {
        Self {
            month: key.to_string(),
            label: key.label(),
            income: Decimal::ZERO,
            expenses: Decimal::ZERO,
            income_count: 0,
            expense_count: 0,
            net: Decimal::ZERO,
        }
    }
}

fn bucketable(txn: &Transaction) -> Option<(MonthKey, Decimal)> {
    let key = MonthKey::parse(txn.date.as_deref()?)?;
    Some((key, txn.amount?))
}

/// Per-month income and expenses, sorted by month.
pub fn summarize_months(income: &[Transaction], expenses: &[Transaction]) -> Vec<MonthSummary> {
    let mut months: BTreeMap<MonthKey, MonthSummary> = BTreeMap::new();

    for (key, amount) in income.iter().filter_map(bucketable) {
        let m = months.entry(key).or_insert_with(|| MonthSummary::empty(key));
        m.income = m.income.saturating_add(amount);
        m.income_count += 1;
    }
    for (key, amount) in expenses.iter().filter_map(bucketable) {
        let m = months.entry(key).or_insert_with(|| MonthSummary::empty(key));
        m.expenses = m.expenses.saturating_add(amount);
        m.expense_count += 1;
    }

    months
        .into_values()
        .map(|mut m| {
            m.net = m.income.saturating_sub(m.expenses);
            m
        })
        .collect()
}
