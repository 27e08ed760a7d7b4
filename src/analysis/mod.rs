//! Aggregation of an [`AnalysisResult`] into presentation-ready summaries.
//!
//! [`summarize`] is pure: no I/O, and the same input always produces the same
//! [`Summary`]. It never fails; missing or empty transaction lists give
//! zero-valued totals and empty month/category lists.

pub mod category;
pub mod cost;
pub mod insights;
pub mod monthly;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{AnalysisResult, Transaction};

pub use category::{categorize, summarize_categories, CategorySummary, CATEGORY_RULES, OTHERS};
pub use cost::{summarize_cost, CostSummary};
pub use insights::{generate_insights, Insight, Severity};
pub use monthly::{summarize_months, MonthKey, MonthSummary};

/// Decimals serialize as canonical strings, like other numeric output
/// fields.
pub(crate) mod decimal_string {
    use rust_decimal::Decimal;
    use serde::Serializer;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&crate::format::canonical(*value))
    }
}

/// `value / total * 100`, or zero when `total` is zero.
pub(crate) fn percent_of(value: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    value
        .checked_div(total)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    #[serde(with = "decimal_string")]
    pub total_income: Decimal,
    #[serde(with = "decimal_string")]
    pub total_expenses: Decimal,
    #[serde(with = "decimal_string")]
    pub net: Decimal,
    /// Percent of income kept; zero when there is no income.
    #[serde(with = "decimal_string")]
    pub savings_rate: Decimal,
    pub income_count: usize,
    pub expense_count: usize,
    pub total_transactions: usize,
    #[serde(with = "decimal_string")]
    pub average_income: Decimal,
    #[serde(with = "decimal_string")]
    pub average_expense: Decimal,
    #[serde(with = "decimal_string")]
    pub largest_income: Decimal,
    #[serde(with = "decimal_string")]
    pub largest_expense: Decimal,
}

/// Saturates at the `Decimal` range instead of overflowing.
fn sum(txns: &[Transaction]) -> Decimal {
    txns.iter()
        .map(Transaction::amount_or_zero)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    total
        .checked_div(Decimal::from(count))
        .unwrap_or(Decimal::ZERO)
}

fn largest(txns: &[Transaction]) -> Decimal {
    txns.iter()
        .filter_map(|t| t.amount)
        .max()
        .unwrap_or(Decimal::ZERO)
}

impl Totals {
    pub fn from_transactions(income: &[Transaction], expenses: &[Transaction]) -> Self {
        let total_income = sum(income);
        let total_expenses = sum(expenses);
        let net = total_income.saturating_sub(total_expenses);
        let savings_rate = if total_income > Decimal::ZERO {
            percent_of(net, total_income)
        } else {
            Decimal::ZERO
        };

        Self {
            total_income,
            total_expenses,
            net,
            savings_rate,
            income_count: income.len(),
            expense_count: expenses.len(),
            total_transactions: income.len() + expenses.len(),
            average_income: average(total_income, income.len()),
            average_expense: average(total_expenses, expenses.len()),
            largest_income: largest(income),
            largest_expense: largest(expenses),
        }
    }
}

/// Everything derived from one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub totals: Totals,
    pub monthly: Vec<MonthSummary>,
    pub categories: Vec<CategorySummary>,
    pub insights: Vec<Insight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostSummary>,
}

pub fn summarize(result: &AnalysisResult) -> Summary {
    let income = &result.transactions.income;
    let expenses = &result.transactions.expenses;

    let totals = Totals::from_transactions(income, expenses);
    let monthly = summarize_months(income, expenses);
    let categories = summarize_categories(expenses, totals.total_expenses);
    let insights = generate_insights(&totals, &categories);
    let cost = result.api_cost.as_ref().map(summarize_cost);

    Summary {
        totals,
        monthly,
        categories,
        insights,
        cost,
    }
}
