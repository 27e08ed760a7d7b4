use rust_decimal::Decimal;
use serde::Serialize;

use crate::format::fixed;

use super::category::CategorySummary;
use super::{percent_of, Totals};

const HIGH_SAVINGS_RATE: i64 = 20;
const MODERATE_SAVINGS_RATE: i64 = 10;
const CONCENTRATION_PERCENT: i64 = 40;
const HIGH_TRANSACTION_VOLUME: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Positive,
    Neutral,
    Warning,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Insight {
    fn new(severity: Severity, title: &str, message: String) -> Self {
        Self {
            severity,
            title: title.to_string(),
            message,
        }
    }
}

fn savings_insight(rate: Decimal) -> Insight {
    let shown = fixed(rate, 1);
    if rate > Decimal::from(HIGH_SAVINGS_RATE) {
        Insight::new(
            Severity::Positive,
            "Excellent Savings Rate",
            format!("You're saving {shown}% of your income. Great job!"),
        )
    } else if rate > Decimal::from(MODERATE_SAVINGS_RATE) {
        Insight::new(
            Severity::Neutral,
            "Moderate Savings Rate",
            format!("You're saving {shown}% of your income. Consider increasing this to 20%+."),
        )
    } else if rate < Decimal::ZERO {
        Insight::new(
            Severity::Negative,
            "Spending More Than Income",
            format!(
                "You're spending {}% more than your income. This needs immediate attention.",
                fixed(rate.abs(), 1)
            ),
        )
    } else {
        Insight::new(
            Severity::Warning,
            "Low Savings Rate",
            format!("You're only saving {shown}% of your income. Try to reach at least 10%."),
        )
    }
}

/// Evaluate the insight rules in order.
///
/// The savings-rate ladder always yields exactly one insight. The
/// concentration and volume rules add one each when they fire.
pub fn generate_insights(totals: &Totals, categories: &[CategorySummary]) -> Vec<Insight> {
    let mut insights = vec![savings_insight(totals.savings_rate)];

    if let Some(top) = categories.first() {
        let share = percent_of(top.value, totals.total_expenses)
            .round_dp_with_strategy(1, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        if share > Decimal::from(CONCENTRATION_PERCENT) {
            insights.push(Insight::new(
                Severity::Warning,
                "High Spending in One Category",
                format!(
                    "{} accounts for {}% of your expenses. Consider diversifying your spending.",
                    top.name, top.percentage
                ),
            ));
        }
    }

    if totals.total_transactions > HIGH_TRANSACTION_VOLUME {
        insights.push(Insight::new(
            Severity::Neutral,
            "High Transaction Volume",
            format!(
                "You have {} transactions. Consider consolidating payments where possible.",
                totals.total_transactions
            ),
        ));
    }

    insights
}
