//! Keyword categorization of expenses.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::Transaction;

use super::{decimal_string, percent_of};

/// Bucket for expenses no rule matches.
pub const OTHERS: &str = "Others";

/// One spending bucket and the lower-case keywords that select it.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

impl CategoryRule {
    fn matches(&self, description: &str) -> bool {
        self.keywords.iter().any(|k| description.contains(k))
    }
}

/// Rules in priority order. The first rule with a keyword contained in the
/// lower-cased description wins.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        name: "Food & Dining",
        keywords: &["food", "restaurant", "pizza", "coffee", "dining", "meal"],
    },
    CategoryRule {
        name: "Transportation",
        keywords: &["fuel", "gas", "taxi", "uber", "transport", "parking"],
    },
    CategoryRule {
        name: "Utilities & Bills",
        keywords: &["utility", "bill", "electric", "water", "internet", "phone"],
    },
    CategoryRule {
        name: "Banking & Finance",
        keywords: &["atm", "withdrawal", "bank", "fee"],
    },
    CategoryRule {
        name: "Shopping",
        keywords: &["shop", "store", "market", "purchase"],
    },
    CategoryRule {
        name: "Healthcare",
        keywords: &["medical", "doctor", "hospital", "pharmacy"],
    },
    CategoryRule {
        name: "Entertainment",
        keywords: &["entertainment", "movie", "game", "ticket"],
    },
];

/// Category name for a transaction description.
pub fn categorize(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.name)
        .unwrap_or(OTHERS)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    #[serde(with = "decimal_string")]
    pub value: Decimal,
    pub count: usize,
    /// Share of total expenses, one decimal (`"37.5"`).
    pub percentage: String,
    pub transactions: Vec<Transaction>,
}

/// Group expenses by category.
///
/// Only non-empty categories are returned, sorted by value descending; ties
/// keep rule order with `Others` last. Missing amounts count as zero, so
/// the values always add up to `total_expenses`.
pub fn summarize_categories(
    expenses: &[Transaction],
    total_expenses: Decimal,
) -> Vec<CategorySummary> {
    let names = CATEGORY_RULES
        .iter()
        .map(|rule| rule.name)
        .chain(std::iter::once(OTHERS));

    let mut out: Vec<CategorySummary> = names
        .map(|name| CategorySummary {
            name: name.to_string(),
            value: Decimal::ZERO,
            count: 0,
            percentage: String::new(),
            transactions: Vec::new(),
        })
        .collect();

    for txn in expenses {
        let name = categorize(&txn.description);
        if let Some(bucket) = out.iter_mut().find(|c| c.name == name) {
            bucket.value = bucket.value.saturating_add(txn.amount_or_zero());
            bucket.count += 1;
            bucket.transactions.push(txn.clone());
        }
    }

    out.retain(|c| c.count > 0);
    for c in &mut out {
        c.percentage = crate::format::fixed(percent_of(c.value, total_expenses), 1);
    }
    // `sort_by` is stable.
    out.sort_by(|a, b| b.value.cmp(&a.value));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(description: &str, amount: i64) -> Transaction {
        Transaction::new("01JAN2024", description, Decimal::from(amount))
    }

    #[test]
    fn categorize_is_case_insensitive() {
        assert_eq!(categorize("PIZZA HUT"), "Food & Dining");
        assert_eq!(categorize("Uber Trip"), "Transportation");
        assert_eq!(categorize("CEB ELECTRICITY"), "Utilities & Bills");
        assert_eq!(categorize("ATM WDL 1234"), "Banking & Finance");
        assert_eq!(categorize("KEELLS SUPER MARKET"), "Shopping");
        assert_eq!(categorize("City Pharmacy"), "Healthcare");
        assert_eq!(categorize("MOVIE TICKETS"), "Entertainment");
        assert_eq!(categorize("TRANSFER TO J DOE"), OTHERS);
        assert_eq!(categorize(""), OTHERS);
    }

    #[test]
    fn first_matching_rule_wins() {
        // "coffee" (food) and "shop" (shopping) both match.
        assert_eq!(categorize("COFFEE SHOP"), "Food & Dining");
        // "gas" (transportation) before "bill" (utilities).
        assert_eq!(categorize("GAS BILL"), "Transportation");
        // "phone" (utilities) before "store" (shopping).
        assert_eq!(categorize("PHONE STORE"), "Utilities & Bills");
    }

    #[test]
    fn single_expense_is_whole_share() {
        let categories = summarize_categories(&[expense("PIZZA HUT", 1200)], Decimal::from(1200));
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Food & Dining");
        assert_eq!(categories[0].percentage, "100.0");
        assert_eq!(categories[0].count, 1);
    }

    #[test]
    fn sorted_by_value_descending() {
        let expenses = [
            expense("PIZZA HUT", 100),
            expense("UBER", 500),
            expense("RANDOM", 300),
            expense("COFFEE", 50),
        ];
        let categories = summarize_categories(&expenses, Decimal::from(950));
        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Transportation", "Others", "Food & Dining"]);
        assert_eq!(categories[2].value, Decimal::from(150));
        assert_eq!(categories[2].count, 2);
        assert_eq!(categories[0].percentage, "52.6");
    }

    #[test]
    fn ties_keep_rule_order() {
        let expenses = [expense("RANDOM", 10), expense("ATM", 10), expense("PIZZA", 10)];
        let categories = summarize_categories(&expenses, Decimal::from(30));
        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Food & Dining", "Banking & Finance", "Others"]);
    }

    #[test]
    fn zero_total_gives_zero_percentages() {
        let mut txn = expense("PIZZA", 0);
        txn.amount = None;
        let categories = summarize_categories(&[txn], Decimal::ZERO);
        assert_eq!(categories[0].percentage, "0.0");
        assert_eq!(categories[0].value, Decimal::ZERO);
    }
}
