use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::transaction::{amount_or_zero, Transaction};

/// Account metadata printed on the statement. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_date: Option<String>,
}

/// Income and expense lines. Both lists always exist, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transactions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub income: Vec<Transaction>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expenses: Vec<Transaction>,
}

impl Transactions {
    pub fn len(&self) -> usize {
        self.income.len() + self.expenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.income.is_empty() && self.expenses.is_empty()
    }
}

/// Metering of the backend's AI extraction call. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCost {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
    pub chunks_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Default for ApiCost {
    fn default() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            input_cost_usd: 0.0,
            output_cost_usd: 0.0,
            total_cost_usd: 0.0,
            chunks_processed: 1,
            timestamp: None,
        }
    }
}

/// Everything the backend extracted from one statement.
///
/// This is also the request body of the report endpoint, so it serializes
/// back to the same shape it was read from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_details: AccountDetails,

    #[serde(default, deserialize_with = "null_as_default")]
    pub transactions: Transactions,

    /// Closing balance as reported; never reconciled against transactions.
    #[serde(default, with = "amount_or_zero")]
    pub final_balance: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_cost: Option<ApiCost>,
}

impl AnalysisResult {
    /// Statement currency, if the backend found one.
    pub fn currency(&self) -> Option<&str> {
        self.account_details
            .currency
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
