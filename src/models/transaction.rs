use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single statement line as extracted by the backend.
///
/// Transactions carry no identifier; list position is incidental. The
/// `date` is whatever format the statement used (see
/// [`crate::analysis::monthly::MonthKey`] for the formats understood when
/// bucketing by month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,

    /// Non-negative amount. `None` when the backend sent something that is
    /// not a JSON number.
    #[serde(default, with = "amount")]
    pub amount: Option<Decimal>,
}

impl Transaction {
    pub fn new(date: impl Into<String>, description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            date: Some(date.into()),
            description: description.into(),
            amount: Some(amount),
        }
    }

    /// Amount with missing values counted as zero, as totals do.
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or(Decimal::ZERO)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Serde adapter: JSON numbers on the wire, `Decimal` in memory.
///
/// Anything that is not a number (strings, null, objects) reads as `None`
/// instead of failing the whole payload. Numbers beyond the `Decimal` range
/// saturate at `Decimal::MAX` or `Decimal::MIN`.
pub(crate) mod amount {
    use super::*;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value.and_then(|d| d.to_f64()) {
            Some(f) => serializer.serialize_f64(f),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Number(n) => number_to_decimal(&n),
            _ => None,
        })
    }

    pub(crate) fn number_to_decimal(n: &serde_json::Number) -> Option<Decimal> {
        let text = n.to_string();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
            .or_else(|| {
                let f = n.as_f64()?;
                Decimal::from_f64(f).or(Some(if f.is_sign_negative() {
                    Decimal::MIN
                } else {
                    Decimal::MAX
                }))
            })
    }
}

/// Same as [`amount`] but defaulting to zero, for required totals such as
/// the final balance.
pub(crate) mod amount_or_zero {
    use super::*;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_f64().unwrap_or_default())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(amount::deserialize(deserializer)?.unwrap_or(Decimal::ZERO))
    }
}
