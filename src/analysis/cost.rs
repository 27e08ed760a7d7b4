use serde::Serialize;

use crate::models::ApiCost;

/// Derived view of the backend's extraction metering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
    pub cost_per_million_tokens: f64,
    pub chunks_processed: u64,
    pub average_tokens_per_chunk: u64,
    /// The statement was split into several extraction calls.
    pub chunked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

pub fn summarize_cost(cost: &ApiCost) -> CostSummary {
    let total_tokens = cost.input_tokens.saturating_add(cost.output_tokens);
    let chunks = cost.chunks_processed.max(1);
    let cost_per_million_tokens = if total_tokens > 0 {
        cost.total_cost_usd / total_tokens as f64 * 1_000_000.0
    } else {
        0.0
    };
    let average_tokens_per_chunk = (total_tokens as f64 / chunks as f64).round() as u64;

    CostSummary {
        input_tokens: cost.input_tokens,
        output_tokens: cost.output_tokens,
        total_tokens,
        input_cost_usd: cost.input_cost_usd,
        output_cost_usd: cost.output_cost_usd,
        total_cost_usd: cost.total_cost_usd,
        cost_per_million_tokens,
        chunks_processed: cost.chunks_processed,
        average_tokens_per_chunk,
        chunked: cost.chunks_processed > 1,
        timestamp: cost.timestamp.clone(),
    }
}
