//! Plain-text rendering for the terminal.
//!
//! Every renderer is a pure function of its input. The text is produced by
//! `Display` views so formatting errors propagate instead of being dropped.

use std::fmt;

use crate::analysis::{Severity, Summary};
use crate::error::AnalysisError;
use crate::format::{format_amount, format_cost, format_percent, format_tokens};
use crate::models::{AnalysisResult, ExtractionMetadata};

/// Number of largest transactions listed per side.
const TOP_TRANSACTIONS: usize = 5;

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Positive => "[+]",
        Severity::Neutral => "[i]",
        Severity::Warning => "[!]",
        Severity::Negative => "[-]",
    }
}

/// Account header, totals, months, categories, insights and extraction cost.
pub struct SummaryView<'a> {
    pub result: &'a AnalysisResult,
    pub summary: &'a Summary,
}

impl fmt::Display for SummaryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let currency = self.result.currency();
        let money = |v| format_amount(v, currency);

        let account = &self.result.account_details;
        if let Some(name) = account.name.as_deref() {
            writeln!(f, "Account holder: {name}")?;
        }
        if let Some(number) = account.account_number.as_deref() {
            writeln!(f, "Account number: {number}")?;
        }
        if let Some(date) = account.statement_date.as_deref() {
            writeln!(f, "Statement date: {date}")?;
        }

        let t = &self.summary.totals;
        writeln!(f, "\nTotals")?;
        writeln!(
            f,
            "  Income:        {} ({} transactions)",
            money(t.total_income),
            t.income_count
        )?;
        writeln!(
            f,
            "  Expenses:      {} ({} transactions)",
            money(t.total_expenses),
            t.expense_count
        )?;
        writeln!(f, "  Net:           {}", money(t.net))?;
        writeln!(f, "  Savings rate:  {}", format_percent(t.savings_rate))?;
        writeln!(f, "  Final balance: {}", money(self.result.final_balance))?;
        if t.expense_count > 0 {
            writeln!(
                f,
                "  Avg expense:   {} (largest {})",
                money(t.average_expense),
                money(t.largest_expense)
            )?;
        }

        if !self.summary.monthly.is_empty() {
            writeln!(f, "\nMonthly")?;
            for m in &self.summary.monthly {
                writeln!(
                    f,
                    "  {:<9} in {:>20}  out {:>20}  net {:>20}",
                    m.label,
                    money(m.income),
                    money(m.expenses),
                    money(m.net)
                )?;
            }
        }

        if !self.summary.categories.is_empty() {
            writeln!(f, "\nSpending by category")?;
            for c in &self.summary.categories {
                writeln!(
                    f,
                    "  {:<18} {:>20} {:>6}%  ({} transactions)",
                    c.name,
                    money(c.value),
                    c.percentage,
                    c.count
                )?;
            }
        }

        if !self.summary.insights.is_empty() {
            writeln!(f, "\nInsights")?;
            for i in &self.summary.insights {
                writeln!(f, "  {} {}: {}", severity_marker(i.severity), i.title, i.message)?;
            }
        }

        if let Some(cost) = &self.summary.cost {
            writeln!(f, "\nExtraction cost")?;
            writeln!(
                f,
                "  {} for {} tokens ({} in / {} out)",
                format_cost(cost.total_cost_usd),
                format_tokens(cost.total_tokens),
                format_tokens(cost.input_tokens),
                format_tokens(cost.output_tokens)
            )?;
            if cost.chunked {
                writeln!(
                    f,
                    "  {} chunks, ~{} tokens each",
                    cost.chunks_processed,
                    format_tokens(cost.average_tokens_per_chunk)
                )?;
            }
        }
        Ok(())
    }
}

pub fn render_summary(result: &AnalysisResult, summary: &Summary) -> String {
    SummaryView { result, summary }.to_string()
}

/// The largest income and expense lines, for the `analyze` output.
pub struct TopTransactions<'a>(pub &'a AnalysisResult);

impl fmt::Display for TopTransactions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        let currency = result.currency();
        for (title, txns) in [
            ("Largest income", &result.transactions.income),
            ("Largest expenses", &result.transactions.expenses),
        ] {
            if txns.is_empty() {
                continue;
            }
            let mut sorted: Vec<_> = txns.iter().collect();
            sorted.sort_by(|a, b| b.amount_or_zero().cmp(&a.amount_or_zero()));
            writeln!(f, "\n{title}")?;
            for t in sorted.into_iter().take(TOP_TRANSACTIONS) {
                writeln!(
                    f,
                    "  {:<10} {:<40} {:>20}",
                    t.date.as_deref().unwrap_or("-"),
                    t.description,
                    format_amount(t.amount_or_zero(), currency)
                )?;
            }
        }
        Ok(())
    }
}

pub fn render_top_transactions(result: &AnalysisResult) -> String {
    TopTransactions(result).to_string()
}

pub fn render_metadata(metadata: &ExtractionMetadata) -> String {
    let mut parts = Vec::new();
    if let Some(n) = metadata.income_count {
        parts.push(format!("{n} income"));
    }
    if let Some(n) = metadata.expense_count {
        parts.push(format!("{n} expenses"));
    }
    if let Some(c) = metadata.extraction_confidence {
        parts.push(format!("confidence {:.0}%", c * 100.0));
    }
    if parts.is_empty() {
        return String::new();
    }
    format!("Extraction: {}", parts.join(", "))
}

/// Error text plus any backend suggestions.
pub struct ErrorReport<'a>(pub &'a AnalysisError);

impl fmt::Display for ErrorReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err = self.0;
        write!(f, "{err}")?;
        if let AnalysisError::InvalidBankStatement {
            confidence,
            matched_keywords,
            ..
        } = err
        {
            if let Some(c) = confidence {
                write!(f, "\n  Confidence: {:.0}%", c * 100.0)?;
            }
            if !matched_keywords.is_empty() {
                write!(f, "\n  Matched keywords: {}", matched_keywords.join(", "))?;
            }
        }
        let suggestions = err.suggestions();
        if !suggestions.is_empty() {
            f.write_str("\nSuggestions:")?;
            for s in suggestions {
                write!(f, "\n  - {s}")?;
            }
        }
        Ok(())
    }
}

pub fn render_error(err: &AnalysisError) -> String {
    ErrorReport(err).to_string()
}
