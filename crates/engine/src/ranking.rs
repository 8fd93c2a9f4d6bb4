//! Opportunity ranking and display formatting.

use arbitrage_core::Opportunity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Order opportunities for display: profitable-after-fees first, then by
/// net profit, highest first.
///
/// The sort is stable, so entries that tie on both keys keep detection order.
pub fn rank(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(compare);
}

/// Owned variant of [`rank`].
pub fn ranked(mut opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
    rank(&mut opportunities);
    opportunities
}

fn compare(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.is_profitable_after_fees
        .cmp(&a.is_profitable_after_fees)
        .then_with(|| b.net_profit.total_cmp(&a.net_profit))
}

/// Aggregate view of one cycle's ranked list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RankingSummary {
    pub count: usize,
    pub profitable_count: usize,
    pub best_net_profit: Option<f64>,
    /// Route of the best entry, e.g. "bitflyer → coincheck".
    pub best_route: Option<String>,
}

/// Summarize a list that has already been ranked.
pub fn summarize(opportunities: &[Opportunity]) -> RankingSummary {
    let best = opportunities.first();
    RankingSummary {
        count: opportunities.len(),
        profitable_count: opportunities
            .iter()
            .filter(|o| o.is_profitable_after_fees)
            .count(),
        best_net_profit: best.map(|o| o.net_profit),
        best_route: best.map(Opportunity::route_label),
    }
}

/// Format a JPY amount rounded to whole yen: `¥98,000`, `-¥1,234`.
pub fn format_jpy(amount: f64) -> String {
    if !amount.is_finite() {
        return "¥-".to_string();
    }
    let rounded = amount.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}¥{}", group_thousands(rounded.abs() as u64))
}

/// Format a percentage with three decimals: `1.960%`.
pub fn format_pct(pct: f64) -> String {
    format!("{pct:.3}%")
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
