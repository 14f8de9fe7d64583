use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;
use std::collections::HashMap;
use tabled::Tabled;

use crate::core::types::{PriceReport, ScanReport, TokenPair};
use crate::utils::calculate_percentage_difference;

fn display_price(price: &BigDecimal) -> String {
    format!("{:.6}", price)
}

fn display_percentage(percentage: &f64) -> String {
    format!("{:.4}", percentage)
}

/// The same pair priced differently on two venues.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ArbitrageOpportunity {
    #[tabled(rename = "Pair")]
    pub pair_label: String,
    #[tabled(skip)]
    pub pair: TokenPair,
    #[tabled(rename = "Buy on")]
    pub buy_venue: String,
    #[tabled(rename = "Sell on")]
    pub sell_venue: String,
    #[tabled(rename = "Buy price", display_with = "display_price")]
    pub buy_price: BigDecimal,
    #[tabled(rename = "Sell price", display_with = "display_price")]
    pub sell_price: BigDecimal,
    #[tabled(rename = "Spread %", display_with = "display_percentage")]
    pub spread_percentage: f64,
    /// Token A held by the shallower of the two pools
    #[tabled(rename = "Depth", display_with = "display_price")]
    pub liquidity: BigDecimal,
    #[tabled(skip)]
    pub buy_pool: Address,
    #[tabled(skip)]
    pub sell_pool: Address,
    #[tabled(skip)]
    pub timestamp: DateTime<Utc>,
}

/// Compare `price(A→B)` across every venue that priced a pair.
///
/// Buying A is cheapest where A→B is lowest and selling is best where it is
/// highest. Pairs priced on fewer than two venues, and reports whose price is
/// undefined, are skipped. Results at or above `min_profit_pct` come back
/// sorted by spread, widest first.
pub fn find_opportunities(report: &ScanReport, min_profit_pct: f64) -> Vec<ArbitrageOpportunity> {
    // Keep first-seen pair order so equal spreads sort deterministically
    let mut order: Vec<TokenPair> = Vec::new();
    let mut by_pair: HashMap<TokenPair, Vec<(&PriceReport, &BigDecimal)>> = HashMap::new();

    for price_report in report.found() {
        let price = match price_report.price_a_to_b() {
            Ok(price) => price,
            Err(_) => continue,
        };
        let pair = price_report.pair();
        if !by_pair.contains_key(&pair) {
            order.push(pair);
        }
        by_pair.entry(pair).or_default().push((price_report, price));
    }

    let mut opportunities = Vec::new();
    for pair in order {
        let quotes = match by_pair.get(&pair) {
            Some(quotes) if quotes.len() >= 2 => quotes,
            _ => continue,
        };

        let mut cheapest = &quotes[0];
        let mut dearest = &quotes[0];
        for quote in quotes {
            if quote.1 < cheapest.1 {
                cheapest = quote;
            }
            if quote.1 > dearest.1 {
                dearest = quote;
            }
        }

        let spread = calculate_percentage_difference(cheapest.1, dearest.1);
        if spread <= 0.0 || spread < min_profit_pct {
            continue;
        }

        let (buy, sell) = (cheapest.0, dearest.0);
        let liquidity = if buy.reserve_a < sell.reserve_a {
            buy.reserve_a.clone()
        } else {
            sell.reserve_a.clone()
        };

        opportunities.push(ArbitrageOpportunity {
            pair_label: format!("{}/{}", buy.token_a.symbol, buy.token_b.symbol),
            pair,
            buy_venue: buy.venue.clone(),
            sell_venue: sell.venue.clone(),
            buy_price: cheapest.1.clone(),
            sell_price: dearest.1.clone(),
            spread_percentage: spread,
            liquidity,
            buy_pool: buy.pool,
            sell_pool: sell.pool,
            timestamp: report.finished_at,
        });
    }

    opportunities.sort_by(|a, b| {
        b.spread_percentage
            .partial_cmp(&a.spread_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    opportunities
}
