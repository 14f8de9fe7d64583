use tabled::{settings::Style, Table, Tabled};

use crate::core::types::{ScanOutcome, ScanReport};
use crate::opportunity::ArbitrageOpportunity;
use crate::price_calculator::PriceCalculator;

/// One rendered line of a scan report.
#[derive(Clone, Debug, Tabled)]
pub struct OutcomeRow {
    #[tabled(rename = "#")]
    pub rank: usize,
    #[tabled(rename = "Pair")]
    pub pair: String,
    #[tabled(rename = "Venue")]
    pub venue: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Price A→B")]
    pub price_a_to_b: String,
    #[tabled(rename = "Price B→A")]
    pub price_b_to_a: String,
    #[tabled(rename = "Reserve A")]
    pub reserve_a: String,
    #[tabled(rename = "Reserve B")]
    pub reserve_b: String,
    #[tabled(rename = "Raw ratio")]
    pub raw_ratio: String,
    #[tabled(rename = "Pool / error")]
    pub detail: String,
}

impl OutcomeRow {
    pub fn from_outcome(rank: usize, outcome: &ScanOutcome, report: &ScanReport) -> Self {
        let pair = outcome.pair();
        let mut row = OutcomeRow {
            rank,
            pair: format!("{}/{}", report.symbol(&pair.token_a), report.symbol(&pair.token_b)),
            venue: outcome.venue().to_string(),
            status: String::new(),
            price_a_to_b: "-".to_string(),
            price_b_to_a: "-".to_string(),
            reserve_a: "-".to_string(),
            reserve_b: "-".to_string(),
            raw_ratio: "-".to_string(),
            detail: String::new(),
        };

        match outcome {
            ScanOutcome::Found(price) => {
                row.status = "found".to_string();
                row.price_a_to_b = PriceCalculator::format_price(&price.price_a_to_b);
                row.price_b_to_a = PriceCalculator::format_price(&price.price_b_to_a);
                row.reserve_a = format!("{:.4}", price.reserve_a);
                row.reserve_b = format!("{:.4}", price.reserve_b);
                row.raw_ratio = price
                    .raw_ratio
                    .as_ref()
                    .map(|ratio| ratio.to_string())
                    .unwrap_or_else(|| "undefined".to_string());
                row.detail = format!("{:?}", price.pool);
            }
            ScanOutcome::NotFound { .. } => {
                row.status = "not found".to_string();
            }
            ScanOutcome::Error { error, .. } => {
                row.status = format!("{:?}", error.kind());
                row.detail = error.to_string();
            }
        }
        row
    }
}

pub fn outcome_rows(report: &ScanReport) -> Vec<OutcomeRow> {
    report
        .outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| OutcomeRow::from_outcome(index + 1, outcome, report))
        .collect()
}

pub fn render_report(report: &ScanReport) -> String {
    Table::new(outcome_rows(report)).with(Style::rounded()).to_string()
}

pub fn render_opportunities(opportunities: &[ArbitrageOpportunity]) -> String {
    Table::new(opportunities).with(Style::rounded()).to_string()
}

/// Print the scan table, then any opportunities.
pub fn display_report(report: &ScanReport, opportunities: &[ArbitrageOpportunity]) {
    println!(
        "\nScan {} ({} combinations)",
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.outcomes.len()
    );
    println!("{}", render_report(report));

    if opportunities.is_empty() {
        println!("No cross-venue spreads above threshold.");
    } else {
        println!("\nCross-venue opportunities:");
        println!("{}", render_opportunities(opportunities));
    }
    println!();
}
