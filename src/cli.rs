use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use ethers::providers::{Http, Middleware, Provider};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::chain::{ContractCaller, EthersChainReader};
use crate::config::Config;
use crate::core::types::ScanReport;
use crate::dex::SourceRegistry;
use crate::opportunity::{find_opportunities, ArbitrageOpportunity};
use crate::scanner::Scanner;
use crate::table_display::display_report;
use crate::token::Erc20MetadataSource;

// Argument ids
const CONFIG_ARG: &str = "config";
const JSON_ARG: &str = "json";
const WATCH_ARG: &str = "watch";
const INTERVAL_ARG: &str = "interval";
const MIN_PROFIT_ARG: &str = "min-profit";

/// What the user asked for on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config_path: Option<String>,
    pub json: bool,
    pub watch: bool,
    pub interval_seconds: Option<u64>,
    pub min_profit: Option<f64>,
}

impl CliOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches.get_one::<String>(CONFIG_ARG).cloned(),
            json: matches.get_flag(JSON_ARG),
            watch: matches.get_flag(WATCH_ARG),
            interval_seconds: matches.get_one::<u64>(INTERVAL_ARG).copied(),
            min_profit: matches.get_one::<f64>(MIN_PROFIT_ARG).copied(),
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("dex-price-scanner")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Cross-venue DEX pool price and liquidity scanner")
        .arg(
            Arg::new(CONFIG_ARG)
                .long(CONFIG_ARG)
                .short('c')
                .help("Configuration file (TOML, JSON or YAML)")
                .value_name("PATH"),
        )
        .arg(
            Arg::new(JSON_ARG)
                .long(JSON_ARG)
                .help("Print the report as JSON instead of tables")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(WATCH_ARG)
                .long(WATCH_ARG)
                .short('w')
                .help("Keep scanning on an interval")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(INTERVAL_ARG)
                .long(INTERVAL_ARG)
                .short('i')
                .help("Seconds between scans in watch mode")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .requires(WATCH_ARG),
        )
        .arg(
            Arg::new(MIN_PROFIT_ARG)
                .long(MIN_PROFIT_ARG)
                .help("Minimum cross-venue spread to report, in percent")
                .value_name("PCT")
                .value_parser(clap::value_parser!(f64)),
        )
}

pub struct CliApp {
    config: Config,
    options: CliOptions,
    client: Arc<Provider<Http>>,
}

impl CliApp {
    pub fn new(options: CliOptions) -> Result<Self> {
        let config = Config::load(options.config_path.as_deref())?;
        info!(
            "configuration loaded: {} tokens, {} venues",
            config.tokens.len(),
            config.dex_configs.values().filter(|dex| dex.enabled).count()
        );

        let client = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("invalid RPC endpoint {}", config.rpc_url))?;

        Ok(Self {
            config,
            options,
            client: Arc::new(client),
        })
    }

    pub async fn run(&self) -> Result<()> {
        if !self.options.watch {
            return self.scan_once().await;
        }

        let seconds = self
            .options
            .interval_seconds
            .unwrap_or(self.config.scan.interval_seconds);
        info!("watching every {}s", seconds);
        let mut interval = time::interval(Duration::from_secs(seconds));

        loop {
            interval.tick().await;
            // A failed scan setup is reported and the next tick tries again
            if let Err(e) = self.scan_once().await {
                error!("scan failed: {:#}", e);
            }
        }
    }

    async fn scan_once(&self) -> Result<()> {
        let pairs = self.config.pairs()?;
        let venues = self.config.venues()?;
        let scanner = self.scanner().await?;

        let report = scanner.scan(&pairs, &venues).await;
        let min_profit = self
            .options
            .min_profit
            .unwrap_or(self.config.arbitrage.min_profit_threshold);
        let opportunities = find_opportunities(&report, min_profit);

        if self.options.json {
            println!("{}", render_json(&report, &opportunities)?);
        } else {
            display_report(&report, &opportunities);
        }
        Ok(())
    }

    /// A scanner whose reads all see one block.
    async fn scanner(&self) -> Result<Scanner> {
        let block = match self.config.block_number {
            Some(block) => Some(block),
            None if self.config.pin_latest_block => Some(
                self.client
                    .get_block_number()
                    .await
                    .context("failed to fetch the latest block")?
                    .as_u64(),
            ),
            None => None,
        };

        let mut reader = EthersChainReader::new(self.client.clone());
        if let Some(block) = block {
            info!("reading state at block {}", block);
            reader = reader.at_block(block);
        }

        let caller = ContractCaller::new(Arc::new(reader), self.config.scan_timeout());
        Ok(Scanner::new(
            SourceRegistry::on_chain(caller.clone()),
            Arc::new(Erc20MetadataSource::new(caller)),
        )
        .with_known_tokens(self.config.known_tokens())
        .with_max_concurrency(self.config.scan.max_concurrent_requests)
        .with_stage_timeout(self.config.scan_timeout() * 4))
    }
}

pub fn render_json(report: &ScanReport, opportunities: &[ArbitrageOpportunity]) -> Result<String> {
    let json = serde_json::json!({
        "report": report,
        "opportunities": opportunities,
    });
    Ok(serde_json::to_string_pretty(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let matches = build_cli().try_get_matches_from(["dex-price-scanner"]).unwrap();
        let options = CliOptions::from_matches(&matches);
        assert_eq!(
            options,
            CliOptions {
                config_path: None,
                json: false,
                watch: false,
                interval_seconds: None,
                min_profit: None,
            }
        );
    }

    #[test]
    fn test_all_flags() {
        let matches = build_cli()
            .try_get_matches_from([
                "dex-price-scanner",
                "--config",
                "scanner.toml",
                "--json",
                "--watch",
                "--interval",
                "30",
                "--min-profit",
                "0.25",
            ])
            .unwrap();
        let options = CliOptions::from_matches(&matches);
        assert_eq!(options.config_path.as_deref(), Some("scanner.toml"));
        assert!(options.json && options.watch);
        assert_eq!(options.interval_seconds, Some(30));
        assert_eq!(options.min_profit, Some(0.25));
    }

    #[test]
    fn test_interval_needs_watch() {
        assert!(build_cli()
            .try_get_matches_from(["dex-price-scanner", "--interval", "5"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["dex-price-scanner", "--watch", "--interval", "0"])
            .is_err());
    }

    #[test]
    fn test_render_json_shape() {
        let report = ScanReport {
            outcomes: Vec::new(),
            tokens: Vec::new(),
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&render_json(&report, &[]).unwrap()).unwrap();
        assert!(json["report"]["outcomes"].as_array().unwrap().is_empty());
        assert!(json["opportunities"].as_array().unwrap().is_empty());
    }
}
