use anyhow::Result;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::core::types::{DexDescriptor, PoolModelKind, Token, TokenPair};
use crate::error::ScanError;
use crate::utils::{is_valid_ethereum_address, parse_address, short_address};

// Venue keys used by the built-in configuration
pub mod dex_types {
    pub const UNISWAP_V2: &str = "uniswap_v2";
    pub const UNISWAP_V3: &str = "uniswap_v3";
    pub const SUSHISWAP: &str = "sushiswap";
    pub const CURVE: &str = "curve";
    pub const BALANCER: &str = "balancer";
}

/// Prefix for environment overrides, e.g. `SCANNER__SCAN__TIMEOUT_MS=3000`.
pub const ENV_PREFIX: &str = "SCANNER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc_url: String,
    /// Block every read is pinned to; latest when unset.
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Pin to the chain head once per scan when no block is given.
    pub pin_latest_block: bool,
    pub scan: ScanConfig,
    pub arbitrage: ArbitrageConfig,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    /// Pairs as symbols or addresses. Empty means every combination of `tokens`.
    #[serde(default)]
    pub pairs: Vec<(String, String)>,
    pub dex_configs: BTreeMap<String, DexConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub max_concurrent_requests: usize,
    pub timeout_ms: u64,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum spread, in percent, worth reporting
    pub min_profit_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: String,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexConfig {
    pub name: String,
    pub enabled: bool,
    pub kind: PoolModelKind,
    /// Factory, registry or vault address
    pub authority: String,
    #[serde(default)]
    pub fee_tiers: Vec<u32>,
    #[serde(default)]
    pub pool_ids: Vec<String>,
}

impl DexConfig {
    fn new(name: &str, kind: PoolModelKind, authority: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            kind,
            authority: authority.to_string(),
            fee_tiers: Vec::new(),
            pool_ids: Vec::new(),
        }
    }
}

impl TokenConfig {
    fn known(address: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            address: address.to_string(),
            symbol: Some(symbol.to_string()),
            decimals: Some(decimals),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut dex_configs = BTreeMap::new();

        dex_configs.insert(
            dex_types::UNISWAP_V2.to_string(),
            DexConfig::new(
                "Uniswap V2",
                PoolModelKind::ConstantProduct,
                "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f",
            ),
        );
        dex_configs.insert(
            dex_types::SUSHISWAP.to_string(),
            DexConfig::new(
                "SushiSwap",
                PoolModelKind::ConstantProduct,
                "0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac",
            ),
        );

        let mut uniswap_v3 = DexConfig::new(
            "Uniswap V3",
            PoolModelKind::ConcentratedLiquidity,
            "0x1F98431c8aD98523631AE4a59f267346ea31F984",
        );
        uniswap_v3.fee_tiers = vec![500, 3000, 10000];
        dex_configs.insert(dex_types::UNISWAP_V3.to_string(), uniswap_v3);

        // Main registry
        dex_configs.insert(
            dex_types::CURVE.to_string(),
            DexConfig::new(
                "Curve",
                PoolModelKind::Stable,
                "0x90E00ACe148ca3b23Ac1bC8C240C2a7Dd9c2d7f5",
            ),
        );

        let mut balancer = DexConfig::new(
            "Balancer",
            PoolModelKind::WeightedVault,
            "0xBA12222222228d8Ba445958a75a0704d566BF2C8",
        );
        // 50/50 USDC/WETH
        balancer.pool_ids =
            vec!["0x96646936b91d6b9d7d0c47c496afbf3d6ec7b6f8000200000000000000000019".to_string()];
        dex_configs.insert(dex_types::BALANCER.to_string(), balancer);

        Config {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            block_number: None,
            pin_latest_block: true,
            scan: ScanConfig {
                max_concurrent_requests: 10,
                timeout_ms: 10_000,
                interval_seconds: 12,
            },
            arbitrage: ArbitrageConfig {
                min_profit_threshold: 0.1,
            },
            tokens: vec![
                TokenConfig::known("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "WETH", 18),
                TokenConfig::known("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USDC", 6),
                TokenConfig::known("0xdAC17F958D2ee523a2206206994597C13D831ec7", "USDT", 6),
                TokenConfig::known("0x6B175474E89094C44Da98b954EedeAC495271d0F", "DAI", 18),
            ],
            pairs: Vec::new(),
            dex_configs,
        }
    }
}

fn invalid(message: String) -> ScanError {
    ScanError::InvalidConfig(message)
}

impl Config {
    /// Built-in defaults, then the optional file, then `SCANNER__*` variables.
    /// `RPC_URL` wins over everything for the endpoint.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }

        let mut loaded: Config = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        if let Ok(rpc_url) = std::env::var("RPC_URL") {
            loaded.rpc_url = rpc_url;
        }

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        url::Url::parse(&self.rpc_url)
            .map_err(|e| invalid(format!("rpc_url {}: {}", self.rpc_url, e)))?;

        if self.scan.max_concurrent_requests == 0 {
            return Err(invalid("scan.max_concurrent_requests must be at least 1".into()));
        }
        if self.scan.timeout_ms == 0 {
            return Err(invalid("scan.timeout_ms must be positive".into()));
        }

        for token in &self.tokens {
            if !is_valid_ethereum_address(&token.address) {
                return Err(invalid(format!("token address {}", token.address)));
            }
        }

        self.venues()?;
        self.pairs()?;
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.timeout_ms)
    }

    /// Enabled venues, in key order.
    pub fn venues(&self) -> Result<Vec<DexDescriptor>, ScanError> {
        self.dex_configs
            .iter()
            .filter(|(_, dex)| dex.enabled)
            .map(|(key, dex)| {
                let authority = parse_address(&dex.authority)
                    .map_err(|e| invalid(format!("dex_configs.{}: {}", key, e)))?;
                let pool_ids = dex
                    .pool_ids
                    .iter()
                    .map(|id| {
                        H256::from_str(id).map_err(|e| {
                            invalid(format!("dex_configs.{} pool id {}: {}", key, id, e))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(DexDescriptor::new(dex.name.clone(), dex.kind, authority)
                    .with_fee_tiers(dex.fee_tiers.clone())
                    .with_pool_ids(pool_ids))
            })
            .collect()
    }

    /// A token by configured symbol (case-insensitive) or by address.
    pub fn token_address(&self, key: &str) -> Result<Address, ScanError> {
        let configured = self.tokens.iter().find(|token| {
            token
                .symbol
                .as_deref()
                .map_or(false, |symbol| symbol.eq_ignore_ascii_case(key))
        });

        let address = match configured {
            Some(token) => parse_address(&token.address),
            None => parse_address(key),
        };
        address.map_err(|_| invalid(format!("unknown token {}", key)))
    }

    /// Pairs to scan, in configured order.
    pub fn pairs(&self) -> Result<Vec<TokenPair>, ScanError> {
        let pairs: Vec<TokenPair> = if self.pairs.is_empty() {
            let addresses = self
                .tokens
                .iter()
                .map(|token| parse_address(&token.address).map_err(|e| invalid(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;

            let mut pairs = Vec::new();
            for i in 0..addresses.len() {
                for j in (i + 1)..addresses.len() {
                    pairs.push(TokenPair::new(addresses[i], addresses[j]));
                }
            }
            pairs
        } else {
            self.pairs
                .iter()
                .map(|(a, b)| Ok(TokenPair::new(self.token_address(a)?, self.token_address(b)?)))
                .collect::<Result<Vec<_>, ScanError>>()?
        };

        if let Some(pair) = pairs.iter().find(|pair| pair.token_a == pair.token_b) {
            return Err(invalid(format!("pair of {:?} with itself", pair.token_a)));
        }
        Ok(pairs)
    }

    /// Tokens with declared decimals. They seed the resolver and skip the network.
    pub fn known_tokens(&self) -> Vec<Token> {
        self.tokens
            .iter()
            .filter_map(|token| {
                let address = parse_address(&token.address).ok()?;
                let decimals = token.decimals?;
                let symbol = token
                    .symbol
                    .clone()
                    .unwrap_or_else(|| short_address(&address));
                Some(Token::new(address, symbol, decimals))
            })
            .collect()
    }
}
