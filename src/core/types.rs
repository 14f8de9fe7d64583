use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScanError;

/// A resolved ERC-20 token. Symbol is display-only and not unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Two tokens in the order the caller asked for them.
///
/// Unlike a pool's internal ordering this is never sorted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TokenPair {
    pub token_a: Address,
    pub token_b: Address,
}

impl TokenPair {
    pub fn new(token_a: Address, token_b: Address) -> Self {
        Self { token_a, token_b }
    }
}

/// Closed set of pool models. Selects the reserve reader strategy.
///
/// Written in snake_case; read through [`FromStr`], so aliases such as
/// `curve` or `v3` work in config files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum PoolModelKind {
    ConstantProduct,
    ConcentratedLiquidity,
    Stable,
    WeightedVault,
}

impl PoolModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolModelKind::ConstantProduct => "constant_product",
            PoolModelKind::ConcentratedLiquidity => "concentrated_liquidity",
            PoolModelKind::Stable => "stable",
            PoolModelKind::WeightedVault => "weighted_vault",
        }
    }
}

impl fmt::Display for PoolModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolModelKind {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant_product" | "v2" | "amm_v2" => Ok(PoolModelKind::ConstantProduct),
            "concentrated_liquidity" | "v3" | "amm_v3" => Ok(PoolModelKind::ConcentratedLiquidity),
            "stable" | "curve" => Ok(PoolModelKind::Stable),
            "weighted_vault" | "balancer" => Ok(PoolModelKind::WeightedVault),
            other => Err(ScanError::InvalidConfig(format!(
                "unknown pool model kind: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for PoolModelKind {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A venue: one DEX deployment and the authority that locates its pools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DexDescriptor {
    pub name: String,
    pub kind: PoolModelKind,
    /// Factory, registry or vault address.
    pub authority: Address,
    /// Concentrated-liquidity fee tiers to try, in order.
    #[serde(default)]
    pub fee_tiers: Vec<u32>,
    /// Candidate pool ids for vault-style venues.
    #[serde(default)]
    pub pool_ids: Vec<H256>,
}

impl DexDescriptor {
    pub fn new(name: impl Into<String>, kind: PoolModelKind, authority: Address) -> Self {
        Self {
            name: name.into(),
            kind,
            authority,
            fee_tiers: Vec::new(),
            pool_ids: Vec::new(),
        }
    }

    pub fn with_fee_tiers(mut self, fee_tiers: Vec<u32>) -> Self {
        self.fee_tiers = fee_tiers;
        self
    }

    pub fn with_pool_ids(mut self, pool_ids: Vec<H256>) -> Self {
        self.pool_ids = pool_ids;
        self
    }
}

/// A pool instance resolved for a pair on a venue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolRef {
    pub address: Address,
    pub dex: String,
    pub kind: PoolModelKind,
    /// Authority (factory, registry or vault) the pool was located through.
    pub authority: Address,
    pub pair: TokenPair,
    /// Vault pool id, when the venue addresses pools by id.
    pub pool_id: Option<H256>,
    /// Fee tier the pool was found under (concentrated liquidity only).
    pub fee_tier: Option<u32>,
}

impl PoolRef {
    pub fn new(address: Address, dex: &DexDescriptor, pair: TokenPair) -> Self {
        Self {
            address,
            dex: dex.name.clone(),
            kind: dex.kind,
            authority: dex.authority,
            pair,
            pool_id: None,
            fee_tier: None,
        }
    }
}

/// Raw reserves together with the pool's own token ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReserveSnapshot {
    pub token0: Address,
    pub token1: Address,
    #[serde(with = "crate::utils::biguint_string")]
    pub reserve0: BigUint,
    #[serde(with = "crate::utils::biguint_string")]
    pub reserve1: BigUint,
}

impl ReserveSnapshot {
    pub fn new(
        token0: Address,
        token1: Address,
        reserve0: impl Into<BigUint>,
        reserve1: impl Into<BigUint>,
    ) -> Self {
        Self {
            token0,
            token1,
            reserve0: reserve0.into(),
            reserve1: reserve1.into(),
        }
    }
}

/// A display price, or the marker that it cannot be computed (a zero reserve).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceValue {
    Defined(BigDecimal),
    Undefined,
}

impl PriceValue {
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            PriceValue::Defined(price) => Some(price),
            PriceValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, PriceValue::Defined(_))
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.as_decimal().and_then(|price| price.to_f64())
    }
}

impl fmt::Display for PriceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceValue::Defined(price) => write!(f, "{:.6}", price),
            PriceValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// Normalized prices for one (tokenA, tokenB, venue) combination, in caller order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceReport {
    pub venue: String,
    pub pool: Address,
    pub token_a: Token,
    pub token_b: Token,
    #[serde(with = "crate::utils::biguint_string")]
    pub raw_reserve_a: BigUint,
    #[serde(with = "crate::utils::biguint_string")]
    pub raw_reserve_b: BigUint,
    /// Human-scaled reserves (raw / 10^decimals).
    pub reserve_a: BigDecimal,
    pub reserve_b: BigDecimal,
    pub price_a_to_b: PriceValue,
    pub price_b_to_a: PriceValue,
    /// floor(rawB * 10^decA / (rawA * 10^decB)); `None` when rawA is zero.
    #[serde(with = "crate::utils::opt_biguint_string")]
    pub raw_ratio: Option<BigUint>,
    pub timestamp: DateTime<Utc>,
}

impl PriceReport {
    pub fn price_a_to_b(&self) -> Result<&BigDecimal, ScanError> {
        self.price_a_to_b
            .as_decimal()
            .ok_or_else(|| self.undefined("A->B"))
    }

    pub fn price_b_to_a(&self) -> Result<&BigDecimal, ScanError> {
        self.price_b_to_a
            .as_decimal()
            .ok_or_else(|| self.undefined("B->A"))
    }

    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.token_a.address, self.token_b.address)
    }

    fn undefined(&self, direction: &str) -> ScanError {
        ScanError::UndefinedPrice(format!(
            "{}/{} {} on {}: zero reserve",
            self.token_a.symbol, self.token_b.symbol, direction, self.venue
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutcomeTag {
    Found,
    NotFound,
    Error,
}

/// Result of one (pair, venue) combination.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Found(PriceReport),
    NotFound {
        pair: TokenPair,
        venue: String,
    },
    Error {
        pair: TokenPair,
        venue: String,
        error: ScanError,
    },
}

impl ScanOutcome {
    pub fn tag(&self) -> OutcomeTag {
        match self {
            ScanOutcome::Found(_) => OutcomeTag::Found,
            ScanOutcome::NotFound { .. } => OutcomeTag::NotFound,
            ScanOutcome::Error { .. } => OutcomeTag::Error,
        }
    }

    pub fn pair(&self) -> TokenPair {
        match self {
            ScanOutcome::Found(report) => report.pair(),
            ScanOutcome::NotFound { pair, .. } | ScanOutcome::Error { pair, .. } => *pair,
        }
    }

    pub fn venue(&self) -> &str {
        match self {
            ScanOutcome::Found(report) => &report.venue,
            ScanOutcome::NotFound { venue, .. } | ScanOutcome::Error { venue, .. } => venue,
        }
    }

    pub fn as_found(&self) -> Option<&PriceReport> {
        match self {
            ScanOutcome::Found(report) => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ScanError> {
        match self {
            ScanOutcome::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Everything one scan produced. Discarded after reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// One entry per (pair, venue), pairs outer and venues inner.
    pub outcomes: Vec<ScanOutcome>,
    /// Tokens resolved during the scan, in first-seen order.
    pub tokens: Vec<Token>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn token(&self, address: &Address) -> Option<&Token> {
        self.tokens.iter().find(|token| token.address == *address)
    }

    /// Symbol for display, falling back to the address.
    pub fn symbol(&self, address: &Address) -> String {
        self.token(address)
            .map(|token| token.symbol.clone())
            .unwrap_or_else(|| format!("{:?}", address))
    }

    pub fn found(&self) -> impl Iterator<Item = &PriceReport> {
        self.outcomes.iter().filter_map(ScanOutcome::as_found)
    }

    pub fn count(&self, tag: OutcomeTag) -> usize {
        self.outcomes.iter().filter(|o| o.tag() == tag).count()
    }
}
