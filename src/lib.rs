//! DEX price scanner
//!
//! Resolves token metadata, locates pools for token pairs across several DEX
//! venues, reads their reserves and normalizes them into prices in the
//! caller's requested order. One scan covers every (pair, venue) combination
//! and never aborts because a single combination failed.

pub mod chain;
pub mod cli;
pub mod config;
pub mod core;
pub mod dex;
pub mod error;
pub mod opportunity;
pub mod price_calculator;
pub mod scanner;
pub mod table_display;
pub mod token;
pub mod utils;

// Re-export commonly used types
pub use crate::chain::{ChainReader, ContractCaller, EthersChainReader};
pub use crate::config::Config;
pub use crate::core::types::{
    DexDescriptor, OutcomeTag, PoolModelKind, PoolRef, PriceReport, PriceValue, ReserveSnapshot,
    ScanOutcome, ScanReport, Token, TokenPair,
};
pub use crate::dex::{PoolSource, SourceRegistry};
pub use crate::error::{ErrorKind, ScanError};
pub use crate::opportunity::{find_opportunities, ArbitrageOpportunity};
pub use crate::price_calculator::PriceCalculator;
pub use crate::scanner::Scanner;
pub use crate::token::{Erc20MetadataSource, TokenMetadata, TokenMetadataSource, TokenResolver};
