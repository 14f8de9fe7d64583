use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token as AbiToken};
use ethers::types::Address;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

use crate::chain::ContractCaller;
use crate::core::types::Token;
use crate::dex::abi::ERC20;
use crate::dex::{function, uint_at};
use crate::error::ScanError;
use crate::utils::short_address;

/// Decimal precision and display symbol of a token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub decimals: u8,
    pub symbol: String,
}

/// Where token metadata comes from
#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn fetch(&self, token: Address) -> Result<TokenMetadata, ScanError>;
}

/// Reads `decimals()` and `symbol()` from the token contract.
pub struct Erc20MetadataSource {
    caller: ContractCaller,
}

impl Erc20MetadataSource {
    pub fn new(caller: ContractCaller) -> Self {
        Self { caller }
    }

    async fn decimals(&self, token: Address) -> Result<u8, ScanError> {
        let decimals_fn = function(&ERC20, "decimals").map_err(ScanError::MetadataUnavailable)?;
        let output = self
            .caller
            .call(token, decimals_fn, &[])
            .await
            .map_err(|e| e.into_scan_error(ScanError::MetadataUnavailable))?;
        let decimals = uint_at(&output, 0, "decimals").map_err(ScanError::MetadataUnavailable)?;

        if decimals > u8::MAX.into() {
            return Err(ScanError::MetadataUnavailable(format!(
                "{:?} reports {} decimals",
                token, decimals
            )));
        }
        Ok(decimals.as_u32() as u8)
    }

    /// Symbol is display-only: anything that goes wrong falls back to the short address.
    async fn symbol(&self, token: Address) -> String {
        let data = match function(&ERC20, "symbol").and_then(|f| {
            f.encode_input(&[]).map_err(|e| e.to_string())
        }) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("cannot encode symbol() call: {}", e);
                return short_address(&token);
            }
        };

        match self.caller.call_raw(token, data, "symbol").await {
            Ok(raw) => decode_symbol(&raw).unwrap_or_else(|| short_address(&token)),
            Err(e) => {
                log::debug!("symbol() failed for {:?}: {}", token, e);
                short_address(&token)
            }
        }
    }
}

/// Decode a `symbol()` return value, accepting both `string` and legacy `bytes32`.
pub fn decode_symbol(raw: &[u8]) -> Option<String> {
    if let Ok(mut tokens) = abi::decode(&[ParamType::String], raw) {
        if let Some(AbiToken::String(symbol)) = tokens.pop() {
            if !symbol.is_empty() {
                return Some(symbol);
            }
        }
    }

    let bytes = abi::decode(&[ParamType::FixedBytes(32)], raw)
        .ok()?
        .pop()?
        .into_fixed_bytes()?;
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let symbol = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

#[async_trait]
impl TokenMetadataSource for Erc20MetadataSource {
    async fn fetch(&self, token: Address) -> Result<TokenMetadata, ScanError> {
        let (decimals, symbol) = tokio::join!(self.decimals(token), self.symbol(token));
        Ok(TokenMetadata {
            decimals: decimals?,
            symbol,
        })
    }
}

type Entry = Arc<OnceCell<Result<Token, ScanError>>>;

#[derive(Default)]
struct Entries {
    cells: HashMap<Address, Entry>,
    order: Vec<Address>,
}

/// Per-scan token metadata cache.
///
/// Each token is fetched at most once per resolver: concurrent callers for
/// the same token share one in-flight request, and the outcome (failures
/// included) is kept until the resolver is dropped.
pub struct TokenResolver {
    source: Arc<dyn TokenMetadataSource>,
    entries: Mutex<Entries>,
}

impl TokenResolver {
    pub fn new(source: Arc<dyn TokenMetadataSource>) -> Self {
        Self {
            source,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Seed tokens whose metadata is already known; they never hit the source.
    pub fn with_known(self, tokens: impl IntoIterator<Item = Token>) -> Self {
        {
            let mut entries = self.lock();
            for token in tokens {
                if !entries.cells.contains_key(&token.address) {
                    entries.order.push(token.address);
                }
                entries
                    .cells
                    .insert(token.address, Arc::new(OnceCell::new_with(Some(Ok(token)))));
            }
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry(&self, token: Address) -> Entry {
        let mut entries = self.lock();
        if let Some(cell) = entries.cells.get(&token) {
            return cell.clone();
        }
        let cell: Entry = Arc::new(OnceCell::new());
        entries.cells.insert(token, cell.clone());
        entries.order.push(token);
        cell
    }

    pub async fn resolve(&self, token: Address) -> Result<Token, ScanError> {
        let cell = self.entry(token);
        cell.get_or_init(|| async {
            match self.source.fetch(token).await {
                Ok(metadata) => {
                    log::debug!(
                        "resolved {:?} as {} ({} decimals)",
                        token,
                        metadata.symbol,
                        metadata.decimals
                    );
                    Ok(Token::new(token, metadata.symbol, metadata.decimals))
                }
                Err(e) => {
                    log::warn!("metadata for {:?} unavailable: {}", token, e);
                    Err(e)
                }
            }
        })
        .await
        .clone()
    }

    /// Resolve a batch concurrently, returning results in input order.
    pub async fn resolve_all(&self, tokens: &[Address]) -> Vec<Result<Token, ScanError>> {
        join_all(tokens.iter().map(|token| self.resolve(*token))).await
    }

    /// Successfully resolved tokens, in first-requested order.
    pub fn resolved(&self) -> Vec<Token> {
        let entries = self.lock();
        entries
            .order
            .iter()
            .filter_map(|address| entries.cells.get(address))
            .filter_map(|cell| cell.get().and_then(|result| result.as_ref().ok()).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::stub::StubChain;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    /// Slow in-memory source that counts fetches.
    struct CountingSource {
        fetches: AtomicUsize,
        known: HashMap<Address, TokenMetadata>,
    }

    impl CountingSource {
        fn new(known: Vec<(Address, &str, u8)>) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                known: known
                    .into_iter()
                    .map(|(a, s, d)| (a, TokenMetadata { decimals: d, symbol: s.to_string() }))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl TokenMetadataSource for CountingSource {
        async fn fetch(&self, token: Address) -> Result<TokenMetadata, ScanError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.known
                .get(&token)
                .cloned()
                .ok_or_else(|| {
                    ScanError::MetadataUnavailable(format!("{:?} is not a token", token))
                })
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolution_is_single_flight() {
        let source = Arc::new(CountingSource::new(vec![(addr(1), "WETH", 18)]));
        let resolver = TokenResolver::new(source.clone());

        let results = resolver.resolve_all(&[addr(1); 16]).await;
        assert!(results.iter().all(|r| r.as_ref().unwrap().symbol == "WETH"));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_cached_for_the_scan() {
        let source = Arc::new(CountingSource::new(vec![]));
        let resolver = TokenResolver::new(source.clone());

        let first = resolver.resolve(addr(9)).await.unwrap_err();
        let second = resolver.resolve(addr(9)).await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.kind(), crate::error::ErrorKind::MetadataUnavailable);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(resolver.resolved().is_empty());
    }

    #[test]
    fn test_known_tokens_skip_the_source() {
        let source = Arc::new(CountingSource::new(vec![(addr(2), "USDC", 6)]));
        let resolver = TokenResolver::new(source.clone())
            .with_known(vec![Token::new(addr(1), "WETH", 18)]);

        let weth = tokio_test::block_on(resolver.resolve(addr(1))).unwrap();
        let usdc = tokio_test::block_on(resolver.resolve(addr(2))).unwrap();
        assert_eq!(weth.decimals, 18);
        assert_eq!(usdc.decimals, 6);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let order: Vec<String> = resolver.resolved().into_iter().map(|t| t.symbol).collect();
        assert_eq!(order, vec!["WETH", "USDC"]);
    }

    #[tokio::test]
    async fn test_fresh_resolver_refetches() {
        let source = Arc::new(CountingSource::new(vec![(addr(1), "WETH", 18)]));
        TokenResolver::new(source.clone()).resolve(addr(1)).await.unwrap();
        TokenResolver::new(source.clone()).resolve(addr(1)).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    fn erc20(chain: Arc<StubChain>) -> Erc20MetadataSource {
        Erc20MetadataSource::new(ContractCaller::new(chain, Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_erc20_string_symbol() {
        let chain = Arc::new(StubChain::new());
        chain.respond(addr(1), ERC20.function("decimals").unwrap(), &[], &[AbiToken::Uint(U256::from(6u8))]);
        chain.respond(addr(1), ERC20.function("symbol").unwrap(), &[], &[AbiToken::String("USDC".into())]);

        let metadata = erc20(chain).fetch(addr(1)).await.unwrap();
        assert_eq!(metadata, TokenMetadata { decimals: 6, symbol: "USDC".into() });
    }

    #[tokio::test]
    async fn test_erc20_bytes32_symbol_and_fallback() {
        let chain = Arc::new(StubChain::new());
        let mut mkr = b"MKR".to_vec();
        mkr.resize(32, 0);
        chain.respond(addr(1), ERC20.function("decimals").unwrap(), &[], &[AbiToken::Uint(U256::from(18u8))]);
        chain.respond(addr(1), ERC20.function("symbol").unwrap(), &[], &[AbiToken::FixedBytes(mkr)]);
        chain.respond(addr(2), ERC20.function("decimals").unwrap(), &[], &[AbiToken::Uint(U256::from(18u8))]);
        let source = erc20(chain);

        assert_eq!(source.fetch(addr(1)).await.unwrap().symbol, "MKR");
        assert_eq!(source.fetch(addr(2)).await.unwrap().symbol, short_address(&addr(2)));
    }

    #[tokio::test]
    async fn test_erc20_decimals_failures() {
        let chain = Arc::new(StubChain::new());
        chain.respond(addr(3), ERC20.function("decimals").unwrap(), &[], &[AbiToken::Uint(U256::from(300u32))]);
        let source = erc20(chain);

        // No decimals() at all: not a conforming token
        assert!(matches!(source.fetch(addr(1)).await, Err(ScanError::MetadataUnavailable(_))));
        assert!(matches!(source.fetch(addr(3)).await, Err(ScanError::MetadataUnavailable(_))));
    }
}
