use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::types::{
    DexDescriptor, OutcomeTag, PriceReport, ScanOutcome, ScanReport, Token, TokenPair,
};
use crate::dex::SourceRegistry;
use crate::error::ScanError;
use crate::price_calculator::PriceCalculator;
use crate::token::{TokenMetadataSource, TokenResolver};

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cross-venue scanner.
///
/// Runs Locate → Read → Normalize for every (pair, venue) combination. Each
/// combination is isolated: whatever goes wrong becomes that combination's
/// outcome and the scan carries on. Token metadata lives in a fresh
/// [`TokenResolver`] per call to [`Scanner::scan`], so two scans never share
/// cache state.
pub struct Scanner {
    sources: SourceRegistry,
    metadata: Arc<dyn TokenMetadataSource>,
    known_tokens: Vec<Token>,
    max_concurrency: usize,
    stage_timeout: Duration,
}

impl Scanner {
    pub fn new(sources: SourceRegistry, metadata: Arc<dyn TokenMetadataSource>) -> Self {
        Self {
            sources,
            metadata,
            known_tokens: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    /// Tokens with pre-declared metadata; these never hit the metadata source.
    pub fn with_known_tokens(mut self, tokens: impl IntoIterator<Item = Token>) -> Self {
        self.known_tokens.extend(tokens);
        self
    }

    /// Upper bound on combinations in flight at once.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Bound on each metadata, Locate and Read step.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Scan every pair against every venue.
    ///
    /// The report holds exactly `pairs.len() * venues.len()` outcomes, pairs
    /// outer and venues inner, whatever order the lookups complete in.
    pub async fn scan(&self, pairs: &[TokenPair], venues: &[DexDescriptor]) -> ScanReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let resolver =
            TokenResolver::new(self.metadata.clone()).with_known(self.known_tokens.iter().cloned());

        // Each token once, up front
        let mut seen = HashSet::new();
        let unique: Vec<_> = pairs
            .iter()
            .flat_map(|pair| [pair.token_a, pair.token_b])
            .filter(|token| seen.insert(*token))
            .collect();
        if tokio::time::timeout(self.stage_timeout, resolver.resolve_all(&unique))
            .await
            .is_err()
        {
            warn!(
                "token metadata still pending after {:?}, retrying per combination",
                self.stage_timeout
            );
        }

        let combinations: Vec<(usize, &TokenPair, &DexDescriptor)> = pairs
            .iter()
            .flat_map(|pair| venues.iter().map(move |venue| (pair, venue)))
            .enumerate()
            .map(|(index, (pair, venue))| (index, pair, venue))
            .collect();
        info!(
            "scanning {} pairs across {} venues ({} combinations)",
            pairs.len(),
            venues.len(),
            combinations.len()
        );

        let mut slots: Vec<Option<ScanOutcome>> = Vec::with_capacity(combinations.len());
        slots.resize_with(combinations.len(), || None);

        let resolver = &resolver;
        let mut completed = stream::iter(combinations)
            .map(|(index, pair, venue)| async move {
                (index, self.scan_one(resolver, pair, venue).await)
            })
            .buffer_unordered(self.max_concurrency);

        while let Some((index, outcome)) = completed.next().await {
            slots[index] = Some(outcome);
        }

        let report = ScanReport {
            outcomes: slots.into_iter().flatten().collect(),
            tokens: resolver.resolved(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "scan finished in {:?}: {} found, {} not found, {} errors",
            clock.elapsed(),
            report.count(OutcomeTag::Found),
            report.count(OutcomeTag::NotFound),
            report.count(OutcomeTag::Error)
        );
        report
    }

    async fn scan_one(
        &self,
        resolver: &TokenResolver,
        pair: &TokenPair,
        venue: &DexDescriptor,
    ) -> ScanOutcome {
        debug!(
            "{:?}/{:?} on {} ({})",
            pair.token_a, pair.token_b, venue.name, venue.kind
        );

        match self.price(resolver, pair, venue).await {
            Ok(Some(report)) => {
                info!(
                    "{}/{} on {}: {} (pool {:?})",
                    report.token_a.symbol,
                    report.token_b.symbol,
                    report.venue,
                    PriceCalculator::format_price(&report.price_a_to_b),
                    report.pool
                );
                ScanOutcome::Found(report)
            }
            Ok(None) => {
                warn!(
                    "no pool for {:?}/{:?} on {}",
                    pair.token_a, pair.token_b, venue.name
                );
                ScanOutcome::NotFound {
                    pair: *pair,
                    venue: venue.name.clone(),
                }
            }
            Err(e) => {
                if e.is_integrity_violation() {
                    error!(
                        "{:?}/{:?} on {} returned the wrong pool: {}",
                        pair.token_a, pair.token_b, venue.name, e
                    );
                } else {
                    warn!(
                        "{:?}/{:?} on {} failed: {}",
                        pair.token_a, pair.token_b, venue.name, e
                    );
                }
                ScanOutcome::Error {
                    pair: *pair,
                    venue: venue.name.clone(),
                    error: e,
                }
            }
        }
    }

    /// Locate, read and normalize one combination. `None` means no pool exists.
    async fn price(
        &self,
        resolver: &TokenResolver,
        pair: &TokenPair,
        venue: &DexDescriptor,
    ) -> Result<Option<PriceReport>, ScanError> {
        let (token_a, token_b) = self
            .bounded("metadata", async {
                tokio::try_join!(resolver.resolve(pair.token_a), resolver.resolve(pair.token_b))
            })
            .await?;

        let source = self.sources.get(venue.kind).ok_or_else(|| {
            ScanError::UnsupportedPoolModel(format!("{} ({})", venue.kind, venue.name))
        })?;

        let pool = match self.bounded("locate", source.locate(venue, pair)).await? {
            Some(pool) => pool,
            None => return Ok(None),
        };
        let snapshot = self.bounded("read", source.read_reserves(&pool)).await?;

        PriceCalculator::normalize(&snapshot, &token_a, &token_b, &venue.name, pool.address)
            .map(Some)
    }

    async fn bounded<T>(
        &self,
        stage: &str,
        step: impl Future<Output = Result<T, ScanError>>,
    ) -> Result<T, ScanError> {
        tokio::time::timeout(self.stage_timeout, step)
            .await
            .map_err(|_| {
                ScanError::Timeout(format!("{} exceeded {:?}", stage, self.stage_timeout))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PoolModelKind, PoolRef, ReserveSnapshot};
    use crate::dex::PoolSource;
    use crate::token::TokenMetadata;
    use async_trait::async_trait;
    use ethers::types::Address;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    struct Metadata {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TokenMetadataSource for Metadata {
        async fn fetch(&self, token: Address) -> Result<TokenMetadata, ScanError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(TokenMetadata {
                decimals: 18,
                symbol: format!("T{}", token.to_low_u64_be()),
            })
        }
    }

    /// Every pair exists; tracks how many reads overlap.
    #[derive(Default)]
    struct SlowPools {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PoolSource for SlowPools {
        fn kind(&self) -> PoolModelKind {
            PoolModelKind::ConstantProduct
        }

        async fn locate(
            &self,
            dex: &DexDescriptor,
            pair: &TokenPair,
        ) -> Result<Option<PoolRef>, ScanError> {
            Ok(Some(PoolRef::new(addr(0xf0), dex, *pair)))
        }

        async fn read_reserves(&self, pool: &PoolRef) -> Result<ReserveSnapshot, ScanError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ReserveSnapshot::new(pool.pair.token_a, pool.pair.token_b, 1u32, 2u32))
        }
    }

    fn venues(n: usize) -> Vec<DexDescriptor> {
        (0..n)
            .map(|i| DexDescriptor::new(format!("venue-{}", i), PoolModelKind::ConstantProduct, addr(0xa0 + i as u64)))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pools = Arc::new(SlowPools::default());
        let mut registry = SourceRegistry::new();
        registry.register(pools.clone());
        let scanner = Scanner::new(registry, Arc::new(Metadata { fetches: AtomicUsize::new(0) }))
            .with_max_concurrency(3);

        let report = scanner.scan(&[TokenPair::new(addr(1), addr(2))], &venues(12)).await;
        assert_eq!(report.count(OutcomeTag::Found), 12);
        assert!(pools.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_tokens_resolved_once_per_scan() {
        let metadata = Arc::new(Metadata { fetches: AtomicUsize::new(0) });
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(SlowPools::default()));
        let scanner = Scanner::new(registry, metadata.clone())
            .with_known_tokens(vec![Token::new(addr(1), "WETH", 18)]);

        let pairs = [
            TokenPair::new(addr(1), addr(2)),
            TokenPair::new(addr(2), addr(3)),
            TokenPair::new(addr(3), addr(1)),
        ];
        let report = scanner.scan(&pairs, &venues(4)).await;

        assert_eq!(report.outcomes.len(), 12);
        // addr(1) is pre-declared
        assert_eq!(metadata.fetches.load(Ordering::SeqCst), 2);
        let symbols: Vec<_> = report.tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["WETH", "T2", "T3"]);

        // A second scan starts from an empty cache
        scanner.scan(&pairs, &venues(1)).await;
        assert_eq!(metadata.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        let scanner = Scanner::new(SourceRegistry::new(), Arc::new(Metadata { fetches: AtomicUsize::new(0) }));
        let report = scanner.scan(&[], &venues(3)).await;
        assert!(report.outcomes.is_empty());
        let report = scanner.scan(&[TokenPair::new(addr(1), addr(2))], &[]).await;
        assert!(report.outcomes.is_empty());
    }
}
