pub mod abi;
pub mod balancer;
pub mod curve;
pub mod uniswap_v2;
pub mod uniswap_v3;

use async_trait::async_trait;
use ethers::abi::{Abi, Function, Token as AbiToken};
use ethers::types::{Address, U256};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::ContractCaller;
use crate::core::types::{DexDescriptor, PoolModelKind, PoolRef, ReserveSnapshot, TokenPair};
use crate::error::ScanError;

pub use balancer::BalancerSource;
pub use curve::CurveSource;
pub use uniswap_v2::UniswapV2Source;
pub use uniswap_v3::UniswapV3Source;

/// Pool Locator and Reserve Reader for one pool model.
#[async_trait]
pub trait PoolSource: Send + Sync {
    /// Pool model this strategy understands
    fn kind(&self) -> PoolModelKind;

    /// Find the pool for `pair` on `dex`. `Ok(None)` means no pool exists.
    async fn locate(
        &self,
        dex: &DexDescriptor,
        pair: &TokenPair,
    ) -> Result<Option<PoolRef>, ScanError>;

    /// Read the pool's reserves together with its internal token order.
    async fn read_reserves(&self, pool: &PoolRef) -> Result<ReserveSnapshot, ScanError>;
}

/// Strategies keyed by pool model kind.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<PoolModelKind, Arc<dyn PoolSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four on-chain strategies sharing one caller.
    pub fn on_chain(caller: ContractCaller) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UniswapV2Source::new(caller.clone())));
        registry.register(Arc::new(UniswapV3Source::new(caller.clone())));
        registry.register(Arc::new(CurveSource::new(caller.clone())));
        registry.register(Arc::new(BalancerSource::new(caller)));
        registry
    }

    /// Register a strategy, replacing any previous one for the same kind.
    pub fn register(&mut self, source: Arc<dyn PoolSource>) {
        self.sources.insert(source.kind(), source);
    }

    pub fn get(&self, kind: PoolModelKind) -> Option<&Arc<dyn PoolSource>> {
        self.sources.get(&kind)
    }
}

/// The pair in ascending address order, as factories key their pools.
pub fn canonical_order(pair: &TokenPair) -> (Address, Address) {
    if pair.token_a <= pair.token_b {
        (pair.token_a, pair.token_b)
    } else {
        (pair.token_b, pair.token_a)
    }
}

pub fn u256_to_biguint(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

/// Reserves of the requested pair out of a multi-token pool, in the pool's
/// own (index) order.
///
/// When a requested token is not in the pool the first two coins are
/// reported as-is, so the mismatch surfaces in normalization instead of being
/// papered over here.
pub(crate) fn select_pair_reserves(
    coins: &[Address],
    balances: &[U256],
    pair: &TokenPair,
) -> Result<ReserveSnapshot, ScanError> {
    if coins.len() != balances.len() {
        return Err(ScanError::ReserveUnavailable(format!(
            "pool reported {} coins but {} balances",
            coins.len(),
            balances.len()
        )));
    }

    let index_of = |token: Address| coins.iter().position(|coin| *coin == token);
    let (i, j) = match (index_of(pair.token_a), index_of(pair.token_b)) {
        (Some(a), Some(b)) if a != b => (a.min(b), a.max(b)),
        _ => {
            log::warn!("requested pair {:?} not found among pool coins {:?}", pair, coins);
            let mut present = coins
                .iter()
                .enumerate()
                .filter(|(_, coin)| **coin != Address::zero())
                .map(|(index, _)| index);
            match (present.next(), present.next()) {
                (Some(first), Some(second)) => (first, second),
                _ => {
                    return Err(ScanError::ReserveUnavailable(
                        "pool holds fewer than two coins".to_string(),
                    ))
                }
            }
        }
    };

    Ok(ReserveSnapshot::new(
        coins[i],
        coins[j],
        u256_to_biguint(balances[i]),
        u256_to_biguint(balances[j]),
    ))
}

pub(crate) fn function(abi: &'static Abi, name: &str) -> Result<&'static Function, String> {
    abi.function(name)
        .map_err(|e| format!("built-in ABI has no {}: {}", name, e))
}

/// Pull the `index`-th output of a decoded call as an address.
pub(crate) fn address_at(tokens: &[AbiToken], index: usize, what: &str) -> Result<Address, String> {
    tokens
        .get(index)
        .cloned()
        .and_then(AbiToken::into_address)
        .ok_or_else(|| format!("{} is missing or not an address", what))
}

/// Pull the `index`-th output of a decoded call as an unsigned integer.
pub(crate) fn uint_at(tokens: &[AbiToken], index: usize, what: &str) -> Result<U256, String> {
    tokens
        .get(index)
        .cloned()
        .and_then(AbiToken::into_uint)
        .ok_or_else(|| format!("{} is missing or not an integer", what))
}

/// Pull the `index`-th output of a decoded call as an array (fixed or dynamic).
pub(crate) fn array_at(
    tokens: &[AbiToken],
    index: usize,
    what: &str,
) -> Result<Vec<AbiToken>, String> {
    match tokens.get(index) {
        Some(AbiToken::Array(items)) | Some(AbiToken::FixedArray(items)) => Ok(items.clone()),
        _ => Err(format!("{} is missing or not an array", what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_is_order_insensitive() {
        let low = Address::from_low_u64_be(1);
        let high = Address::from_low_u64_be(2);
        assert_eq!(canonical_order(&TokenPair::new(high, low)), (low, high));
        assert_eq!(canonical_order(&TokenPair::new(low, high)), (low, high));
    }

    #[test]
    fn test_u256_to_biguint() {
        let value = U256::from_dec_str("340282366920938463463374607431768211456").unwrap();
        assert_eq!(
            u256_to_biguint(value).to_string(),
            "340282366920938463463374607431768211456"
        );
        assert_eq!(u256_to_biguint(U256::zero()), BigUint::from(0u8));
    }

    #[test]
    fn test_select_pair_reserves_uses_index_order() {
        let coins = vec![
            Address::from_low_u64_be(10),
            Address::from_low_u64_be(11),
            Address::from_low_u64_be(12),
        ];
        let balances = vec![U256::from(1u8), U256::from(2u8), U256::from(3u8)];
        let pair = TokenPair::new(coins[2], coins[0]);

        let snapshot = select_pair_reserves(&coins, &balances, &pair).unwrap();
        assert_eq!(snapshot.token0, coins[0]);
        assert_eq!(snapshot.token1, coins[2]);
        assert_eq!(snapshot.reserve0, BigUint::from(1u8));
        assert_eq!(snapshot.reserve1, BigUint::from(3u8));
    }

    #[test]
    fn test_select_pair_reserves_reports_foreign_pool() {
        let coins = vec![
            Address::from_low_u64_be(10),
            Address::from_low_u64_be(11),
            Address::zero(),
        ];
        let balances = vec![U256::from(1u8), U256::from(2u8), U256::zero()];
        let pair = TokenPair::new(Address::from_low_u64_be(98), Address::from_low_u64_be(99));

        let snapshot = select_pair_reserves(&coins, &balances, &pair).unwrap();
        assert_eq!((snapshot.token0, snapshot.token1), (coins[0], coins[1]));
        assert!(select_pair_reserves(&coins, &balances[..2], &pair).is_err());
    }

    #[test]
    fn test_registry_replaces_by_kind() {
        use crate::chain::stub::StubChain;
        use std::time::Duration;

        let caller = ContractCaller::new(Arc::new(StubChain::new()), Duration::from_secs(1));
        let mut registry = SourceRegistry::on_chain(caller.clone());
        let replacement: Arc<dyn PoolSource> = Arc::new(UniswapV2Source::new(caller));
        registry.register(replacement.clone());

        let current = registry.get(PoolModelKind::ConstantProduct).unwrap();
        assert!(Arc::ptr_eq(current, &replacement));
        assert!(registry.get(PoolModelKind::Stable).is_some());
        assert!(registry.get(PoolModelKind::WeightedVault).is_some());
    }
}
