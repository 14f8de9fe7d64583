use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, U256};

use crate::chain::ContractCaller;
use crate::core::types::{DexDescriptor, PoolModelKind, PoolRef, ReserveSnapshot, TokenPair};
use crate::dex::abi::CURVE_REGISTRY;
use crate::dex::{address_at, array_at, canonical_order, function, select_pair_reserves, PoolSource};
use crate::error::ScanError;

/// Stable-swap pools, located and read through the Curve main registry.
///
/// The registry is the venue's authority. Coins keep the pool's index order,
/// and balances come back in each coin's own decimals.
pub struct CurveSource {
    caller: ContractCaller,
}

impl CurveSource {
    pub fn new(caller: ContractCaller) -> Self {
        Self { caller }
    }

    async fn registry_call(
        &self,
        registry: Address,
        name: &str,
        pool: Address,
    ) -> Result<Vec<AbiToken>, ScanError> {
        let registry_fn = function(&CURVE_REGISTRY, name).map_err(ScanError::ReserveUnavailable)?;
        let output = self
            .caller
            .call(registry, registry_fn, &[AbiToken::Address(pool)])
            .await
            .map_err(|e| e.into_scan_error(ScanError::ReserveUnavailable))?;
        array_at(&output, 0, name).map_err(ScanError::ReserveUnavailable)
    }
}

#[async_trait]
impl PoolSource for CurveSource {
    fn kind(&self) -> PoolModelKind {
        PoolModelKind::Stable
    }

    async fn locate(
        &self,
        dex: &DexDescriptor,
        pair: &TokenPair,
    ) -> Result<Option<PoolRef>, ScanError> {
        let find_pool = function(&CURVE_REGISTRY, "find_pool_for_coins")
            .map_err(ScanError::LocatorUnavailable)?;
        let (first, second) = canonical_order(pair);

        let output = self
            .caller
            .call(
                dex.authority,
                find_pool,
                &[AbiToken::Address(first), AbiToken::Address(second)],
            )
            .await
            .map_err(|e| e.into_scan_error(ScanError::LocatorUnavailable))?;
        let pool_address =
            address_at(&output, 0, "find_pool_for_coins").map_err(ScanError::LocatorUnavailable)?;

        if pool_address == Address::zero() {
            return Ok(None);
        }

        Ok(Some(PoolRef::new(pool_address, dex, *pair)))
    }

    async fn read_reserves(&self, pool: &PoolRef) -> Result<ReserveSnapshot, ScanError> {
        // The registry that located the pool also reports its coins and balances
        let (coins, balances) = tokio::try_join!(
            self.registry_call(pool.authority, "get_coins", pool.address),
            self.registry_call(pool.authority, "get_balances", pool.address),
        )?;

        let coins: Vec<Address> = coins.into_iter().filter_map(AbiToken::into_address).collect();
        let balances: Vec<U256> = balances.into_iter().filter_map(AbiToken::into_uint).collect();

        select_pair_reserves(&coins, &balances, &pool.pair)
    }
}
