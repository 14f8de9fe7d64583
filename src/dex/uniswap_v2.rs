use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::Address;

use crate::chain::ContractCaller;
use crate::core::types::{DexDescriptor, PoolModelKind, PoolRef, ReserveSnapshot, TokenPair};
use crate::dex::abi::{V2_FACTORY, V2_PAIR};
use crate::dex::{address_at, canonical_order, function, u256_to_biguint, uint_at, PoolSource};
use crate::error::ScanError;

/// Constant-product pools (Uniswap V2 and forks: SushiSwap, PancakeSwap, ...).
pub struct UniswapV2Source {
    caller: ContractCaller,
}

impl UniswapV2Source {
    pub fn new(caller: ContractCaller) -> Self {
        Self { caller }
    }

    async fn pool_token(&self, pool: Address, getter: &str) -> Result<Address, ScanError> {
        let getter_fn = function(&V2_PAIR, getter).map_err(ScanError::ReserveUnavailable)?;
        let output = self
            .caller
            .call(pool, getter_fn, &[])
            .await
            .map_err(|e| e.into_scan_error(ScanError::ReserveUnavailable))?;
        address_at(&output, 0, getter).map_err(ScanError::ReserveUnavailable)
    }
}

#[async_trait]
impl PoolSource for UniswapV2Source {
    fn kind(&self) -> PoolModelKind {
        PoolModelKind::ConstantProduct
    }

    async fn locate(
        &self,
        dex: &DexDescriptor,
        pair: &TokenPair,
    ) -> Result<Option<PoolRef>, ScanError> {
        let get_pair = function(&V2_FACTORY, "getPair").map_err(ScanError::LocatorUnavailable)?;
        let (first, second) = canonical_order(pair);

        let output = self
            .caller
            .call(
                dex.authority,
                get_pair,
                &[AbiToken::Address(first), AbiToken::Address(second)],
            )
            .await
            .map_err(|e| e.into_scan_error(ScanError::LocatorUnavailable))?;
        let pair_address =
            address_at(&output, 0, "getPair").map_err(ScanError::LocatorUnavailable)?;

        // The factory answers the zero address for pairs it never created
        if pair_address == Address::zero() {
            return Ok(None);
        }

        Ok(Some(PoolRef::new(pair_address, dex, *pair)))
    }

    async fn read_reserves(&self, pool: &PoolRef) -> Result<ReserveSnapshot, ScanError> {
        let get_reserves =
            function(&V2_PAIR, "getReserves").map_err(ScanError::ReserveUnavailable)?;

        let (token0, token1, reserves) = tokio::try_join!(
            self.pool_token(pool.address, "token0"),
            self.pool_token(pool.address, "token1"),
            async {
                self.caller
                    .call(pool.address, get_reserves, &[])
                    .await
                    .map_err(|e| e.into_scan_error(ScanError::ReserveUnavailable))
            }
        )?;

        let reserve0 = uint_at(&reserves, 0, "reserve0").map_err(ScanError::ReserveUnavailable)?;
        let reserve1 = uint_at(&reserves, 1, "reserve1").map_err(ScanError::ReserveUnavailable)?;

        Ok(ReserveSnapshot::new(
            token0,
            token1,
            u256_to_biguint(reserve0),
            u256_to_biguint(reserve1),
        ))
    }
}
