use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, U256};
use num_bigint::BigUint;
use num_traits::Zero;

use crate::chain::ContractCaller;
use crate::core::types::{DexDescriptor, PoolModelKind, PoolRef, ReserveSnapshot, TokenPair};
use crate::dex::abi::{V3_FACTORY, V3_POOL};
use crate::dex::{address_at, canonical_order, function, u256_to_biguint, uint_at, PoolSource};
use crate::error::ScanError;

/// Fee tiers tried when a venue does not list its own (0.05%, 0.3%, 1%).
pub const DEFAULT_FEE_TIERS: [u32; 3] = [500, 3000, 10000];

/// Q64.96 fixed point: sqrtPriceX96 = sqrt(price) * 2^96.
const Q96_SHIFT: usize = 96;

/// Concentrated-liquidity pools (Uniswap V3 and forks).
pub struct UniswapV3Source {
    caller: ContractCaller,
}

impl UniswapV3Source {
    pub fn new(caller: ContractCaller) -> Self {
        Self { caller }
    }

    async fn read(&self, pool: Address, name: &str) -> Result<Vec<AbiToken>, ScanError> {
        let getter = function(&V3_POOL, name).map_err(ScanError::ReserveUnavailable)?;
        self.caller
            .call(pool, getter, &[])
            .await
            .map_err(|e| e.into_scan_error(ScanError::ReserveUnavailable))
    }
}

/// Virtual reserves of the active range: x = L / sqrtP and y = L * sqrtP.
///
/// An uninitialized pool (sqrtP == 0) reports two zero reserves.
pub fn virtual_reserves(liquidity: &BigUint, sqrt_price_x96: &BigUint) -> (BigUint, BigUint) {
    if sqrt_price_x96.is_zero() {
        return (BigUint::zero(), BigUint::zero());
    }
    let reserve0 = (liquidity << Q96_SHIFT) / sqrt_price_x96;
    let reserve1 = (liquidity * sqrt_price_x96) >> Q96_SHIFT;
    (reserve0, reserve1)
}

#[async_trait]
impl PoolSource for UniswapV3Source {
    fn kind(&self) -> PoolModelKind {
        PoolModelKind::ConcentratedLiquidity
    }

    async fn locate(
        &self,
        dex: &DexDescriptor,
        pair: &TokenPair,
    ) -> Result<Option<PoolRef>, ScanError> {
        let get_pool = function(&V3_FACTORY, "getPool").map_err(ScanError::LocatorUnavailable)?;
        let (first, second) = canonical_order(pair);
        let tiers: &[u32] = if dex.fee_tiers.is_empty() {
            &DEFAULT_FEE_TIERS
        } else {
            &dex.fee_tiers
        };

        for &fee in tiers {
            let output = self
                .caller
                .call(
                    dex.authority,
                    get_pool,
                    &[
                        AbiToken::Address(first),
                        AbiToken::Address(second),
                        AbiToken::Uint(U256::from(fee)),
                    ],
                )
                .await
                .map_err(|e| e.into_scan_error(ScanError::LocatorUnavailable))?;
            let pool_address =
                address_at(&output, 0, "getPool").map_err(ScanError::LocatorUnavailable)?;

            if pool_address != Address::zero() {
                let mut pool = PoolRef::new(pool_address, dex, *pair);
                pool.fee_tier = Some(fee);
                return Ok(Some(pool));
            }
            log::debug!("{}: no pool in fee tier {} for {:?}", dex.name, fee, pair);
        }

        Ok(None)
    }

    async fn read_reserves(&self, pool: &PoolRef) -> Result<ReserveSnapshot, ScanError> {
        let (token0, token1, slot0, liquidity) = tokio::try_join!(
            self.read(pool.address, "token0"),
            self.read(pool.address, "token1"),
            self.read(pool.address, "slot0"),
            self.read(pool.address, "liquidity"),
        )?;

        let token0 = address_at(&token0, 0, "token0").map_err(ScanError::ReserveUnavailable)?;
        let token1 = address_at(&token1, 0, "token1").map_err(ScanError::ReserveUnavailable)?;
        let sqrt_price = uint_at(&slot0, 0, "sqrtPriceX96").map_err(ScanError::ReserveUnavailable)?;
        let liquidity = uint_at(&liquidity, 0, "liquidity").map_err(ScanError::ReserveUnavailable)?;

        let (reserve0, reserve1) =
            virtual_reserves(&u256_to_biguint(liquidity), &u256_to_biguint(sqrt_price));

        Ok(ReserveSnapshot {
            token0,
            token1,
            reserve0,
            reserve1,
        })
    }
}
