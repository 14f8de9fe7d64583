use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, H256, U256};

use crate::chain::ContractCaller;
use crate::core::types::{DexDescriptor, PoolModelKind, PoolRef, ReserveSnapshot, TokenPair};
use crate::dex::abi::BALANCER_VAULT;
use crate::dex::{array_at, function, select_pair_reserves, PoolSource};
use crate::error::ScanError;

/// Weighted pools held by a Balancer V2 vault.
///
/// The vault has no pair lookup, so the venue lists candidate pool ids and the
/// locator picks the first one holding both tokens. Pool weights are not
/// applied; the snapshot carries plain balances like every other model.
pub struct BalancerSource {
    caller: ContractCaller,
}

impl BalancerSource {
    pub fn new(caller: ContractCaller) -> Self {
        Self { caller }
    }

    async fn pool_tokens(
        &self,
        vault: Address,
        pool_id: H256,
        on_error: fn(String) -> ScanError,
    ) -> Result<(Vec<Address>, Vec<U256>), ScanError> {
        let get_pool_tokens = function(&BALANCER_VAULT, "getPoolTokens").map_err(on_error)?;
        let output = self
            .caller
            .call(
                vault,
                get_pool_tokens,
                &[AbiToken::FixedBytes(pool_id.as_bytes().to_vec())],
            )
            .await
            .map_err(|e| e.into_scan_error(on_error))?;

        let tokens = array_at(&output, 0, "tokens").map_err(on_error)?;
        let balances = array_at(&output, 1, "balances").map_err(on_error)?;
        Ok((
            tokens.into_iter().filter_map(AbiToken::into_address).collect(),
            balances.into_iter().filter_map(AbiToken::into_uint).collect(),
        ))
    }
}

/// A Balancer pool id starts with the pool's address.
pub fn pool_address(pool_id: &H256) -> Address {
    Address::from_slice(&pool_id.as_bytes()[..20])
}

#[async_trait]
impl PoolSource for BalancerSource {
    fn kind(&self) -> PoolModelKind {
        PoolModelKind::WeightedVault
    }

    async fn locate(
        &self,
        dex: &DexDescriptor,
        pair: &TokenPair,
    ) -> Result<Option<PoolRef>, ScanError> {
        for pool_id in &dex.pool_ids {
            let (tokens, _) = self
                .pool_tokens(dex.authority, *pool_id, ScanError::LocatorUnavailable)
                .await?;

            if tokens.contains(&pair.token_a) && tokens.contains(&pair.token_b) {
                let mut pool = PoolRef::new(pool_address(pool_id), dex, *pair);
                pool.pool_id = Some(*pool_id);
                return Ok(Some(pool));
            }
        }

        Ok(None)
    }

    async fn read_reserves(&self, pool: &PoolRef) -> Result<ReserveSnapshot, ScanError> {
        let pool_id = pool.pool_id.ok_or_else(|| {
            ScanError::ReserveUnavailable(format!("vault pool {:?} has no pool id", pool.address))
        })?;
        let (tokens, balances) = self
            .pool_tokens(pool.authority, pool_id, ScanError::ReserveUnavailable)
            .await?;

        select_pair_reserves(&tokens, &balances, &pool.pair)
    }
}
