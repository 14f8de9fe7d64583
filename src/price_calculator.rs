use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use ethers::types::Address;
use num_bigint::{BigInt, BigUint};

use crate::core::types::{PriceReport, PriceValue, ReserveSnapshot, Token, TokenPair};
use crate::error::ScanError;

/// How a pool's internal order lines up with the caller's requested order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// token0 is token A
    Aligned,
    /// token0 is token B
    Flipped,
}

/// Price normalization utilities
pub struct PriceCalculator;

impl PriceCalculator {
    /// Compare the pool's internal ordering with the requested pair.
    ///
    /// Addresses are compared as 20-byte values, so checksum casing never
    /// matters. A pool holding anything other than exactly the requested two
    /// tokens is a `PairMismatch`.
    pub fn orient(snapshot: &ReserveSnapshot, pair: &TokenPair) -> Result<Orientation, ScanError> {
        if snapshot.token0 == pair.token_a && snapshot.token1 == pair.token_b {
            Ok(Orientation::Aligned)
        } else if snapshot.token0 == pair.token_b && snapshot.token1 == pair.token_a {
            Ok(Orientation::Flipped)
        } else {
            Err(ScanError::PairMismatch(format!(
                "pool holds {:?}/{:?}, requested {:?}/{:?}",
                snapshot.token0, snapshot.token1, pair.token_a, pair.token_b
            )))
        }
    }

    /// raw / 10^decimals, exactly.
    pub fn scale(raw: &BigUint, decimals: u8) -> BigDecimal {
        BigDecimal::new(BigInt::from(raw.clone()), decimals as i64)
    }

    /// floor(reserve_b * 10^decimals_a / (reserve_a * 10^decimals_b)) in unbounded integers.
    ///
    /// `None` when `reserve_a` is zero.
    pub fn raw_ratio(
        reserve_a: &BigUint,
        reserve_b: &BigUint,
        decimals_a: u8,
        decimals_b: u8,
    ) -> Option<BigUint> {
        if reserve_a.is_zero() {
            return None;
        }
        let ten = BigUint::from(10u8);
        let numerator = reserve_b * ten.pow(decimals_a as u32);
        let denominator = reserve_a * ten.pow(decimals_b as u32);
        Some(numerator / denominator)
    }

    /// Both directions of the display price. Undefined when either side is empty.
    pub fn prices(human_a: &BigDecimal, human_b: &BigDecimal) -> (PriceValue, PriceValue) {
        if human_a.is_zero() || human_b.is_zero() {
            return (PriceValue::Undefined, PriceValue::Undefined);
        }
        (
            PriceValue::Defined(human_b / human_a),
            PriceValue::Defined(human_a / human_b),
        )
    }

    /// Turn a reserve snapshot into a [`PriceReport`] in caller order.
    pub fn normalize(
        snapshot: &ReserveSnapshot,
        token_a: &Token,
        token_b: &Token,
        venue: &str,
        pool: Address,
    ) -> Result<PriceReport, ScanError> {
        let pair = TokenPair::new(token_a.address, token_b.address);
        let (raw_a, raw_b) = match Self::orient(snapshot, &pair)? {
            Orientation::Aligned => (&snapshot.reserve0, &snapshot.reserve1),
            Orientation::Flipped => (&snapshot.reserve1, &snapshot.reserve0),
        };

        let reserve_a = Self::scale(raw_a, token_a.decimals);
        let reserve_b = Self::scale(raw_b, token_b.decimals);
        let (price_a_to_b, price_b_to_a) = Self::prices(&reserve_a, &reserve_b);
        let raw_ratio = Self::raw_ratio(raw_a, raw_b, token_a.decimals, token_b.decimals);

        Ok(PriceReport {
            venue: venue.to_string(),
            pool,
            token_a: token_a.clone(),
            token_b: token_b.clone(),
            raw_reserve_a: raw_a.clone(),
            raw_reserve_b: raw_b.clone(),
            reserve_a,
            reserve_b,
            price_a_to_b,
            price_b_to_a,
            raw_ratio,
            timestamp: Utc::now(),
        })
    }

    /// Format a price for display
    pub fn format_price(price: &PriceValue) -> String {
        match price {
            PriceValue::Defined(value) => format!("{:.6}", value),
            PriceValue::Undefined => "undefined".to_string(),
        }
    }
}
