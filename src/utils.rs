use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use ethers::types::Address;
use num_traits::{ToPrimitive, Zero};
use std::str::FromStr;

/// Parse a `0x`-prefixed address, case-insensitively.
pub fn parse_address(s: &str) -> Result<Address> {
    if !is_valid_ethereum_address(s) {
        return Err(anyhow!("invalid address: {}", s));
    }
    Address::from_str(s).map_err(|e| anyhow!("invalid address {}: {}", s, e))
}

/// Validate the format of an Ethereum address
pub fn is_valid_ethereum_address(address: &str) -> bool {
    if !address.starts_with("0x") {
        return false;
    }

    if address.len() != 42 {
        return false;
    }

    address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// `0x1234…abcd`, for display where no symbol is known.
pub fn short_address(address: &Address) -> String {
    let full = format!("{:?}", address);
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

/// Percentage difference of `price2` over `price1`
pub fn calculate_percentage_difference(price1: &BigDecimal, price2: &BigDecimal) -> f64 {
    if price1.is_zero() {
        return 0.0;
    }

    let diff = (price2 - price1).abs();
    let percentage = (&diff / price1) * BigDecimal::from(100);

    percentage.to_f64().unwrap_or(0.0)
}

/// Serde adapter writing a `BigUint` as a decimal string.
pub mod biguint_string {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let digits = String::deserialize(deserializer)?;
        BigUint::from_str(&digits).map_err(D::Error::custom)
    }
}

/// [`biguint_string`] for optional values.
pub mod opt_biguint_string {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(
        value: &Option<BigUint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.collect_str(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigUint>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|digits| BigUint::from_str(&digits).map_err(D::Error::custom))
            .transpose()
    }
}
