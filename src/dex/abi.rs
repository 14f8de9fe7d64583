//! Minimal ABI fragments for the contracts the scanner reads.

use ethers::abi::Abi;
use once_cell::sync::Lazy;

fn parse(json: &str) -> Abi {
    // Fragments are compile-time constants; a parse failure is a programming error.
    serde_json::from_str(json).unwrap_or_else(|e| panic!("invalid built-in ABI: {}", e))
}

pub static ERC20: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "constant": true,
            "inputs": [],
            "name": "decimals",
            "outputs": [{"name": "", "type": "uint8"}],
            "type": "function"
        },
        {
            "constant": true,
            "inputs": [],
            "name": "symbol",
            "outputs": [{"name": "", "type": "string"}],
            "type": "function"
        }
    ]"#,
    )
});

/// Uniswap V2 style factory (SushiSwap, PancakeSwap share it).
pub static V2_FACTORY: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "constant": true,
            "inputs": [
                {"name": "tokenA", "type": "address"},
                {"name": "tokenB", "type": "address"}
            ],
            "name": "getPair",
            "outputs": [{"name": "pair", "type": "address"}],
            "type": "function"
        }
    ]"#,
    )
});

pub static V2_PAIR: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "constant": true,
            "inputs": [],
            "name": "getReserves",
            "outputs": [
                {"name": "reserve0", "type": "uint112"},
                {"name": "reserve1", "type": "uint112"},
                {"name": "blockTimestampLast", "type": "uint32"}
            ],
            "type": "function"
        },
        {
            "constant": true,
            "inputs": [],
            "name": "token0",
            "outputs": [{"name": "", "type": "address"}],
            "type": "function"
        },
        {
            "constant": true,
            "inputs": [],
            "name": "token1",
            "outputs": [{"name": "", "type": "address"}],
            "type": "function"
        }
    ]"#,
    )
});

pub static V3_FACTORY: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "inputs": [
                {"name": "tokenA", "type": "address"},
                {"name": "tokenB", "type": "address"},
                {"name": "fee", "type": "uint24"}
            ],
            "name": "getPool",
            "outputs": [{"name": "pool", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        }
    ]"#,
    )
});

pub static V3_POOL: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "inputs": [],
            "name": "slot0",
            "outputs": [
                {"name": "sqrtPriceX96", "type": "uint160"},
                {"name": "tick", "type": "int24"},
                {"name": "observationIndex", "type": "uint16"},
                {"name": "observationCardinality", "type": "uint16"},
                {"name": "observationCardinalityNext", "type": "uint16"},
                {"name": "feeProtocol", "type": "uint8"},
                {"name": "unlocked", "type": "bool"}
            ],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "liquidity",
            "outputs": [{"name": "", "type": "uint128"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "token0",
            "outputs": [{"name": "", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "token1",
            "outputs": [{"name": "", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        }
    ]"#,
    )
});

/// Curve main registry.
pub static CURVE_REGISTRY: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "inputs": [
                {"name": "_from", "type": "address"},
                {"name": "_to", "type": "address"}
            ],
            "name": "find_pool_for_coins",
            "outputs": [{"name": "", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"name": "_pool", "type": "address"}],
            "name": "get_coins",
            "outputs": [{"name": "", "type": "address[8]"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"name": "_pool", "type": "address"}],
            "name": "get_balances",
            "outputs": [{"name": "", "type": "uint256[8]"}],
            "stateMutability": "view",
            "type": "function"
        }
    ]"#,
    )
});

/// Balancer V2 vault.
pub static BALANCER_VAULT: Lazy<Abi> = Lazy::new(|| {
    parse(
        r#"[
        {
            "inputs": [{"name": "poolId", "type": "bytes32"}],
            "name": "getPoolTokens",
            "outputs": [
                {"name": "tokens", "type": "address[]"},
                {"name": "balances", "type": "uint256[]"},
                {"name": "lastChangeBlock", "type": "uint256"}
            ],
            "stateMutability": "view",
            "type": "function"
        }
    ]"#,
    )
});
