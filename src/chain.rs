//! Read-only chain access.
//!
//! Everything the scanner learns about pools and tokens goes through
//! [`ChainReader::call`], a plain `eth_call`. Strategies talk to it through a
//! [`ContractCaller`], which does the ABI work and bounds every call with a timeout.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::{
    abi::{Function, Token as AbiToken},
    providers::Middleware,
    types::{transaction::eip2718::TypedTransaction, Address, BlockId, Bytes, TransactionRequest},
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::ScanError;

/// Read-only transport: executes a call against a fixed chain state.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

/// [`ChainReader`] backed by any ethers middleware, optionally pinned to a block.
pub struct EthersChainReader<M> {
    client: Arc<M>,
    block: Option<BlockId>,
}

impl<M: Middleware + 'static> EthersChainReader<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self {
            client,
            block: None,
        }
    }

    /// Pin every call to `block` so a whole scan reads one consistent state.
    pub fn at_block(mut self, block: u64) -> Self {
        self.block = Some(BlockId::from(block));
        self
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainReader for EthersChainReader<M> {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client
            .call(&tx, self.block)
            .await
            .map_err(|e| anyhow!("eth_call to {:?} failed: {}", to, e))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Decode(String),
}

impl CallError {
    /// Timeouts keep their own kind; everything else becomes `otherwise`.
    pub fn into_scan_error(self, otherwise: fn(String) -> ScanError) -> ScanError {
        match self {
            CallError::Timeout(message) => ScanError::Timeout(message),
            CallError::Transport(message) | CallError::Decode(message) => otherwise(message),
        }
    }
}

/// ABI-aware, time-bounded front end over a [`ChainReader`].
#[derive(Clone)]
pub struct ContractCaller {
    chain: Arc<dyn ChainReader>,
    timeout: Duration,
}

impl ContractCaller {
    pub fn new(chain: Arc<dyn ChainReader>, timeout: Duration) -> Self {
        Self { chain, timeout }
    }

    /// Issue a call with pre-encoded calldata and return the raw output.
    pub async fn call_raw(
        &self,
        to: Address,
        data: Vec<u8>,
        label: &str,
    ) -> Result<Bytes, CallError> {
        match tokio::time::timeout(self.timeout, self.chain.call(to, Bytes::from(data))).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(CallError::Transport(format!("{} on {:?}: {}", label, to, e))),
            Err(_) => Err(CallError::Timeout(format!(
                "{} on {:?} exceeded {:?}",
                label, to, self.timeout
            ))),
        }
    }

    /// Encode `function(args)`, call `to`, and decode the declared outputs.
    pub async fn call(
        &self,
        to: Address,
        function: &Function,
        args: &[AbiToken],
    ) -> Result<Vec<AbiToken>, CallError> {
        let data = function
            .encode_input(args)
            .map_err(|e| CallError::Decode(format!("cannot encode {}: {}", function.name, e)))?;
        let output = self.call_raw(to, data, &function.name).await?;
        function.decode_output(&output).map_err(|e| {
            CallError::Decode(format!(
                "malformed {} response from {:?}: {}",
                function.name, to, e
            ))
        })
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum StubResponse {
        Output(Bytes),
        Fail(String),
        Hang,
    }

    /// Canned chain state keyed by (contract, calldata). Unknown calls revert.
    #[derive(Default)]
    pub(crate) struct StubChain {
        responses: Mutex<HashMap<(Address, Vec<u8>), StubResponse>>,
        calls: AtomicUsize,
    }

    impl StubChain {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        fn insert(&self, to: Address, function: &Function, args: &[AbiToken], response: StubResponse) {
            let data = function.encode_input(args).unwrap();
            self.responses.lock().unwrap().insert((to, data), response);
        }

        pub(crate) fn respond(&self, to: Address, function: &Function, args: &[AbiToken], output: &[AbiToken]) {
            let bytes = Bytes::from(ethers::abi::encode(output));
            self.insert(to, function, args, StubResponse::Output(bytes));
        }

        pub(crate) fn respond_raw(&self, to: Address, function: &Function, args: &[AbiToken], output: Vec<u8>) {
            self.insert(to, function, args, StubResponse::Output(Bytes::from(output)));
        }

        pub(crate) fn fail(&self, to: Address, function: &Function, args: &[AbiToken], message: &str) {
            self.insert(to, function, args, StubResponse::Fail(message.to_string()));
        }

        pub(crate) fn hang(&self, to: Address, function: &Function, args: &[AbiToken]) {
            self.insert(to, function, args, StubResponse::Hang);
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainReader for StubChain {
        async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let hang = {
                let responses = self.responses.lock().unwrap();
                match responses.get(&(to, data.to_vec())) {
                    Some(StubResponse::Output(bytes)) => return Ok(bytes.clone()),
                    Some(StubResponse::Fail(message)) => return Err(anyhow!("{}", message)),
                    Some(StubResponse::Hang) => true,
                    None => false,
                }
            };
            if hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Err(anyhow!("execution reverted"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubChain;
    use super::*;
    use crate::dex::abi::ERC20;

    fn caller(chain: Arc<StubChain>, timeout_ms: u64) -> ContractCaller {
        ContractCaller::new(chain, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_call_decodes_output() {
        let token = Address::from_low_u64_be(7);
        let decimals = ERC20.function("decimals").unwrap();
        let chain = Arc::new(StubChain::new());
        chain.respond(token, decimals, &[], &[AbiToken::Uint(18u8.into())]);

        let out = caller(chain.clone(), 1_000).call(token, decimals, &[]).await.unwrap();
        assert_eq!(out, vec![AbiToken::Uint(18u8.into())]);
        assert_eq!(chain.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_and_timeout() {
        let token = Address::from_low_u64_be(7);
        let decimals = ERC20.function("decimals").unwrap();
        let symbol = ERC20.function("symbol").unwrap();
        let chain = Arc::new(StubChain::new());
        chain.fail(token, decimals, &[], "connection refused");
        chain.hang(token, symbol, &[]);
        let caller = caller(chain, 50);

        let err = caller.call(token, decimals, &[]).await.unwrap_err();
        assert!(matches!(err, CallError::Transport(ref m) if m.contains("connection refused")));

        let err = caller.call(token, symbol, &[]).await.unwrap_err();
        assert!(matches!(err, CallError::Timeout(_)));
        assert!(matches!(
            err.into_scan_error(ScanError::MetadataUnavailable),
            ScanError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_malformed_output_is_decode_error() {
        let token = Address::from_low_u64_be(7);
        let decimals = ERC20.function("decimals").unwrap();
        let chain = Arc::new(StubChain::new());
        chain.respond_raw(token, decimals, &[], vec![0x01, 0x02]);

        let err = caller(chain, 1_000).call(token, decimals, &[]).await.unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
        assert!(matches!(
            err.into_scan_error(ScanError::ReserveUnavailable),
            ScanError::ReserveUnavailable(_)
        ));
    }
}
