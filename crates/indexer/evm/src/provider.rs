use std::pin::Pin;

use alloy::{
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::Log,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::RpcEndpoint;
use eyre::WrapErr;
use futures_util::{future, Stream, StreamExt};
use tracing::{debug, warn};

use crate::{
    contracts::ICommunity, error::ProviderError, filter::LogFilter, store::CommunityParams,
    types::ChainLog,
};

pub type LogStream = Pin<Box<dyn Stream<Item = ChainLog> + Send>>;

/// The chain calls the pipeline makes. One instance per configured endpoint.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Host of the endpoint, for logs and error classification.
    fn endpoint(&self) -> &str;

    async fn block_number(&self) -> Result<u64, ProviderError>;

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainLog>, ProviderError>;

    /// The stream ends when the underlying subscription is closed.
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ProviderError>;

    /// Sender of the transaction, taken from its receipt.
    async fn transaction_sender(&self, tx_hash: B256) -> Result<Address, ProviderError>;

    async fn block_timestamp(&self, block_hash: B256) -> Result<DateTime<Utc>, ProviderError>;

    async fn community_params(&self, community: Address)
        -> Result<CommunityParams, ProviderError>;
}

#[derive(Clone)]
pub struct EvmProvider {
    http: DynProvider,
    ws_url: String,
    endpoint: String,
}

impl EvmProvider {
    pub fn new(rpc: &RpcEndpoint) -> eyre::Result<Self> {
        let url: Url = rpc
            .http_rpc_url
            .parse()
            .wrap_err_with(|| format!("Invalid Http URL {}", rpc.http_rpc_url))?;
        let endpoint = url.host_str().unwrap_or_default().to_string();
        let http = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            http,
            ws_url: rpc.ws_rpc_url.clone(),
            endpoint,
        })
    }

    fn rpc_error(&self, method: &'static str, e: alloy::transports::TransportError) -> ProviderError {
        ProviderError::from_transport(&self.endpoint, method, e)
    }

    fn contract_error(&self, e: alloy::contract::Error) -> ProviderError {
        ProviderError::Contract {
            endpoint: self.endpoint.clone(),
            method: "eth_call",
            message: e.to_string(),
        }
    }

    /// Each subscription gets its own socket so that a re-armed pipeline never reuses
    /// a connection the previous subscription saw die.
    async fn connect_ws(&self) -> Result<DynProvider, ProviderError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.ws_url.clone()))
            .await
            .map_err(|e| self.rpc_error("eth_subscribe", e))?;
        Ok(provider.erased())
    }
}

fn to_chain_log(log: Log) -> Option<ChainLog> {
    ChainLog::try_from(log)
        .map_err(|e| warn!("Dropping log without position: {}", e))
        .ok()
}

#[async_trait]
impl ChainProvider for EvmProvider {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.http
            .get_block_number()
            .await
            .map_err(|e| self.rpc_error("eth_blockNumber", e))
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainLog>, ProviderError> {
        let logs = self
            .http
            .get_logs(&filter.to_range_filter(from_block, to_block))
            .await
            .map_err(|e| self.rpc_error("eth_getLogs", e))?;

        Ok(logs.into_iter().filter_map(to_chain_log).collect())
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogStream, ProviderError> {
        let ws = self.connect_ws().await?;
        let subscription = ws
            .subscribe_logs(&filter.to_filter())
            .await
            .map_err(|e| self.rpc_error("eth_subscribe", e))?;
        debug!(endpoint = %self.endpoint, "Log subscription opened");

        let stream = subscription.into_stream().filter_map(move |log| {
            // the socket lives as long as the stream
            let _ws = &ws;
            future::ready(to_chain_log(log))
        });
        Ok(Box::pin(stream))
    }

    async fn transaction_sender(&self, tx_hash: B256) -> Result<Address, ProviderError> {
        let receipt = self
            .http
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.rpc_error("eth_getTransactionReceipt", e))?
            .ok_or_else(|| ProviderError::NotFound {
                endpoint: self.endpoint.clone(),
                method: "eth_getTransactionReceipt",
                what: format!("receipt {tx_hash}"),
            })?;
        Ok(receipt.from)
    }

    async fn block_timestamp(&self, block_hash: B256) -> Result<DateTime<Utc>, ProviderError> {
        let not_found = || ProviderError::NotFound {
            endpoint: self.endpoint.clone(),
            method: "eth_getBlockByHash",
            what: format!("block {block_hash}"),
        };

        let block = self
            .http
            .get_block_by_hash(block_hash)
            .await
            .map_err(|e| self.rpc_error("eth_getBlockByHash", e))?
            .ok_or_else(not_found)?;

        i64::try_from(block.header.timestamp)
            .ok()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .ok_or_else(not_found)
    }

    async fn community_params(
        &self,
        community: Address,
    ) -> Result<CommunityParams, ProviderError> {
        let contract = ICommunity::new(community, self.http.clone());

        let claim_amount = contract
            .claimAmount()
            .call()
            .await
            .map_err(|e| self.contract_error(e))?;
        let max_claim = contract
            .maxClaim()
            .call()
            .await
            .map_err(|e| self.contract_error(e))?;
        let base_interval = contract
            .baseInterval()
            .call()
            .await
            .map_err(|e| self.contract_error(e))?;
        let increment_interval = contract
            .incrementInterval()
            .call()
            .await
            .map_err(|e| self.contract_error(e))?;
        // first generation contracts have no decrease step
        let decrease_step = contract.decreaseStep().call().await.ok();

        Ok(CommunityParams {
            claim_amount,
            max_claim,
            decrease_step,
            base_interval,
            increment_interval,
        })
    }
}
