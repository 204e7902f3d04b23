use alloy::transports::{RpcError, TransportError};
use generic_indexer::signal::{FailureChannel, ProviderErrorHeuristic};

use crate::decoder::ContractFamily;

#[derive(Debug)]
pub enum ParserError {
    MissingTransactionHash,
    MissingBlockNumber,
    MissingBlockHash,
    MissingLogIndex,
    DecodeError {
        family: ContractFamily,
        event_type: &'static str,
        source: alloy::sol_types::Error,
    },
    NumberOverflow {
        field: &'static str,
    },
}

impl std::error::Error for ParserError {}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserError::MissingTransactionHash => write!(f, "Missing transaction hash in log"),
            ParserError::MissingBlockNumber => write!(f, "Missing block number in log"),
            ParserError::MissingBlockHash => write!(f, "Missing block hash in log"),
            ParserError::MissingLogIndex => write!(f, "Missing log index in log"),
            ParserError::DecodeError {
                family,
                event_type,
                source,
            } => write!(
                f,
                "Failed to decode {} event from {} contract: {}",
                event_type, family, source
            ),
            ParserError::NumberOverflow { field } => {
                write!(f, "{} does not fit the storage type", field)
            }
        }
    }
}

/// Failures talking to a chain endpoint. `method` and `endpoint` are part of the
/// message so that provider-fatal errors can be recognised from the text alone.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{method} via {endpoint}: transport error: {message}")]
    Transport {
        endpoint: String,
        method: &'static str,
        message: String,
    },
    #[error("{method} via {endpoint}: rpc error {code}: {message}")]
    Rpc {
        endpoint: String,
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("{method} via {endpoint}: {what} not found")]
    NotFound {
        endpoint: String,
        method: &'static str,
        what: String,
    },
    #[error("{method} via {endpoint}: contract call failed: {message}")]
    Contract {
        endpoint: String,
        method: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn from_transport(endpoint: &str, method: &'static str, err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => ProviderError::Rpc {
                endpoint: endpoint.to_string(),
                method,
                code: payload.code,
                message: payload.message.to_string(),
            },
            other => ProviderError::Transport {
                endpoint: endpoint.to_string(),
                method,
                message: other.to_string(),
            },
        }
    }

    /// Which failover channel, if any, this error should trip.
    ///
    /// Transport failures always count against connectivity. JSON-RPC error
    /// responses only do when they look like the upstream provider itself is failing;
    /// a reverted call or an oversized range is a request problem, not a provider one.
    pub fn failure_channel(&self, heuristic: &ProviderErrorHeuristic) -> Option<FailureChannel> {
        match self {
            ProviderError::Transport { .. } => Some(FailureChannel::Connectivity),
            ProviderError::Rpc { .. } | ProviderError::Contract { .. } => heuristic
                .is_fatal(&self.to_string())
                .then_some(FailureChannel::Connectivity),
            ProviderError::NotFound { .. } => None,
        }
    }
}
