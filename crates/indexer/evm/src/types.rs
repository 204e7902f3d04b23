use alloy::{
    primitives::{Address, Bytes, B256},
    rpc::types::Log,
};

use crate::error::ParserError;

/// A mined log with every positional field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub address: Address,
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl ChainLog {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

impl TryFrom<Log> for ChainLog {
    type Error = ParserError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        let block_number = log.block_number.ok_or(ParserError::MissingBlockNumber)?;
        let block_hash = log.block_hash.ok_or(ParserError::MissingBlockHash)?;
        let transaction_hash = log
            .transaction_hash
            .ok_or(ParserError::MissingTransactionHash)?;
        let log_index = log.log_index.ok_or(ParserError::MissingLogIndex)?;

        Ok(Self {
            address: log.inner.address,
            block_number,
            block_hash,
            transaction_hash,
            log_index,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, LogData};

    use super::*;

    #[test]
    fn pending_logs_are_rejected() {
        let log = Log {
            inner: alloy::primitives::Log {
                address: address!("0x0000000000000000000000000000000000000001"),
                data: LogData::new_unchecked(vec![B256::ZERO], Bytes::new()),
            },
            ..Default::default()
        };

        assert!(matches!(
            ChainLog::try_from(log),
            Err(ParserError::MissingBlockNumber)
        ));
    }
}
