pub mod addresses;
pub mod contracts;
pub mod db;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod live;
pub mod processor;
pub mod progress;
pub mod provider;
pub mod recovery;
pub mod registry;
pub mod router;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
