//! Applies decoded events to the community store.
//!
//! Every handler must be safe to run twice for the same log and safe to run
//! concurrently with itself: replay and the live subscription overlap at their
//! boundary and both feed this router.

mod admin;
mod community;
mod governance;
mod legacy;
mod token;

use std::{str::FromStr, sync::Arc, time::Duration};

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use common::config::IngestionSettings;
use eyre::WrapErr;
use tokio::{sync::Mutex, task::JoinSet};
use tracing::warn;

use crate::{
    addresses::ContractAddresses,
    decoder::{ContractEvent, ContractFamily, DecodedEvent},
    progress::ReplayFloor,
    provider::ChainProvider,
    registry::{CommunityRecord, CommunityRegistry},
    store::CommunityStore,
    types::ChainLog,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterSettings {
    /// Transfers below this amount are not beneficiary activity.
    pub dust_threshold: U256,
    pub legacy_retry_interval: Duration,
    pub legacy_retry_attempts: u32,
}

impl TryFrom<&IngestionSettings> for RouterSettings {
    type Error = eyre::Report;

    fn try_from(settings: &IngestionSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            dust_threshold: U256::from_str(&settings.dust_threshold).wrap_err_with(|| {
                format!("Invalid dust threshold {}", settings.dust_threshold)
            })?,
            legacy_retry_interval: Duration::from_millis(settings.legacy_manager_retry_interval_ms),
            legacy_retry_attempts: settings.legacy_manager_retry_attempts,
        })
    }
}

#[derive(Clone)]
pub struct EventRouter {
    store: Arc<dyn CommunityStore>,
    provider: Arc<dyn ChainProvider>,
    registry: CommunityRegistry,
    addresses: ContractAddresses,
    settings: RouterSettings,
    floor: Arc<ReplayFloor>,
    retries: Arc<Mutex<JoinSet<()>>>,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn CommunityStore>,
        provider: Arc<dyn ChainProvider>,
        registry: CommunityRegistry,
        addresses: ContractAddresses,
        settings: RouterSettings,
        floor: Arc<ReplayFloor>,
    ) -> Self {
        Self {
            store,
            provider,
            registry,
            addresses,
            settings,
            floor,
            retries: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Returns whether the event was recognised. Errors are failures to apply a
    /// recognised event; domain anomalies are logged and reported as handled.
    pub async fn route(&self, event: &DecodedEvent) -> eyre::Result<bool> {
        let log = &event.log;
        match (&event.event, event.family) {
            (ContractEvent::Token(e), _) => self.handle_token(e, log).await,
            (ContractEvent::Community(e), ContractFamily::Other) => self.handle_legacy(e, log).await,
            (ContractEvent::Community(e), _) => self.handle_community(e, log).await,
            (ContractEvent::Admin(e), _) => self.handle_admin(e, log).await,
            (ContractEvent::Governance(e), _) => self.handle_governance(e, log).await,
        }
    }

    #[cfg(test)]
    pub(crate) async fn settle_retries(&self) {
        let mut retries = self.retries.lock().await;
        while retries.join_next().await.is_some() {}
    }

    /// Registry first, then the store. A store hit is backfilled into the registry.
    async fn resolve_community(&self, address: Address) -> eyre::Result<Option<CommunityRecord>> {
        if let Some(record) = self.registry.get(&address) {
            return Ok(Some(record));
        }

        let found = self.store.find_community_by_address(address).await?;
        if let Some(record) = &found {
            warn!(%address, id = record.internal_id, "Community missing from registry, backfilled from store");
            self.registry.upsert(record.clone());
        }
        Ok(found)
    }

    async fn block_time(&self, log: &ChainLog) -> eyre::Result<DateTime<Utc>> {
        Ok(self.provider.block_timestamp(log.block_hash).await?)
    }
}
