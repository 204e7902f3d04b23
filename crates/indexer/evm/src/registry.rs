use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use alloy::primitives::Address;
use tracing::{debug, info};

use crate::store::CommunityStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityRecord {
    pub contract_address: Address,
    pub internal_id: i32,
    pub public_id: String,
    pub is_public: bool,
}

#[derive(Debug, Default)]
struct Inner {
    communities: HashMap<Address, CommunityRecord>,
    public_beneficiaries: HashSet<Address>,
}

/// In-memory index of known community contracts and of beneficiaries of public
/// communities. Shared by the decoder and every handler; the lock is never held
/// across an await point.
#[derive(Debug, Clone, Default)]
pub struct CommunityRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl CommunityRegistry {
    /// Seeds the registry from persistent storage. Failure here aborts startup.
    pub async fn load(store: &dyn CommunityStore) -> eyre::Result<Self> {
        let communities = store.communities().await?;
        let beneficiaries = store.public_beneficiaries().await?;

        let registry = Self::default();
        {
            let mut inner = registry.write();
            inner.communities = communities
                .into_iter()
                .map(|c| (c.contract_address, c))
                .collect();
            inner.public_beneficiaries = beneficiaries.into_iter().collect();
            info!(
                communities = inner.communities.len(),
                public_beneficiaries = inner.public_beneficiaries.len(),
                "Community registry loaded"
            );
        }
        Ok(registry)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, address: &Address) -> Option<CommunityRecord> {
        self.read().communities.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.read().communities.contains_key(address)
    }

    /// Adds a community, or refreshes its visibility. The internal and public ids of an
    /// address never change once registered.
    pub fn upsert(&self, record: CommunityRecord) {
        let mut inner = self.write();
        match inner.communities.get_mut(&record.contract_address) {
            Some(existing) => {
                if existing.internal_id != record.internal_id {
                    debug!(
                        address = %record.contract_address,
                        kept = existing.internal_id,
                        ignored = record.internal_id,
                        "Community id is immutable, keeping registered id"
                    );
                }
                existing.is_public = record.is_public;
            }
            None => {
                inner.communities.insert(record.contract_address, record);
            }
        }
    }

    pub fn add_public_beneficiary(&self, address: Address) {
        self.write().public_beneficiaries.insert(address);
    }

    pub fn is_public_beneficiary(&self, address: &Address) -> bool {
        self.read().public_beneficiaries.contains(address)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    fn record(id: i32, is_public: bool) -> CommunityRecord {
        CommunityRecord {
            contract_address: address!("0x00000000000000000000000000000000000000c1"),
            internal_id: id,
            public_id: format!("community-{id}"),
            is_public,
        }
    }

    #[test]
    fn ids_are_immutable_once_registered() {
        let registry = CommunityRegistry::default();
        registry.upsert(record(1, false));
        registry.upsert(record(2, true));

        let stored = registry.get(&record(1, false).contract_address).unwrap();
        assert_eq!(stored.internal_id, 1);
        assert_eq!(stored.public_id, "community-1");
        assert!(stored.is_public);
    }

    #[test]
    fn tracks_public_beneficiaries() {
        let registry = CommunityRegistry::default();
        let beneficiary = address!("0x00000000000000000000000000000000000000b1");

        assert!(!registry.is_public_beneficiary(&beneficiary));
        registry.add_public_beneficiary(beneficiary);
        assert!(registry.is_public_beneficiary(&beneficiary));
    }
}
