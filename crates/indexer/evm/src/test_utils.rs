//! In-memory collaborators and log builders for pipeline tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy::{
    primitives::{address, keccak256, Address, B256, U256},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;
use generic_indexer::signal::{failure_channel, ProviderErrorHeuristic, SignalReceiver};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    addresses::ContractAddresses,
    decoder::EventDecoder,
    error::ProviderError,
    filter::LogFilter,
    processor::{LogProcessor, ProcessOutcome},
    progress::ReplayFloor,
    provider::{ChainProvider, LogStream},
    registry::{CommunityRecord, CommunityRegistry},
    router::{EventRouter, RouterSettings},
    store::{
        BeneficiaryChange, BeneficiaryTransfer, Claim, CommunityParams, CommunityStore, Inflow,
        MetadataStore, PendingCommunity, ProposalStatus,
    },
    types::ChainLog,
};

pub const TOKEN: Address = address!("0x00000000000000000000000000000000000000a1");
pub const ADMIN: Address = address!("0x00000000000000000000000000000000000000a2");
pub const GOVERNANCE: Address = address!("0x00000000000000000000000000000000000000a3");
pub const TREASURY: Address = address!("0x00000000000000000000000000000000000000a4");
pub const ATTESTATION: Address = address!("0x00000000000000000000000000000000000000a5");

pub fn contract_addresses() -> ContractAddresses {
    ContractAddresses {
        token: TOKEN,
        community_admin: ADMIN,
        governance: GOVERNANCE,
        treasury: TREASURY,
        attestation: ATTESTATION,
    }
}

pub fn router_settings() -> RouterSettings {
    RouterSettings {
        dust_threshold: U256::from(1_000u64),
        legacy_retry_interval: Duration::from_millis(5),
        legacy_retry_attempts: 3,
    }
}

pub fn heuristic() -> ProviderErrorHeuristic {
    ProviderErrorHeuristic::new(&["forno".to_string()])
}

pub fn params(claim_amount: u64) -> CommunityParams {
    CommunityParams {
        claim_amount: U256::from(claim_amount),
        max_claim: U256::from(claim_amount * 100),
        decrease_step: Some(U256::from(10u64)),
        base_interval: U256::from(17_280u64),
        increment_interval: U256::from(60u64),
    }
}

pub fn addr(n: u64) -> Address {
    Address::left_padding_from(&n.to_be_bytes())
}

static NEXT_TX: AtomicU64 = AtomicU64::new(1);

/// A log for `event` emitted by `address`, in its own transaction.
pub fn log_for<E: SolEvent>(address: Address, block: u64, event: &E) -> ChainLog {
    let data = event.encode_log_data();
    let tx = NEXT_TX.fetch_add(1, Ordering::SeqCst);

    ChainLog {
        address,
        block_number: block,
        block_hash: keccak256(block.to_be_bytes()),
        transaction_hash: keccak256(tx.to_be_bytes()),
        log_index: 0,
        topics: data.topics().to_vec(),
        data: data.data,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredStatus {
    Pending,
    Valid,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCommunity {
    pub id: i32,
    pub public_id: String,
    pub requested_by: Address,
    pub contract: Option<Address>,
    pub status: StoredStatus,
    pub is_public: bool,
    pub params: CommunityParams,
    pub blocked: bool,
    pub proposal_id: Option<u64>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl StoredCommunity {
    pub fn pending(id: i32, requested_by: Address, params: CommunityParams) -> Self {
        Self {
            id,
            public_id: format!("community-{id}"),
            requested_by,
            contract: None,
            status: StoredStatus::Pending,
            is_public: true,
            params,
            blocked: false,
            proposal_id: None,
            removed_at: None,
        }
    }

    pub fn valid(id: i32, contract: Address, is_public: bool) -> Self {
        Self {
            contract: Some(contract),
            status: StoredStatus::Valid,
            is_public,
            ..Self::pending(id, addr(id as u64 + 0x1000), params(1_000))
        }
    }

    fn record(&self) -> Option<CommunityRecord> {
        Some(CommunityRecord {
            contract_address: self.contract?,
            internal_id: self.id,
            public_id: self.public_id.clone(),
            is_public: self.is_public,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBeneficiary {
    pub added_by: Address,
    pub active: bool,
    pub tx_hash: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredManager {
    pub active: bool,
    pub blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredProposal {
    pub community_id: i32,
    pub status: ProposalStatus,
    pub end_block: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    pub communities: BTreeMap<i32, StoredCommunity>,
    pub beneficiaries: BTreeMap<(Address, i32), StoredBeneficiary>,
    pub managers: BTreeMap<(Address, i32), StoredManager>,
    pub claims: Vec<Claim>,
    pub inflows: Vec<Inflow>,
    pub transfers: Vec<BeneficiaryTransfer>,
    pub proposals: BTreeMap<u64, StoredProposal>,
    pub last_processed_block: Option<u64>,
    pub recovery_checkpoint: Option<u64>,
}

/// Both store traits over one mutex-guarded state, with the same idempotency
/// rules as the Postgres implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_metadata_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_communities(communities: impl IntoIterator<Item = StoredCommunity>) -> Self {
        let store = Self::default();
        store.update(|s| {
            for community in communities {
                s.communities.insert(community.id, community);
            }
        });
        store
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn fail_metadata_writes(&self, fail: bool) {
        self.fail_metadata_writes.store(fail, Ordering::SeqCst);
    }

    fn metadata_write(&self, f: impl FnOnce(&mut MemoryState)) -> Result<()> {
        if self.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(eyre::eyre!("sync_state is read-only"));
        }
        self.update(f);
        Ok(())
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn communities(&self) -> Result<Vec<CommunityRecord>> {
        Ok(self.update(|s| {
            s.communities
                .values()
                .filter(|c| c.status == StoredStatus::Valid)
                .filter_map(StoredCommunity::record)
                .collect()
        }))
    }

    async fn public_beneficiaries(&self) -> Result<Vec<Address>> {
        Ok(self.update(|s| {
            s.beneficiaries
                .iter()
                .filter(|((_, id), b)| {
                    b.active
                        && s.communities
                            .get(id)
                            .is_some_and(|c| c.is_public && c.status == StoredStatus::Valid)
                })
                .map(|((address, _), _)| *address)
                .collect()
        }))
    }

    async fn find_community_by_address(&self, address: Address) -> Result<Option<CommunityRecord>> {
        Ok(self.update(|s| {
            s.communities
                .values()
                .find(|c| c.contract == Some(address))
                .and_then(StoredCommunity::record)
        }))
    }

    async fn find_pending_community(&self, requester: Address) -> Result<Option<PendingCommunity>> {
        Ok(self.update(|s| {
            s.communities
                .values()
                .find(|c| c.status == StoredStatus::Pending && c.requested_by == requester)
                .map(|c| PendingCommunity {
                    id: c.id,
                    public_id: c.public_id.clone(),
                    is_public: c.is_public,
                    params: c.params,
                })
        }))
    }

    async fn add_beneficiary(&self, change: &BeneficiaryChange) -> Result<()> {
        self.update(|s| {
            s.beneficiaries.insert(
                (change.beneficiary, change.community_id),
                StoredBeneficiary {
                    added_by: change.manager,
                    active: true,
                    tx_hash: change.tx_hash,
                },
            );
        });
        Ok(())
    }

    async fn remove_beneficiary(&self, change: &BeneficiaryChange) -> Result<()> {
        self.update(|s| {
            if let Some(b) = s.beneficiaries.get_mut(&(change.beneficiary, change.community_id)) {
                b.active = false;
                b.tx_hash = change.tx_hash;
            }
        });
        Ok(())
    }

    async fn record_beneficiary_transfers(&self, transfers: &[BeneficiaryTransfer]) -> Result<()> {
        self.update(|s| {
            for transfer in transfers {
                let exists = s.transfers.iter().any(|t| {
                    t.tx_hash == transfer.tx_hash
                        && t.log_index == transfer.log_index
                        && t.beneficiary == transfer.beneficiary
                });
                if !exists {
                    s.transfers.push(transfer.clone());
                }
            }
        });
        Ok(())
    }

    async fn add_claim(&self, claim: &Claim) -> Result<()> {
        self.update(|s| {
            let exists = s
                .claims
                .iter()
                .any(|c| c.tx_hash == claim.tx_hash && c.log_index == claim.log_index);
            if !exists {
                s.claims.push(claim.clone());
            }
        });
        Ok(())
    }

    async fn add_inflow(&self, inflow: &Inflow) -> Result<()> {
        self.update(|s| {
            let exists = s
                .inflows
                .iter()
                .any(|i| i.tx_hash == inflow.tx_hash && i.log_index == inflow.log_index);
            if !exists {
                s.inflows.push(inflow.clone());
            }
        });
        Ok(())
    }

    async fn add_manager(&self, manager: Address, community_id: i32) -> Result<()> {
        self.update(|s| {
            s.managers
                .entry((manager, community_id))
                .or_insert(StoredManager {
                    active: true,
                    blocked: false,
                })
                .active = true;
        });
        Ok(())
    }

    async fn remove_manager(&self, manager: Address, community_id: i32) -> Result<()> {
        self.update(|s| {
            s.managers
                .entry((manager, community_id))
                .or_insert(StoredManager {
                    active: false,
                    blocked: false,
                })
                .active = false;
        });
        Ok(())
    }

    async fn set_manager_blocked(
        &self,
        manager: Address,
        community_id: i32,
        blocked: bool,
    ) -> Result<()> {
        self.update(|s| {
            s.managers
                .entry((manager, community_id))
                .or_insert(StoredManager {
                    active: true,
                    blocked,
                })
                .blocked = blocked;
        });
        Ok(())
    }

    async fn update_community_params(&self, community_id: i32, params: &CommunityParams) -> Result<()> {
        self.update(|s| {
            if let Some(c) = s.communities.get_mut(&community_id) {
                let decrease_step = params.decrease_step.or(c.params.decrease_step);
                c.params = CommunityParams {
                    decrease_step,
                    ..*params
                };
            }
        });
        Ok(())
    }

    async fn set_community_blocked(&self, community_id: i32, blocked: bool) -> Result<()> {
        self.update(|s| {
            if let Some(c) = s.communities.get_mut(&community_id) {
                c.blocked = blocked;
            }
        });
        Ok(())
    }

    async fn mark_community_valid(&self, community_id: i32, contract: Address) -> Result<u64> {
        Ok(self.update(|s| match s.communities.get_mut(&community_id) {
            Some(c) if c.status == StoredStatus::Pending => {
                c.status = StoredStatus::Valid;
                c.contract = Some(contract);
                1
            }
            _ => 0,
        }))
    }

    async fn remove_community(&self, community_id: i32, at: DateTime<Utc>) -> Result<()> {
        self.update(|s| {
            if let Some(c) = s.communities.get_mut(&community_id) {
                c.status = StoredStatus::Removed;
                c.removed_at = Some(at);
            }
            for ((_, id), b) in s.beneficiaries.iter_mut() {
                if *id == community_id {
                    b.active = false;
                }
            }
        });
        Ok(())
    }

    async fn migrate_community(&self, community_id: i32, previous: Address, new: Address) -> Result<u64> {
        Ok(self.update(|s| {
            let Some(c) = s.communities.get_mut(&community_id) else {
                return 0;
            };
            c.contract = Some(new);
            for inflow in s.inflows.iter_mut().filter(|i| i.contract_address == previous) {
                inflow.contract_address = new;
            }
            1
        }))
    }

    async fn attach_proposal(&self, community_id: i32, proposal_id: u64, end_block: u64) -> Result<bool> {
        Ok(self.update(|s| {
            if let Some(c) = s.communities.get_mut(&community_id) {
                c.proposal_id = Some(proposal_id);
            }
            if s.proposals.contains_key(&proposal_id) {
                return false;
            }
            s.proposals.insert(
                proposal_id,
                StoredProposal {
                    community_id,
                    status: ProposalStatus::Pending,
                    end_block,
                },
            );
            true
        }))
    }

    async fn update_proposal_status(
        &self,
        proposal_id: u64,
        status: ProposalStatus,
        end_block: Option<u64>,
    ) -> Result<bool> {
        Ok(self.update(|s| match s.proposals.get_mut(&proposal_id) {
            Some(p) => {
                p.status = status;
                if let Some(end_block) = end_block {
                    p.end_block = end_block;
                }
                true
            }
            None => false,
        }))
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn last_processed_block(&self) -> Result<Option<u64>> {
        Ok(self.update(|s| s.last_processed_block))
    }

    async fn set_last_processed_block(&self, block: u64) -> Result<()> {
        self.metadata_write(|s| s.last_processed_block = Some(block))
    }

    async fn recovery_checkpoint(&self) -> Result<Option<u64>> {
        Ok(self.update(|s| s.recovery_checkpoint))
    }

    async fn set_recovery_checkpoint(&self, block: u64) -> Result<()> {
        self.metadata_write(|s| s.recovery_checkpoint = Some(block))
    }

    async fn clear_recovery_checkpoint(&self) -> Result<()> {
        self.metadata_write(|s| s.recovery_checkpoint = None)
    }
}

/// Scripted chain: a fixed set of past logs, a movable head and a live feed the test
/// pushes into.
#[derive(Debug, Default)]
pub struct MockProvider {
    head: AtomicU64,
    down: AtomicBool,
    stall_history: AtomicBool,
    fail_history: AtomicBool,
    logs: Mutex<Vec<ChainLog>>,
    senders: Mutex<HashMap<B256, Address>>,
    params: Mutex<HashMap<Address, CommunityParams>>,
    live: Mutex<Option<mpsc::UnboundedSender<ChainLog>>>,
    pub log_requests: Mutex<Vec<(u64, u64)>>,
}

impl MockProvider {
    pub fn new(head: u64) -> Self {
        let provider = Self::default();
        provider.set_head(head);
        provider
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Makes `get_logs` hang, leaving any replay unfinished.
    pub fn stall_history(&self, stall: bool) {
        self.stall_history.store(stall, Ordering::SeqCst);
    }

    /// Makes `get_logs` fail while the live feed keeps working.
    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: ChainLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn set_sender(&self, tx_hash: B256, sender: Address) {
        self.senders.lock().unwrap().insert(tx_hash, sender);
    }

    pub fn set_params(&self, community: Address, params: CommunityParams) {
        self.params.lock().unwrap().insert(community, params);
    }

    pub fn is_subscribed(&self) -> bool {
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Delivers `log` on the live feed. Returns false when nobody is subscribed.
    pub fn emit(&self, log: ChainLog) -> bool {
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(log).is_ok())
    }

    /// Ends the live feed as a dropped websocket would.
    pub fn close_feed(&self) {
        self.live.lock().unwrap().take();
    }

    fn check_up(&self, method: &'static str) -> Result<(), ProviderError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport {
                endpoint: self.endpoint().to_string(),
                method,
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    fn endpoint(&self) -> &str {
        "mock.forno.test"
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.check_up("eth_blockNumber")?;
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainLog>, ProviderError> {
        self.check_up("eth_getLogs")?;
        self.log_requests.lock().unwrap().push((from_block, to_block));
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ProviderError::Rpc {
                endpoint: self.endpoint().to_string(),
                method: "eth_getLogs",
                code: -32000,
                message: "upstream unavailable".to_string(),
            });
        }
        if self.stall_history.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| (from_block..=to_block).contains(&l.block_number) && filter.matches(l))
            .cloned()
            .collect())
    }

    async fn subscribe_logs(&self, _filter: &LogFilter) -> Result<LogStream, ProviderError> {
        self.check_up("eth_subscribe")?;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock().unwrap() = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn transaction_sender(&self, tx_hash: B256) -> Result<Address, ProviderError> {
        self.check_up("eth_getTransactionReceipt")?;
        self.senders
            .lock()
            .unwrap()
            .get(&tx_hash)
            .copied()
            .ok_or_else(|| ProviderError::NotFound {
                endpoint: self.endpoint().to_string(),
                method: "eth_getTransactionReceipt",
                what: format!("receipt {tx_hash}"),
            })
    }

    async fn block_timestamp(&self, block_hash: B256) -> Result<DateTime<Utc>, ProviderError> {
        self.check_up("eth_getBlockByHash")?;
        let offset = i64::from(block_hash[31]);
        DateTime::from_timestamp(1_700_000_000 + offset, 0).ok_or_else(|| ProviderError::NotFound {
            endpoint: self.endpoint().to_string(),
            method: "eth_getBlockByHash",
            what: format!("block {block_hash}"),
        })
    }

    async fn community_params(&self, community: Address) -> Result<CommunityParams, ProviderError> {
        self.check_up("eth_call")?;
        self.params
            .lock()
            .unwrap()
            .get(&community)
            .copied()
            .ok_or_else(|| ProviderError::Contract {
                endpoint: self.endpoint().to_string(),
                method: "eth_call",
                message: "execution reverted".to_string(),
            })
    }
}

/// Store, provider, registry and processor wired together the way the indexer does.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockProvider>,
    pub registry: CommunityRegistry,
    pub processor: LogProcessor,
    pub floor: Arc<ReplayFloor>,
    pub signals: SignalReceiver,
}

impl Harness {
    pub async fn new(store: MemoryStore, provider: MockProvider) -> Self {
        let store = Arc::new(store);
        let provider = Arc::new(provider);
        let registry = CommunityRegistry::load(store.as_ref()).await.unwrap();
        let (signal_tx, signals) = failure_channel();
        let floor = Arc::new(ReplayFloor::default());

        let router = EventRouter::new(
            store.clone(),
            provider.clone(),
            registry.clone(),
            contract_addresses(),
            router_settings(),
            floor.clone(),
        );
        let processor = LogProcessor::new(
            EventDecoder::new(contract_addresses(), registry.clone()),
            router,
            signal_tx,
            heuristic(),
            floor.clone(),
        );

        Self {
            store,
            provider,
            registry,
            processor,
            floor,
            signals,
        }
    }

    /// Returns whether the log was handled.
    pub async fn apply(&self, log: ChainLog) -> bool {
        self.processor.process(log).await == ProcessOutcome::Handled
    }
}
