use std::fmt;

use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolEvent,
};

use crate::{
    addresses::ContractAddresses,
    contracts::{CommunityAdmin, CommunityV1, CommunityV2, Governance, Token},
    error::ParserError,
    registry::CommunityRegistry,
    store::CommunityParams,
    types::ChainLog,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractFamily {
    Token,
    Community,
    Admin,
    Governance,
    /// Not a configured or registered contract. Decoded against the oldest community ABI.
    Other,
}

impl fmt::Display for ContractFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractFamily::Token => write!(f, "token"),
            ContractFamily::Community => write!(f, "community"),
            ContractFamily::Admin => write!(f, "community-admin"),
            ContractFamily::Governance => write!(f, "governance"),
            ContractFamily::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
}

/// Community events normalised across contract generations. `manager` is `None` when
/// the emitting ABI does not name the acting manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommunityEvent {
    BeneficiaryAdded {
        manager: Option<Address>,
        beneficiary: Address,
    },
    BeneficiaryRemoved {
        manager: Option<Address>,
        beneficiary: Address,
    },
    BeneficiaryClaim {
        beneficiary: Address,
        amount: U256,
    },
    ManagerAdded {
        manager: Option<Address>,
        account: Address,
    },
    ManagerRemoved {
        manager: Option<Address>,
        account: Address,
    },
    ManagerBlocked {
        manager: Address,
    },
    ManagerUnblocked {
        manager: Address,
    },
    ParamsUpdated(CommunityParams),
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminEvent {
    CommunityAdded {
        community: Address,
        managers: Vec<Address>,
        params: CommunityParams,
    },
    CommunityRemoved {
        community: Address,
    },
    CommunityMigrated {
        managers: Vec<Address>,
        community: Address,
        previous: Address,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceEvent {
    ProposalCreated {
        id: U256,
        signatures: Vec<String>,
        calldatas: Vec<Bytes>,
        end_block: U256,
    },
    ProposalCanceled {
        id: U256,
    },
    ProposalQueued {
        id: U256,
        eta: U256,
    },
    ProposalExecuted {
        id: U256,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
    Token(TokenEvent),
    Community(CommunityEvent),
    Admin(AdminEvent),
    Governance(GovernanceEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub family: ContractFamily,
    pub name: &'static str,
    pub event: ContractEvent,
    pub log: ChainLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(DecodedEvent),
    /// No schema for the log's family knows its topic.
    NoMatch { family: ContractFamily },
}

enum SchemaMatch<T> {
    Matched(&'static str, T),
    NoSignature,
    Malformed(&'static str, alloy::sol_types::Error),
}

type Schema<T> = fn(&ChainLog) -> SchemaMatch<T>;

/// Tried in order until one recognises the topic. Communities created by either
/// contract generation are still live.
const COMMUNITY_SCHEMAS: &[Schema<CommunityEvent>] = &[community_current, community_legacy];
const LEGACY_SCHEMAS: &[Schema<CommunityEvent>] = &[community_legacy];

#[derive(Debug, Clone)]
pub struct EventDecoder {
    addresses: ContractAddresses,
    registry: CommunityRegistry,
}

impl EventDecoder {
    pub fn new(addresses: ContractAddresses, registry: CommunityRegistry) -> Self {
        Self {
            addresses,
            registry,
        }
    }

    pub fn classify(&self, address: &Address) -> ContractFamily {
        if *address == self.addresses.token {
            ContractFamily::Token
        } else if self.registry.contains(address) {
            ContractFamily::Community
        } else if *address == self.addresses.community_admin {
            ContractFamily::Admin
        } else if *address == self.addresses.governance {
            ContractFamily::Governance
        } else {
            ContractFamily::Other
        }
    }

    pub fn decode(&self, log: ChainLog) -> Result<Decoded, ParserError> {
        let family = self.classify(&log.address);

        let outcome = match family {
            ContractFamily::Token => map(token_schema(&log), ContractEvent::Token),
            ContractFamily::Community => {
                map(first_match(&log, COMMUNITY_SCHEMAS), ContractEvent::Community)
            }
            ContractFamily::Admin => map(admin_schema(&log), ContractEvent::Admin),
            ContractFamily::Governance => map(governance_schema(&log), ContractEvent::Governance),
            ContractFamily::Other => {
                map(first_match(&log, LEGACY_SCHEMAS), ContractEvent::Community)
            }
        };

        match outcome {
            SchemaMatch::Matched(name, event) => Ok(Decoded::Event(DecodedEvent {
                family,
                name,
                event,
                log,
            })),
            SchemaMatch::NoSignature => Ok(Decoded::NoMatch { family }),
            SchemaMatch::Malformed(event_type, source) => Err(ParserError::DecodeError {
                family,
                event_type,
                source,
            }),
        }
    }
}

fn map<T, U>(outcome: SchemaMatch<T>, f: impl FnOnce(T) -> U) -> SchemaMatch<U> {
    match outcome {
        SchemaMatch::Matched(name, event) => SchemaMatch::Matched(name, f(event)),
        SchemaMatch::NoSignature => SchemaMatch::NoSignature,
        SchemaMatch::Malformed(name, e) => SchemaMatch::Malformed(name, e),
    }
}

fn first_match<T>(log: &ChainLog, schemas: &[Schema<T>]) -> SchemaMatch<T> {
    let mut outcome = SchemaMatch::NoSignature;
    for schema in schemas {
        match schema(log) {
            matched @ SchemaMatch::Matched(..) => return matched,
            malformed @ SchemaMatch::Malformed(..) => outcome = malformed,
            SchemaMatch::NoSignature => {}
        }
    }
    outcome
}

fn event_name(signature: &'static str) -> &'static str {
    signature
        .split_once('(')
        .map_or(signature, |(name, _)| name)
}

/// `None` when the log is not an `E`.
fn decode_as<E: SolEvent, T>(log: &ChainLog, f: impl FnOnce(E) -> T) -> Option<SchemaMatch<T>> {
    if log.topic0() != Some(&E::SIGNATURE_HASH) {
        return None;
    }

    let name = event_name(E::SIGNATURE);
    Some(match E::decode_raw_log(log.topics.iter().copied(), &log.data) {
        Ok(event) => SchemaMatch::Matched(name, f(event)),
        Err(e) => SchemaMatch::Malformed(name, e),
    })
}

fn token_schema(log: &ChainLog) -> SchemaMatch<TokenEvent> {
    decode_as::<Token::Transfer, _>(log, |e| TokenEvent::Transfer {
        from: e.from,
        to: e.to,
        value: e.value,
    })
    .unwrap_or(SchemaMatch::NoSignature)
}

fn community_current(log: &ChainLog) -> SchemaMatch<CommunityEvent> {
    use CommunityV2 as V2;

    decode_as::<V2::BeneficiaryAdded, _>(log, |e| CommunityEvent::BeneficiaryAdded {
        manager: Some(e.manager),
        beneficiary: e.beneficiary,
    })
    .or_else(|| {
        decode_as::<V2::BeneficiaryRemoved, _>(log, |e| CommunityEvent::BeneficiaryRemoved {
            manager: Some(e.manager),
            beneficiary: e.beneficiary,
        })
    })
    .or_else(|| {
        decode_as::<V2::BeneficiaryClaim, _>(log, |e| CommunityEvent::BeneficiaryClaim {
            beneficiary: e.beneficiary,
            amount: e.amount,
        })
    })
    .or_else(|| {
        decode_as::<V2::ManagerAdded, _>(log, |e| CommunityEvent::ManagerAdded {
            manager: Some(e.manager),
            account: e.account,
        })
    })
    .or_else(|| {
        decode_as::<V2::ManagerRemoved, _>(log, |e| CommunityEvent::ManagerRemoved {
            manager: Some(e.manager),
            account: e.account,
        })
    })
    .or_else(|| {
        decode_as::<V2::ManagerAddedToBlockList, _>(log, |e| CommunityEvent::ManagerBlocked {
            manager: e.manager,
        })
    })
    .or_else(|| {
        decode_as::<V2::ManagerRemovedFromBlockList, _>(log, |e| {
            CommunityEvent::ManagerUnblocked { manager: e.manager }
        })
    })
    .or_else(|| {
        decode_as::<V2::BeneficiaryParamsUpdated, _>(log, |e| {
            CommunityEvent::ParamsUpdated(CommunityParams {
                claim_amount: e.newClaimAmount,
                max_claim: e.newMaxClaim,
                decrease_step: Some(e.newDecreaseStep),
                base_interval: e.newBaseInterval,
                increment_interval: e.newIncrementInterval,
            })
        })
    })
    .or_else(|| decode_as::<V2::CommunityLocked, _>(log, |_| CommunityEvent::Locked))
    .or_else(|| decode_as::<V2::CommunityUnlocked, _>(log, |_| CommunityEvent::Unlocked))
    .unwrap_or(SchemaMatch::NoSignature)
}

fn community_legacy(log: &ChainLog) -> SchemaMatch<CommunityEvent> {
    use CommunityV1 as V1;

    decode_as::<V1::BeneficiaryAdded, _>(log, |e| CommunityEvent::BeneficiaryAdded {
        manager: None,
        beneficiary: e._account,
    })
    .or_else(|| {
        decode_as::<V1::BeneficiaryRemoved, _>(log, |e| CommunityEvent::BeneficiaryRemoved {
            manager: None,
            beneficiary: e._account,
        })
    })
    .or_else(|| {
        decode_as::<V1::BeneficiaryClaim, _>(log, |e| CommunityEvent::BeneficiaryClaim {
            beneficiary: e._account,
            amount: e._amount,
        })
    })
    .or_else(|| {
        decode_as::<V1::ManagerAdded, _>(log, |e| CommunityEvent::ManagerAdded {
            manager: None,
            account: e._account,
        })
    })
    .or_else(|| {
        decode_as::<V1::ManagerRemoved, _>(log, |e| CommunityEvent::ManagerRemoved {
            manager: None,
            account: e._account,
        })
    })
    .or_else(|| {
        // no decrease step in this generation
        decode_as::<V1::CommunityEdited, _>(log, |e| {
            CommunityEvent::ParamsUpdated(CommunityParams {
                claim_amount: e._claimAmount,
                max_claim: e._maxClaim,
                decrease_step: None,
                base_interval: e._baseInterval,
                increment_interval: e._incrementInterval,
            })
        })
    })
    .or_else(|| decode_as::<V1::CommunityLocked, _>(log, |_| CommunityEvent::Locked))
    .or_else(|| decode_as::<V1::CommunityUnlocked, _>(log, |_| CommunityEvent::Unlocked))
    .unwrap_or(SchemaMatch::NoSignature)
}

fn admin_schema(log: &ChainLog) -> SchemaMatch<AdminEvent> {
    use CommunityAdmin as Admin;

    decode_as::<Admin::CommunityAdded, _>(log, |e| AdminEvent::CommunityAdded {
        community: e.communityAddress,
        params: CommunityParams {
            claim_amount: e.claimAmount,
            max_claim: e.maxClaim,
            decrease_step: Some(e.decreaseStep),
            base_interval: e.baseInterval,
            increment_interval: e.incrementInterval,
        },
        managers: e.managers,
    })
    .or_else(|| {
        decode_as::<Admin::CommunityRemoved, _>(log, |e| AdminEvent::CommunityRemoved {
            community: e.communityAddress,
        })
    })
    .or_else(|| {
        decode_as::<Admin::CommunityMigrated, _>(log, |e| AdminEvent::CommunityMigrated {
            managers: e.managers,
            community: e.communityAddress,
            previous: e.previousCommunityAddress,
        })
    })
    .unwrap_or(SchemaMatch::NoSignature)
}

fn governance_schema(log: &ChainLog) -> SchemaMatch<GovernanceEvent> {
    decode_as::<Governance::ProposalCreated, _>(log, |e| GovernanceEvent::ProposalCreated {
        id: e.id,
        signatures: e.signatures,
        calldatas: e.calldatas,
        end_block: e.endBlock,
    })
    .or_else(|| {
        decode_as::<Governance::ProposalCanceled, _>(log, |e| GovernanceEvent::ProposalCanceled {
            id: e.id,
        })
    })
    .or_else(|| {
        decode_as::<Governance::ProposalQueued, _>(log, |e| GovernanceEvent::ProposalQueued {
            id: e.id,
            eta: e.eta,
        })
    })
    .or_else(|| {
        decode_as::<Governance::ProposalExecuted, _>(log, |e| GovernanceEvent::ProposalExecuted {
            id: e.id,
        })
    })
    .unwrap_or(SchemaMatch::NoSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry::CommunityRecord, test_utils::*};

    const COMMUNITY: Address = alloy::primitives::address!("0x00000000000000000000000000000000000000c1");

    fn decoder() -> EventDecoder {
        let registry = CommunityRegistry::default();
        registry.upsert(CommunityRecord {
            contract_address: COMMUNITY,
            internal_id: 1,
            public_id: "community-1".into(),
            is_public: true,
        });
        EventDecoder::new(contract_addresses(), registry)
    }

    fn decoded(decoded: Result<Decoded, ParserError>) -> DecodedEvent {
        match decoded {
            Ok(Decoded::Event(event)) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[test]
    fn classifies_by_address() {
        let decoder = decoder();

        assert_eq!(decoder.classify(&TOKEN), ContractFamily::Token);
        assert_eq!(decoder.classify(&COMMUNITY), ContractFamily::Community);
        assert_eq!(decoder.classify(&ADMIN), ContractFamily::Admin);
        assert_eq!(decoder.classify(&GOVERNANCE), ContractFamily::Governance);
        assert_eq!(decoder.classify(&addr(99)), ContractFamily::Other);
    }

    #[test]
    fn current_abi_names_the_manager() {
        let event = CommunityV2::BeneficiaryAdded {
            manager: addr(1),
            beneficiary: addr(2),
        };
        let event = decoded(decoder().decode(log_for(COMMUNITY, 10, &event)));

        assert_eq!(event.family, ContractFamily::Community);
        assert_eq!(event.name, "BeneficiaryAdded");
        assert_eq!(
            event.event,
            ContractEvent::Community(CommunityEvent::BeneficiaryAdded {
                manager: Some(addr(1)),
                beneficiary: addr(2),
            })
        );
    }

    #[test]
    fn falls_back_to_legacy_abi() {
        let event = CommunityV1::BeneficiaryAdded { _account: addr(2) };
        let event = decoded(decoder().decode(log_for(COMMUNITY, 10, &event)));

        assert_eq!(
            event.event,
            ContractEvent::Community(CommunityEvent::BeneficiaryAdded {
                manager: None,
                beneficiary: addr(2),
            })
        );
    }

    #[test]
    fn legacy_params_are_mapped_by_name() {
        let event = CommunityV1::CommunityEdited {
            _claimAmount: U256::from(1u64),
            _maxClaim: U256::from(2u64),
            _baseInterval: U256::from(3u64),
            _incrementInterval: U256::from(4u64),
        };
        let event = decoded(decoder().decode(log_for(COMMUNITY, 10, &event)));

        assert_eq!(
            event.event,
            ContractEvent::Community(CommunityEvent::ParamsUpdated(CommunityParams {
                claim_amount: U256::from(1u64),
                max_claim: U256::from(2u64),
                decrease_step: None,
                base_interval: U256::from(3u64),
                increment_interval: U256::from(4u64),
            }))
        );
    }

    #[test]
    fn unknown_contracts_use_oldest_abi() {
        let event = CommunityV1::ManagerAdded { _account: addr(3) };
        let event = decoded(decoder().decode(log_for(addr(77), 10, &event)));

        assert_eq!(event.family, ContractFamily::Other);
        assert_eq!(
            event.event,
            ContractEvent::Community(CommunityEvent::ManagerAdded {
                manager: None,
                account: addr(3),
            })
        );
    }

    #[test]
    fn foreign_events_are_no_match() {
        let transfer = Token::Transfer {
            from: addr(1),
            to: addr(2),
            value: U256::from(5u64),
        };

        assert_eq!(
            decoder().decode(log_for(addr(77), 10, &transfer)).unwrap(),
            Decoded::NoMatch {
                family: ContractFamily::Other
            }
        );
        assert_eq!(
            decoder().decode(log_for(COMMUNITY, 10, &transfer)).unwrap(),
            Decoded::NoMatch {
                family: ContractFamily::Community
            }
        );
    }

    #[test]
    fn malformed_data_is_an_anomaly() {
        let claim = CommunityV2::BeneficiaryClaim {
            beneficiary: addr(1),
            amount: U256::from(5u64),
        };
        let mut log = log_for(COMMUNITY, 10, &claim);
        log.data = Bytes::new();

        assert!(matches!(
            decoder().decode(log),
            Err(ParserError::DecodeError {
                family: ContractFamily::Community,
                event_type: "BeneficiaryClaim",
                ..
            })
        ));
    }
}
