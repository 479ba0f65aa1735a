//! The event ledger mapper: one decoded event occurrence in, one record out.
//!
//! The mapper is stateless. Each call to [`handle`] builds exactly one
//! [`Record`] from one [`EventOccurrence`] and hands it to a
//! [`RecordStore`]; it never reads back, reorders, batches or deduplicates.
//! Duplicate suppression on replay comes from the store contract (see
//! [`crate::store`]).

use alloy::primitives::B256;
use alloy::rpc::types::Log;
use commit_protocol::CommitEvent;

use crate::error::{HandleError, MapError};
use crate::record::{
    AccountFields, ClientDeactivatedFields, ClientRegisteredFields, CommitmentCreatedFields,
    CommitmentJoinedFields, CommitmentRefFields, CommitmentResolvedFields,
    EmergencyWithdrawalFields, FeesClaimedFields, InitializedFields, OwnershipTransferredFields,
    ProtocolFeeAddressUpdatedFields, Record, RecordBody, RecordId, RewardsClaimedFields,
    TokenAllowanceUpdatedFields, UpgradedFields,
};
use crate::store::{RecordStore, WriteOutcome};

/// Where an event occurrence sits on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    /// Hash of the emitting transaction.
    pub transaction_hash: B256,
    /// Index of the log within the transaction's block.
    pub log_index: u64,
    /// Number of the containing block.
    pub block_number: u64,
    /// Chain-reported timestamp of the containing block.
    pub block_timestamp: u64,
}

/// A single emitted event together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOccurrence {
    /// The decoded event parameters.
    pub event: CommitEvent,
    /// Block and transaction metadata.
    pub provenance: Provenance,
}

impl EventOccurrence {
    /// Build an occurrence from an RPC log.
    ///
    /// The block timestamp is taken from the log when the node supplies it,
    /// otherwise from `block_timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::RemovedLog`] for logs retracted by a reorg,
    /// [`MapError::MissingField`] if the log lacks provenance, and
    /// [`MapError::Decode`] if it is not a well-formed Commit Protocol event.
    pub fn from_log(log: &Log, block_timestamp: Option<u64>) -> Result<Self, MapError> {
        let block_number = log.block_number.ok_or(MapError::MissingField("blockNumber"))?;
        if log.removed {
            return Err(MapError::RemovedLog {
                block: block_number,
            });
        }
        let provenance = Provenance {
            transaction_hash: log
                .transaction_hash
                .ok_or(MapError::MissingField("transactionHash"))?,
            log_index: log.log_index.ok_or(MapError::MissingField("logIndex"))?,
            block_number,
            block_timestamp: log
                .block_timestamp
                .or(block_timestamp)
                .ok_or(MapError::MissingField("blockTimestamp"))?,
        };
        let event = CommitEvent::decode(log.data())?;
        Ok(Self { event, provenance })
    }
}

/// Translate an occurrence into its record without persisting it.
///
/// # Errors
///
/// Returns [`MapError::LogIndexOverflow`] if the log index cannot be encoded
/// into the record id.
pub fn map(occurrence: EventOccurrence) -> Result<Record, MapError> {
    let EventOccurrence { event, provenance } = occurrence;
    Ok(Record {
        id: RecordId::new(provenance.transaction_hash, provenance.log_index)?,
        block_number: provenance.block_number,
        block_timestamp: provenance.block_timestamp,
        transaction_hash: provenance.transaction_hash,
        body: body(event),
    })
}

/// Map an occurrence and persist the resulting record.
///
/// Either the record is handed to the store in full or nothing is written.
///
/// # Errors
///
/// Returns [`HandleError::Map`] for malformed occurrences and
/// [`HandleError::Store`] if the store fails. Neither is retried here.
pub fn handle<S>(occurrence: EventOccurrence, store: &mut S) -> Result<WriteOutcome, HandleError>
where
    S: RecordStore + ?Sized,
{
    let record = map(occurrence)?;
    let (kind, id) = (record.kind(), record.id);
    let outcome = store.create(record)?;
    match outcome {
        WriteOutcome::Created => tracing::trace!(%kind, record_id = %id, "record created"),
        WriteOutcome::Duplicate => tracing::debug!(%kind, record_id = %id, "duplicate record skipped"),
    }
    Ok(outcome)
}

/// Copy event parameters into record fields.
fn body(event: CommitEvent) -> RecordBody {
    match event {
        CommitEvent::ClientDeactivated(e) => {
            RecordBody::ClientDeactivated(ClientDeactivatedFields {
                client_address: e.clientAddress,
            })
        }
        CommitEvent::ClientRegistered(e) => RecordBody::ClientRegistered(ClientRegisteredFields {
            client_address: e.clientAddress,
            fee_address: e.feeAddress,
            fee_share: e.feeShare,
        }),
        CommitEvent::CommitmentCancelled(e) => {
            RecordBody::CommitmentCancelled(CommitmentRefFields {
                commitment_id: e.id,
            })
        }
        CommitEvent::CommitmentCreated(e) => {
            RecordBody::CommitmentCreated(CommitmentCreatedFields {
                commitment_id: e.id,
                creator: e.creator,
                client: e.client,
                token_address: e.tokenAddress,
                stake_amount: e.stakeAmount,
                join_fee: e.joinFee,
                creator_share: e.creatorShare,
                description: e.description,
            })
        }
        CommitEvent::CommitmentEmergencyPaused(e) => {
            RecordBody::CommitmentEmergencyPaused(CommitmentRefFields {
                commitment_id: e.id,
            })
        }
        CommitEvent::CommitmentEmergencyResolved(e) => {
            RecordBody::CommitmentEmergencyResolved(CommitmentRefFields {
                commitment_id: e.id,
            })
        }
        CommitEvent::CommitmentJoined(e) => RecordBody::CommitmentJoined(CommitmentJoinedFields {
            commitment_id: e.id,
            participant: e.participant,
        }),
        CommitEvent::CommitmentResolved(e) => {
            RecordBody::CommitmentResolved(CommitmentResolvedFields {
                commitment_id: e.id,
                winners: e.winners,
            })
        }
        CommitEvent::EmergencyWithdrawal(e) => {
            RecordBody::EmergencyWithdrawal(EmergencyWithdrawalFields {
                token: e.token,
                amount: e.amount,
            })
        }
        CommitEvent::FeesClaimed(e) => RecordBody::FeesClaimed(FeesClaimedFields {
            recipient: e.recipient,
            token: e.token,
            amount: e.amount,
        }),
        CommitEvent::Initialized(e) => {
            RecordBody::Initialized(InitializedFields { version: e.version })
        }
        CommitEvent::OwnershipTransferred(e) => {
            RecordBody::OwnershipTransferred(OwnershipTransferredFields {
                previous_owner: e.previousOwner,
                new_owner: e.newOwner,
            })
        }
        CommitEvent::Paused(e) => RecordBody::Paused(AccountFields { account: e.account }),
        CommitEvent::ProtocolFeeAddressUpdated(e) => {
            RecordBody::ProtocolFeeAddressUpdated(ProtocolFeeAddressUpdatedFields {
                old_address: e.oldAddress,
                new_address: e.newAddress,
            })
        }
        CommitEvent::RewardsClaimed(e) => RecordBody::RewardsClaimed(RewardsClaimedFields {
            commitment_id: e.id,
            user: e.user,
            token: e.token,
            amount: e.amount,
        }),
        CommitEvent::TokenAllowanceUpdated(e) => {
            RecordBody::TokenAllowanceUpdated(TokenAllowanceUpdatedFields {
                token: e.token,
                allowed: e.allowed,
            })
        }
        CommitEvent::Unpaused(e) => RecordBody::Unpaused(AccountFields { account: e.account }),
        CommitEvent::Upgraded(e) => RecordBody::Upgraded(UpgradedFields {
            implementation: e.implementation,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use alloy::primitives::{Address, Bytes, LogData, U256, address, b256};
    use alloy::sol_types::SolEvent;
    use commit_protocol::{
        ClientDeactivated, ClientRegistered, CommitmentCancelled, CommitmentCreated,
        CommitmentEmergencyPaused, CommitmentEmergencyResolved, CommitmentJoined,
        CommitmentResolved, EmergencyWithdrawal, EventKind, FeesClaimed, Initialized, Network,
        OwnershipTransferred, Paused, ProtocolFeeAddressUpdated, RewardsClaimed,
        TokenAllowanceUpdated, Unpaused, Upgraded,
    };

    use super::*;
    use crate::parquet::ParquetStore;
    use crate::store::MemoryStore;

    const TX: B256 = b256!("dead00000000000000000000000000000000000000000000000000000000beef");

    fn log_of<E: SolEvent>(event: &E, log_index: u64) -> Log {
        log_with(event.encode_log_data(), log_index)
    }

    fn log_with(data: LogData, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Network::EthereumSepolia.contract(),
                data,
            },
            block_number: Some(1_000_000),
            block_timestamp: Some(1_700_000_000),
            transaction_hash: Some(TX),
            log_index: Some(log_index),
            ..Default::default()
        }
    }

    fn record_of<E: SolEvent>(event: &E, log_index: u64) -> Record {
        let occurrence = EventOccurrence::from_log(&log_of(event, log_index), None).expect("log");
        map(occurrence).expect("maps")
    }

    fn case<E: SolEvent>(event: &E, body: RecordBody) -> (LogData, RecordBody) {
        (event.encode_log_data(), body)
    }

    /// One encoded log per event kind, every parameter distinct, paired with
    /// the record body it must produce.
    #[allow(clippy::too_many_lines, reason = "one entry per event kind")]
    fn every_kind() -> Vec<(LogData, RecordBody)> {
        let a = Address::repeat_byte;
        vec![
            case(
                &ClientDeactivated { clientAddress: a(0x01) },
                RecordBody::ClientDeactivated(ClientDeactivatedFields {
                    client_address: a(0x01),
                }),
            ),
            case(
                &ClientRegistered {
                    clientAddress: a(0x02),
                    feeAddress: a(0x03),
                    feeShare: 25,
                },
                RecordBody::ClientRegistered(ClientRegisteredFields {
                    client_address: a(0x02),
                    fee_address: a(0x03),
                    fee_share: 25,
                }),
            ),
            case(
                &CommitmentCancelled { id: U256::from(11) },
                RecordBody::CommitmentCancelled(CommitmentRefFields {
                    commitment_id: U256::from(11),
                }),
            ),
            case(
                &CommitmentCreated {
                    id: U256::from(12),
                    creator: a(0x04),
                    client: a(0x05),
                    tokenAddress: a(0x06),
                    stakeAmount: U256::MAX,
                    joinFee: U256::from(13),
                    creatorShare: u8::MAX,
                    description: "Meditate 10 minutes".to_owned(),
                },
                RecordBody::CommitmentCreated(CommitmentCreatedFields {
                    commitment_id: U256::from(12),
                    creator: a(0x04),
                    client: a(0x05),
                    token_address: a(0x06),
                    stake_amount: U256::MAX,
                    join_fee: U256::from(13),
                    creator_share: u8::MAX,
                    description: "Meditate 10 minutes".to_owned(),
                }),
            ),
            case(
                &CommitmentEmergencyPaused { id: U256::from(14) },
                RecordBody::CommitmentEmergencyPaused(CommitmentRefFields {
                    commitment_id: U256::from(14),
                }),
            ),
            case(
                &CommitmentEmergencyResolved { id: U256::from(15) },
                RecordBody::CommitmentEmergencyResolved(CommitmentRefFields {
                    commitment_id: U256::from(15),
                }),
            ),
            case(
                &CommitmentJoined {
                    id: U256::from(16),
                    participant: a(0x07),
                },
                RecordBody::CommitmentJoined(CommitmentJoinedFields {
                    commitment_id: U256::from(16),
                    participant: a(0x07),
                }),
            ),
            case(
                &CommitmentResolved {
                    id: U256::from(17),
                    winners: vec![a(0x08), a(0x09), a(0x08)],
                },
                RecordBody::CommitmentResolved(CommitmentResolvedFields {
                    commitment_id: U256::from(17),
                    winners: vec![a(0x08), a(0x09), a(0x08)],
                }),
            ),
            case(
                &EmergencyWithdrawal {
                    token: a(0x0a),
                    amount: U256::from(18),
                },
                RecordBody::EmergencyWithdrawal(EmergencyWithdrawalFields {
                    token: a(0x0a),
                    amount: U256::from(18),
                }),
            ),
            case(
                &FeesClaimed {
                    recipient: a(0x0b),
                    token: a(0x0c),
                    amount: U256::from(19),
                },
                RecordBody::FeesClaimed(FeesClaimedFields {
                    recipient: a(0x0b),
                    token: a(0x0c),
                    amount: U256::from(19),
                }),
            ),
            case(
                &Initialized { version: u64::MAX },
                RecordBody::Initialized(InitializedFields { version: u64::MAX }),
            ),
            case(
                &OwnershipTransferred {
                    previousOwner: a(0x0d),
                    newOwner: a(0x0e),
                },
                RecordBody::OwnershipTransferred(OwnershipTransferredFields {
                    previous_owner: a(0x0d),
                    new_owner: a(0x0e),
                }),
            ),
            case(
                &Paused { account: a(0x0f) },
                RecordBody::Paused(AccountFields { account: a(0x0f) }),
            ),
            case(
                &ProtocolFeeAddressUpdated {
                    oldAddress: a(0x10),
                    newAddress: a(0x11),
                },
                RecordBody::ProtocolFeeAddressUpdated(ProtocolFeeAddressUpdatedFields {
                    old_address: a(0x10),
                    new_address: a(0x11),
                }),
            ),
            case(
                &RewardsClaimed {
                    id: U256::from(20),
                    user: a(0x12),
                    token: a(0x13),
                    amount: U256::from(21),
                },
                RecordBody::RewardsClaimed(RewardsClaimedFields {
                    commitment_id: U256::from(20),
                    user: a(0x12),
                    token: a(0x13),
                    amount: U256::from(21),
                }),
            ),
            case(
                &TokenAllowanceUpdated {
                    token: a(0x14),
                    allowed: true,
                },
                RecordBody::TokenAllowanceUpdated(TokenAllowanceUpdatedFields {
                    token: a(0x14),
                    allowed: true,
                }),
            ),
            case(
                &Unpaused { account: a(0x15) },
                RecordBody::Unpaused(AccountFields { account: a(0x15) }),
            ),
            case(
                &Upgraded {
                    implementation: a(0x16),
                },
                RecordBody::Upgraded(UpgradedFields {
                    implementation: a(0x16),
                }),
            ),
        ]
    }

    #[test]
    fn every_kind_maps_each_parameter_to_its_field() {
        let cases = every_kind();
        let covered: BTreeSet<EventKind> = cases.iter().map(|(_, body)| body.kind()).collect();
        assert_eq!(covered.len(), EventKind::ALL.len(), "one case per event kind");

        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = ParquetStore::open(dir.path()).expect("open");
        let mut mapped = Vec::with_capacity(cases.len());

        for (log_index, (data, expected)) in (0u64..).zip(cases) {
            let occurrence =
                EventOccurrence::from_log(&log_with(data, log_index), None).expect("log");
            let decoded_kind = occurrence.event.kind();
            let record = map(occurrence).expect("maps");

            assert_eq!(record.kind(), decoded_kind, "record kind of {decoded_kind}");
            assert_eq!(record.body, expected, "fields of {decoded_kind}");
            assert_eq!(
                store.create(record.clone()).expect("create"),
                WriteOutcome::Created,
                "new {decoded_kind} record"
            );
            mapped.push(record);
        }
        assert_eq!(store.flush().expect("flush"), mapped.len(), "all written");

        let reopened = ParquetStore::open(dir.path()).expect("reopen");
        for record in mapped {
            let kind = record.kind();
            assert_eq!(
                reopened.load(kind).expect("load"),
                vec![record],
                "{kind} survives flush and reopen"
            );
        }
    }

    #[test]
    fn commitment_created_copies_every_field() {
        let creator = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let client = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let usdc = address!("cccccccccccccccccccccccccccccccccccccccc");
        let event = CommitmentCreated {
            id: U256::from(1),
            creator,
            client,
            tokenAddress: usdc,
            stakeAmount: U256::from(1_000_000),
            joinFee: U256::from(50_000),
            creatorShare: 10,
            description: "Run 5km daily".to_owned(),
        };

        let record = record_of(&event, 2);

        assert_eq!(record.id, RecordId::new(TX, 2).expect("id"), "hash ++ log index");
        assert_eq!(record.block_number, 1_000_000, "block");
        assert_eq!(record.block_timestamp, 1_700_000_000, "timestamp");
        assert_eq!(record.transaction_hash, TX, "tx hash");
        assert_eq!(
            record.body,
            RecordBody::CommitmentCreated(CommitmentCreatedFields {
                commitment_id: U256::from(1),
                creator,
                client,
                token_address: usdc,
                stake_amount: U256::from(1_000_000),
                join_fee: U256::from(50_000),
                creator_share: 10,
                description: "Run 5km daily".to_owned(),
            }),
            "fields copied verbatim"
        );
    }

    #[test]
    fn commitment_resolved_keeps_winners_as_emitted() {
        let winners = vec![
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
        ];
        let record = record_of(
            &CommitmentResolved {
                id: U256::from(7),
                winners: winners.clone(),
            },
            0,
        );

        let RecordBody::CommitmentResolved(fields) = record.body else {
            panic!("wrong kind");
        };
        assert_eq!(fields.commitment_id, U256::from(7), "id");
        assert_eq!(fields.winners, winners, "same two addresses, same order");
    }

    #[test]
    fn large_amounts_survive_exactly() {
        let record = record_of(
            &FeesClaimed {
                recipient: Address::repeat_byte(1),
                token: Address::repeat_byte(2),
                amount: U256::MAX,
            },
            5,
        );
        let RecordBody::FeesClaimed(fields) = record.body else {
            panic!("wrong kind");
        };
        assert_eq!(fields.amount, U256::MAX, "no precision loss");
    }

    #[test]
    fn timestamp_falls_back_to_caller() {
        let mut log = log_of(&Initialized { version: 1 }, 0);
        log.block_timestamp = None;

        assert!(
            matches!(
                EventOccurrence::from_log(&log, None),
                Err(MapError::MissingField("blockTimestamp"))
            ),
            "no timestamp anywhere"
        );
        let occurrence = EventOccurrence::from_log(&log, Some(42)).expect("fallback");
        assert_eq!(occurrence.provenance.block_timestamp, 42, "caller timestamp");
    }

    #[test]
    fn log_timestamp_wins_over_fallback() {
        let log = log_of(&Initialized { version: 2 }, 0);
        let occurrence = EventOccurrence::from_log(&log, Some(42)).expect("log");
        assert_eq!(occurrence.provenance.block_timestamp, 1_700_000_000, "node timestamp");
    }

    #[test]
    fn malformed_logs_are_rejected() {
        let event = TokenAllowanceUpdated {
            token: Address::repeat_byte(3),
            allowed: true,
        };

        let mut missing_hash = log_of(&event, 0);
        missing_hash.transaction_hash = None;
        assert!(
            matches!(
                EventOccurrence::from_log(&missing_hash, None),
                Err(MapError::MissingField("transactionHash"))
            ),
            "tx hash required"
        );

        let mut removed = log_of(&event, 0);
        removed.removed = true;
        assert!(
            matches!(
                EventOccurrence::from_log(&removed, None),
                Err(MapError::RemovedLog { block: 1_000_000 })
            ),
            "reorged log"
        );

        let mut foreign = log_of(&event, 0);
        foreign.inner.data = LogData::new_unchecked(
            vec![B256::repeat_byte(9)],
            Bytes::new(),
        );
        assert!(
            matches!(EventOccurrence::from_log(&foreign, None), Err(MapError::Decode(_))),
            "not a protocol event"
        );
    }

    #[test]
    fn oversized_log_index_fails_without_writing() {
        let mut store = MemoryStore::new();
        let log = log_of(&Initialized { version: 1 }, 1 << 40);
        let occurrence = EventOccurrence::from_log(&log, None).expect("log");

        let result = handle(occurrence, &mut store);
        assert!(
            matches!(result, Err(HandleError::Map(MapError::LogIndexOverflow(_)))),
            "index overflow"
        );
        assert!(store.is_empty(), "no partial record");
    }

    #[test]
    fn replay_yields_one_record() {
        let mut store = MemoryStore::new();
        let log = log_of(&Initialized { version: 1 }, 3);

        for expected in [WriteOutcome::Created, WriteOutcome::Duplicate] {
            let occurrence = EventOccurrence::from_log(&log, None).expect("log");
            assert_eq!(handle(occurrence, &mut store).expect("handles"), expected, "outcome");
        }
        assert_eq!(store.count(EventKind::Initialized), 1, "exactly one record");
    }
}
