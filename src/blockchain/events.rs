// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # ConsentGranted Event Poller
//!
//! Background task that turns the SaluData contract's `ConsentGranted` logs
//! into in-process notifications.
//!
//! ## Strategy
//!
//! The poller resolves the chain head once, retrying until the lookup
//! succeeds, and walks forward from that block with `eth_getLogs`, filtered
//! to the contract address and the event topic. Every decoded log is
//! published on a broadcast channel. The start block is published on
//! [`ConsentEventPoller::start_block`]; grant submissions wait for it, so
//! every grant lands at or after the first block the poller scans.
//!
//! There is no checkpoint. A restarted server only needs events for grants
//! it submits after the restart.

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::saludata::ISaluData;
use crate::consent::{ConsentGranted, RecordId, RegistryError, TokenId};

/// Maximum block span per `eth_getLogs` query (public Fuji RPC limit is 2048).
const CHUNK_SIZE: u64 = 2000;

/// Polls `ConsentGranted` logs and fans them out to subscribers.
pub struct ConsentEventPoller {
    provider: DynProvider,
    contract: Address,
    events: broadcast::Sender<ConsentGranted>,
    poll_interval: Duration,
    start: watch::Sender<Option<u64>>,
}

impl ConsentEventPoller {
    pub fn new(
        provider: DynProvider,
        contract: Address,
        events: broadcast::Sender<ConsentGranted>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            contract,
            events,
            poll_interval,
            start: watch::Sender::new(None),
        }
    }

    /// First block the poller scans, once known. Closes if the poller stops
    /// before the chain head could be read.
    pub fn start_block(&self) -> watch::Receiver<Option<u64>> {
        self.start.subscribe()
    }

    /// Run the poll loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            contract = %self.contract,
            interval_ms = self.poll_interval.as_millis() as u64,
            "ConsentGranted poller starting"
        );

        let Some(mut next_block) = self.resolve_start_block(&shutdown).await else {
            tracing::info!(contract = %self.contract, "ConsentGranted poller stopped before start");
            return;
        };
        self.start.send_replace(Some(next_block));
        tracing::debug!(start_block = next_block, "ConsentGranted poller started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.poll_step(next_block).await {
                Ok(next) => next_block = next,
                Err(e) => tracing::warn!(
                    error = %e,
                    next_block,
                    "ConsentGranted poll failed, will retry"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!(contract = %self.contract, "ConsentGranted poller shutting down");
    }

    /// Read the chain head, retrying every poll interval. `None` on shutdown.
    async fn resolve_start_block(&self, shutdown: &CancellationToken) -> Option<u64> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }

            match self.provider.get_block_number().await {
                Ok(head) => return Some(head),
                Err(e) => tracing::warn!(error = %e, "Chain head lookup failed, will retry"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    /// Fetch logs from `start` up to the head.
    /// Returns the next block to start from.
    async fn poll_step(&self, start: u64) -> Result<u64, RegistryError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| RegistryError::Rpc(e.to_string()))?;

        if start > head {
            return Ok(start);
        }

        let mut from = start;
        while from <= head {
            let to = (from + CHUNK_SIZE - 1).min(head);

            let filter = Filter::new()
                .address(self.contract)
                .event_signature(ISaluData::ConsentGranted::SIGNATURE_HASH)
                .from_block(from)
                .to_block(to);

            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| RegistryError::Rpc(e.to_string()))?;

            for log in &logs {
                let Some(event) = decode_consent_granted(log) else {
                    tracing::warn!(tx_hash = ?log.transaction_hash, "Undecodable ConsentGranted log");
                    continue;
                };
                tracing::debug!(
                    record_id = %event.record_id,
                    grantee = %event.grantee,
                    token_id = %event.token_id,
                    "ConsentGranted observed"
                );
                // No subscribers is fine; nobody is waiting on a grant.
                let _ = self.events.send(event);
            }

            from = to + 1;
        }

        Ok(head + 1)
    }
}

/// Decode a raw log into a notification. `None` if the log is not a
/// well-formed `ConsentGranted`.
pub fn decode_consent_granted(log: &Log) -> Option<ConsentGranted> {
    let decoded = log.log_decode::<ISaluData::ConsentGranted>().ok()?;
    let event = decoded.data();

    Some(ConsentGranted {
        record_id: RecordId(event.recordId),
        grantee: event.doctor,
        token_id: TokenId::from(event.tokenId),
        tx_hash: log.transaction_hash.map(|h| format!("{h:#x}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, keccak256, B256, U256, U64};
    use alloy::providers::ProviderBuilder;
    use alloy::transports::mock::Asserter;

    const CONTRACT: Address = address!("5000000000000000000000000000000000000005");

    fn mocked_poller(asserter: &Asserter) -> (ConsentEventPoller, broadcast::Receiver<ConsentGranted>) {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_mocked_client(asserter.clone())
            .erased();
        let (events, rx) = broadcast::channel(8);
        let poller = ConsentEventPoller::new(provider, CONTRACT, events, Duration::from_secs(1));
        (poller, rx)
    }

    fn consent_log(token: u64, tx_hash: Option<B256>) -> Log {
        let event = ISaluData::ConsentGranted {
            recordId: RecordId::derive("scan.pdf", 1_700_000_000_000).as_b256(),
            doctor: address!("2000000000000000000000000000000000000002"),
            tokenId: U256::from(token),
        };
        Log {
            inner: alloy::primitives::Log {
                address: CONTRACT,
                data: event.encode_log_data(),
            },
            transaction_hash: tx_hash,
            ..Default::default()
        }
    }

    #[test]
    fn topic_matches_event_signature() {
        assert_eq!(
            ISaluData::ConsentGranted::SIGNATURE_HASH,
            keccak256("ConsentGranted(bytes32,address,uint256)")
        );
    }

    #[test]
    fn decodes_consent_granted() {
        let hash = B256::repeat_byte(0xab);
        let event = decode_consent_granted(&consent_log(17, Some(hash))).unwrap();

        assert_eq!(event.token_id, TokenId::from(17u64));
        assert_eq!(
            event.grantee,
            address!("2000000000000000000000000000000000000002")
        );
        assert_eq!(
            event.record_id,
            RecordId::derive("scan.pdf", 1_700_000_000_000)
        );
        assert_eq!(event.tx_hash, Some(format!("{hash:#x}")));
    }

    #[test]
    fn missing_tx_hash_is_carried_as_none() {
        let event = decode_consent_granted(&consent_log(1, None)).unwrap();
        assert_eq!(event.tx_hash, None);
    }

    #[test]
    fn unrelated_logs_are_skipped() {
        let mut log = consent_log(1, None);
        log.inner.data = alloy::primitives::LogData::new_unchecked(
            vec![keccak256("Transfer(address,address,uint256)")],
            Default::default(),
        );
        assert!(decode_consent_granted(&log).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_head_lookup_keeps_start_block() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("upstream unavailable");
        // Start block, then the head seen by the first scan.
        asserter.push_success(&U64::from(10));
        asserter.push_success(&U64::from(12));
        asserter.push_success(&vec![consent_log(17, Some(B256::repeat_byte(0xab)))]);

        let (poller, mut rx) = mocked_poller(&asserter);
        let mut start = poller.start_block();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(poller.run(shutdown.clone()));

        let first = *start.wait_for(Option::is_some).await.unwrap();
        assert_eq!(first, Some(10));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.token_id, TokenId::from(17u64));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_start_closes_start_block() {
        let asserter = Asserter::new();
        let (poller, _rx) = mocked_poller(&asserter);
        let mut start = poller.start_block();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        poller.run(shutdown).await;

        assert!(start.wait_for(Option::is_some).await.is_err());
    }

    #[tokio::test]
    async fn poll_step_waits_for_head_to_reach_start() {
        let asserter = Asserter::new();
        asserter.push_success(&U64::from(4));
        let (poller, _rx) = mocked_poller(&asserter);

        // No log query is issued below the start block.
        assert_eq!(poller.poll_step(5).await.unwrap(), 5);
    }
}
