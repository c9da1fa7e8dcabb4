// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Simulated Registry
//!
//! An in-process stand-in for the SaluData contract. Every connection made
//! with [`InMemoryRegistry::connect_as`] shares one ledger and one
//! notification channel, so a patient connection and a doctor connection
//! see the same records and grants.
//!
//! Submissions are validated immediately (the equivalent of a gas-estimation
//! revert) and applied after [`SimulationBehavior::confirmation_delay`] on a
//! background task. The `ConsentGranted` notification is published
//! according to [`NotificationTiming`], independently of the receipt.
//!
//! Timing uses `tokio::time`, so tests can run on a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{keccak256, Address};
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use super::error::RegistryError;
use super::registry::ConsentRegistry;
use super::types::{
    ConsentGranted, GrantRequest, PendingTx, RecordId, TokenId, TxReceipt, WrappedKey,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// When the simulated registry publishes `ConsentGranted` relative to the
/// grant's receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTiming {
    /// Notification first, receipt after the given lead time.
    BeforeConfirmation(Duration),
    /// Receipt first, notification after the given lag.
    AfterConfirmation(Duration),
    /// The notification is never published.
    Never,
}

#[derive(Debug, Clone)]
pub struct SimulationBehavior {
    /// Time between submission and the state change being applied.
    pub confirmation_delay: Duration,
    pub notification: NotificationTiming,
    /// Id handed out to the first grant.
    pub first_token_id: u64,
    /// Settled receipts kept for late `wait_for_confirmation` calls.
    pub receipt_retention: usize,
}

impl Default for SimulationBehavior {
    fn default() -> Self {
        Self {
            confirmation_delay: Duration::from_secs(2),
            notification: NotificationTiming::AfterConfirmation(Duration::from_millis(500)),
            first_token_id: 1,
            receipt_retention: 1024,
        }
    }
}

struct StoredRecord {
    owner: Address,
    #[allow(dead_code)]
    storage_ref: String,
    #[allow(dead_code)]
    display_name: String,
}

struct StoredGrant {
    doctor: Address,
    wrapped_key: WrappedKey,
    /// `None` when the window does not fit in the clock.
    expires_at: Option<Instant>,
}

struct Ledger {
    records: HashMap<RecordId, StoredRecord>,
    grants: HashMap<u64, StoredGrant>,
    receipts: HashMap<String, Arc<watch::Sender<Option<TxReceipt>>>>,
    /// Settled transaction hashes, oldest first.
    settled: VecDeque<String>,
    next_token_id: u64,
    tx_nonce: u64,
    block_number: u64,
}

struct Shared {
    ledger: Mutex<Ledger>,
    events: broadcast::Sender<ConsentGranted>,
    behavior: SimulationBehavior,
}

impl Shared {
    /// Mark a receipt as delivered, forgetting the oldest settled ones.
    fn settle(&self, tx_hash: String) {
        let Ok(mut ledger) = self.ledger.lock() else {
            return;
        };
        ledger.settled.push_back(tx_hash);
        while ledger.settled.len() > self.behavior.receipt_retention {
            if let Some(old) = ledger.settled.pop_front() {
                ledger.receipts.remove(&old);
            }
        }
    }
}

/// Outcome of applying a transaction to the ledger.
type Applied = Result<Option<ConsentGranted>, String>;

/// One signer's connection to the simulated registry.
#[derive(Clone)]
pub struct InMemoryRegistry {
    signer: Address,
    shared: Arc<Shared>,
}

impl InMemoryRegistry {
    pub fn new(signer: Address, behavior: SimulationBehavior) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ledger = Ledger {
            records: HashMap::new(),
            grants: HashMap::new(),
            receipts: HashMap::new(),
            settled: VecDeque::new(),
            next_token_id: behavior.first_token_id,
            tx_nonce: 0,
            block_number: 0,
        };
        Self {
            signer,
            shared: Arc::new(Shared {
                ledger: Mutex::new(ledger),
                events,
                behavior,
            }),
        }
    }

    /// A connection for another signer over the same ledger.
    pub fn connect_as(&self, signer: Address) -> Self {
        Self {
            signer,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live `ConsentGranted` subscriptions.
    pub fn listener_count(&self) -> usize {
        self.shared.events.receiver_count()
    }

    /// Publish a notification directly, bypassing the ledger.
    pub fn emit(&self, event: ConsentGranted) {
        let _ = self.shared.events.send(event);
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>, RegistryError> {
        self.shared
            .ledger
            .lock()
            .map_err(|_| RegistryError::Rpc("simulated ledger poisoned".to_string()))
    }

    /// Accept a transaction and schedule `apply` to run at confirmation.
    fn submit<F>(&self, apply: F) -> Result<PendingTx, RegistryError>
    where
        F: FnOnce(&mut Ledger) -> Applied + Send + 'static,
    {
        let (tx_hash, receipt_tx) = {
            let mut ledger = self.ledger()?;
            ledger.tx_nonce += 1;
            let preimage = format!("{}:{}", self.signer, ledger.tx_nonce);
            let tx_hash = alloy::hex::encode_prefixed(keccak256(preimage.as_bytes()));
            let receipt_tx = Arc::new(watch::channel(None).0);
            ledger.receipts.insert(tx_hash.clone(), Arc::clone(&receipt_tx));
            (tx_hash, receipt_tx)
        };

        let shared = Arc::clone(&self.shared);
        let hash = tx_hash.clone();
        tokio::spawn(async move {
            tokio::time::sleep(shared.behavior.confirmation_delay).await;

            let (block_number, applied) = match shared.ledger.lock() {
                Ok(mut ledger) => {
                    ledger.block_number += 1;
                    let block_number = ledger.block_number;
                    (block_number, apply(&mut ledger))
                }
                Err(_) => (0, Err("simulated ledger poisoned".to_string())),
            };

            if let Err(reason) = &applied {
                tracing::debug!(tx_hash = %hash, reason = %reason, "Simulated transaction reverted");
            }

            let receipt = TxReceipt {
                tx_hash: hash.clone(),
                block_number,
                success: applied.is_ok(),
            };
            let event = applied.ok().flatten().map(|event| ConsentGranted {
                tx_hash: Some(hash.clone()),
                ..event
            });

            match (event, shared.behavior.notification) {
                (Some(event), NotificationTiming::BeforeConfirmation(lead)) => {
                    let _ = shared.events.send(event);
                    tokio::time::sleep(lead).await;
                    receipt_tx.send_replace(Some(receipt));
                }
                (Some(event), NotificationTiming::AfterConfirmation(lag)) => {
                    receipt_tx.send_replace(Some(receipt));
                    tokio::time::sleep(lag).await;
                    let _ = shared.events.send(event);
                }
                (Some(_), NotificationTiming::Never) | (None, _) => {
                    receipt_tx.send_replace(Some(receipt));
                }
            }

            shared.settle(hash);
        });

        Ok(PendingTx { tx_hash })
    }
}

#[async_trait]
impl ConsentRegistry for InMemoryRegistry {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn register_record(
        &self,
        record_id: RecordId,
        storage_ref: &str,
        display_name: &str,
    ) -> Result<PendingTx, RegistryError> {
        if self.ledger()?.records.contains_key(&record_id) {
            return Err(RegistryError::Rejected("Record already exists".to_string()));
        }

        let record = StoredRecord {
            owner: self.signer,
            storage_ref: storage_ref.to_string(),
            display_name: display_name.to_string(),
        };
        self.submit(move |ledger| {
            // A competing registration may have landed first.
            if ledger.records.contains_key(&record_id) {
                return Err("Record already exists".to_string());
            }
            ledger.records.insert(record_id, record);
            Ok(None)
        })
    }

    async fn grant_consent(&self, request: &GrantRequest) -> Result<PendingTx, RegistryError> {
        {
            let ledger = self.ledger()?;
            let record = ledger
                .records
                .get(&request.record_id)
                .ok_or_else(|| RegistryError::Rejected("Record does not exist".to_string()))?;
            if record.owner != self.signer {
                return Err(RegistryError::Rejected(
                    "Only the record owner can grant consent".to_string(),
                ));
            }
        }
        if request.duration.is_zero() {
            return Err(RegistryError::Rejected(
                "Duration must be greater than zero".to_string(),
            ));
        }

        let request = request.clone();
        self.submit(move |ledger| {
            let token_id = ledger.next_token_id;
            ledger.next_token_id += 1;
            ledger.grants.insert(
                token_id,
                StoredGrant {
                    doctor: request.grantee,
                    wrapped_key: request.wrapped_key,
                    expires_at: Instant::now().checked_add(request.duration),
                },
            );
            Ok(Some(ConsentGranted {
                record_id: request.record_id,
                grantee: request.grantee,
                token_id: TokenId::from(token_id),
                tx_hash: None,
            }))
        })
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<TxReceipt, RegistryError> {
        let mut receipt_rx = self
            .ledger()?
            .receipts
            .get(&tx.tx_hash)
            .map(|sender| sender.subscribe())
            .ok_or_else(|| RegistryError::Rpc(format!("Unknown transaction {}", tx.tx_hash)))?;

        let receipt = receipt_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RegistryError::Rpc("Receipt channel closed".to_string()))?;

        receipt
            .clone()
            .ok_or_else(|| RegistryError::Rpc("Receipt missing".to_string()))
    }

    async fn get_access_key(&self, token_id: &TokenId) -> Result<WrappedKey, RegistryError> {
        let id: u64 = token_id
            .as_str()
            .parse()
            .map_err(|_| RegistryError::Rejected("Invalid token id".to_string()))?;

        let ledger = self.ledger()?;
        let grant = ledger
            .grants
            .get(&id)
            .ok_or_else(|| RegistryError::Rejected("Token does not exist".to_string()))?;

        if grant.doctor != self.signer {
            return Err(RegistryError::Rejected(
                "Caller is not the authorized doctor".to_string(),
            ));
        }
        if grant.expires_at.is_some_and(|at| Instant::now() >= at) {
            return Err(RegistryError::Rejected("Consent has expired".to_string()));
        }

        Ok(grant.wrapped_key.clone())
    }

    fn subscribe_consent_granted(&self) -> broadcast::Receiver<ConsentGranted> {
        self.shared.events.subscribe()
    }

    async fn block_number(&self) -> Result<u64, RegistryError> {
        Ok(self.ledger()?.block_number)
    }
}
