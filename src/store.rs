// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory bookkeeping for the HTTP layer.
//!
//! Nothing here is authoritative. Records and grants live on the registry;
//! this store remembers which ones were started through this process so
//! clients can list them and poll grant progress.

use std::collections::{HashMap, VecDeque};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::consent::{GrantState, RecordId, RegisteredRecord};

/// A record registered through this process.
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub record: RegisteredRecord,
    pub owner: Address,
    pub registered_at: DateTime<Utc>,
}

/// A grant flow started through this process.
pub struct GrantHandle {
    pub id: Uuid,
    pub record_id: RecordId,
    pub grantee: Address,
    pub patient: Address,
    pub started_at: DateTime<Utc>,
    state: watch::Receiver<GrantState>,
    cancel: CancellationToken,
}

impl GrantHandle {
    pub fn new(
        record_id: RecordId,
        grantee: Address,
        patient: Address,
        state: watch::Receiver<GrantState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id,
            grantee,
            patient,
            started_at: Utc::now(),
            state,
            cancel,
        }
    }

    pub fn state(&self) -> GrantState {
        self.state.borrow().clone()
    }

    /// Request cancellation. Returns `false` if the flow already finished.
    pub fn cancel(&self) -> bool {
        if self.state.borrow().is_terminal() {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

/// Finished grant handles kept for status polling.
pub const DEFAULT_FINISHED_GRANT_RETENTION: usize = 1024;

pub struct InMemoryStore {
    records: Vec<RecordEntry>,
    grants: HashMap<Uuid, GrantHandle>,
    /// Grant ids, oldest first.
    grant_order: VecDeque<Uuid>,
    finished_retention: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_grant_retention(DEFAULT_FINISHED_GRANT_RETENTION)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `finished_retention` finished grants. Running grants are
    /// never evicted.
    pub fn with_grant_retention(finished_retention: usize) -> Self {
        Self {
            records: Vec::new(),
            grants: HashMap::new(),
            grant_order: VecDeque::new(),
            finished_retention,
        }
    }

    pub fn insert_record(&mut self, entry: RecordEntry) {
        self.records.push(entry);
    }

    /// Registered records, oldest first.
    pub fn list_records(&self) -> &[RecordEntry] {
        &self.records
    }

    pub fn insert_grant(&mut self, handle: GrantHandle) -> Uuid {
        let id = handle.id;
        self.grants.insert(id, handle);
        self.grant_order.push_back(id);
        self.prune_finished_grants();
        id
    }

    pub fn grant(&self, id: &Uuid) -> Option<&GrantHandle> {
        self.grants.get(id)
    }

    /// Evict the oldest finished grants beyond the retention limit.
    fn prune_finished_grants(&mut self) {
        let grants = &mut self.grants;
        let finished = self
            .grant_order
            .iter()
            .filter(|id| is_finished(grants, id))
            .count();
        let mut excess = finished.saturating_sub(self.finished_retention);
        if excess == 0 {
            return;
        }

        self.grant_order.retain(|id| {
            if excess > 0 && is_finished(grants, id) {
                grants.remove(id);
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

fn is_finished(grants: &HashMap<Uuid, GrantHandle>, id: &Uuid) -> bool {
    grants.get(id).is_some_and(|g| g.state().is_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{ConsentError, TokenId};
    use alloy::primitives::address;

    const PATIENT: Address = address!("1000000000000000000000000000000000000001");
    const DOCTOR: Address = address!("2000000000000000000000000000000000000002");

    fn handle() -> (GrantHandle, watch::Sender<GrantState>, CancellationToken) {
        let (tx, rx) = watch::channel(GrantState::Idle);
        let cancel = CancellationToken::new();
        let handle = GrantHandle::new(
            RecordId::derive("scan.pdf", 1),
            DOCTOR,
            PATIENT,
            rx,
            cancel.clone(),
        );
        (handle, tx, cancel)
    }

    #[test]
    fn handle_tracks_latest_state() {
        let (handle, tx, _) = handle();
        assert_eq!(handle.state(), GrantState::Idle);

        tx.send_replace(GrantState::Granted {
            token_id: TokenId::from(4u64),
            tx_hash: "0x1".into(),
        });
        assert!(handle.state().is_terminal());
    }

    #[test]
    fn cancel_only_affects_running_flows() {
        let (handle, tx, cancel) = handle();
        tx.send_replace(GrantState::Submitting);
        assert!(handle.cancel());
        assert!(cancel.is_cancelled());

        let (finished, tx, cancel) = self::handle();
        tx.send_replace(GrantState::Failed {
            error: ConsentError::Cancelled,
        });
        assert!(!finished.cancel());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn grants_are_looked_up_by_id() {
        let mut store = InMemoryStore::new();
        let (handle, _tx, _) = handle();
        let id = store.insert_grant(handle);

        assert_eq!(store.grant(&id).map(|g| g.grantee), Some(DOCTOR));
        assert!(store.grant(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn oldest_finished_grants_are_evicted() {
        let mut store = InMemoryStore::with_grant_retention(1);

        let (running, _running_tx, _) = handle();
        let running = store.insert_grant(running);

        let mut finished = Vec::new();
        let mut senders = Vec::new();
        for _ in 0..2 {
            let (grant, tx, _) = handle();
            tx.send_replace(GrantState::Failed {
                error: ConsentError::Cancelled,
            });
            finished.push(store.insert_grant(grant));
            senders.push(tx);
        }

        let (latest, _latest_tx, _) = handle();
        let latest = store.insert_grant(latest);

        assert!(store.grant(&running).is_some());
        assert!(store.grant(&finished[0]).is_none());
        assert!(store.grant(&finished[1]).is_some());
        assert!(store.grant(&latest).is_some());
    }
}
