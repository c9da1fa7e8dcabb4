// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The registry boundary: record registry and consent manager.
//!
//! Implemented by the SaluData contract binding
//! ([`ContractRegistry`](crate::blockchain::ContractRegistry)) and by the
//! simulated [`InMemoryRegistry`](super::memory::InMemoryRegistry).
//!
//! Submissions return as soon as the registry accepts the request.
//! Confirmation and the `ConsentGranted` notification are two separate
//! signals with no ordering between them.

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::RegistryError;
use super::types::{
    ConsentGranted, GrantRequest, PendingTx, RecordId, TokenId, TxReceipt, WrappedKey,
};

/// One signer's connection to the registry.
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    /// Address transactions and reads are issued from.
    fn signer(&self) -> Address;

    async fn register_record(
        &self,
        record_id: RecordId,
        storage_ref: &str,
        display_name: &str,
    ) -> Result<PendingTx, RegistryError>;

    async fn grant_consent(&self, request: &GrantRequest) -> Result<PendingTx, RegistryError>;

    /// Suspend until `tx` is final. Unbounded; callers apply the deadline.
    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<TxReceipt, RegistryError>;

    /// Read the wrapped key behind a token as [`Self::signer`].
    async fn get_access_key(&self, token_id: &TokenId) -> Result<WrappedKey, RegistryError>;

    /// Start receiving `ConsentGranted` notifications. Only events emitted
    /// after this call are delivered; dropping the receiver deregisters it.
    fn subscribe_consent_granted(&self) -> broadcast::Receiver<ConsentGranted>;

    /// Latest block height, used as a reachability probe.
    async fn block_number(&self) -> Result<u64, RegistryError>;
}
