// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SaluData contract binding.
//!
//! `ContractRegistry` implements [`ConsentRegistry`] against a deployed
//! SaluData contract: records and grants are submitted as signed
//! transactions, confirmation is a receipt poll, and `ConsentGranted`
//! notifications come from a [`ConsentEventPoller`] owned by the registry.
//! A grant is only submitted once the poller has fixed its start block.

use std::str::FromStr;
use std::time::Duration;

use alloy::{
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, Provider},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::Revert,
};
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::client::{connect_provider, AvaxClientError};
use super::events::ConsentEventPoller;
use super::types::NetworkConfig;
use crate::consent::{
    ConsentGranted, ConsentRegistry, GrantRequest, PendingTx, RecordId, RegistryError, TokenId,
    TxReceipt, WrappedKey,
};

sol! {
    #[sol(rpc)]
    interface ISaluData {
        event ConsentGranted(bytes32 indexed recordId, address indexed doctor, uint256 tokenId);

        function registerRecord(bytes32 recordId, string ipfsCid, string fileName) external;
        function grantConsent(bytes32 recordId, address doctor, string encryptedKey, uint256 durationInSeconds) external;
        function getAccessKey(uint256 tokenId) external view returns (string);
    }
}

/// Buffered notifications per registry connection.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Delay between `eth_getTransactionReceipt` attempts.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// SaluData contract connection for one signer.
pub struct ContractRegistry {
    network: NetworkConfig,
    provider: DynProvider,
    contract: ISaluData::ISaluDataInstance<DynProvider>,
    signer: Address,
    events: broadcast::Sender<ConsentGranted>,
    poller_start: watch::Receiver<Option<u64>>,
    shutdown: CancellationToken,
}

impl ContractRegistry {
    /// Connect to the contract at `contract_address` signing as `signer`.
    ///
    /// Spawns the `ConsentGranted` poller; it stops when the registry is
    /// dropped. Must be called from within a tokio runtime.
    pub fn connect(
        network: NetworkConfig,
        contract_address: Address,
        signer: PrivateKeySigner,
        event_poll_interval: Duration,
    ) -> Result<Self, AvaxClientError> {
        let signer_address = signer.address();
        let provider = connect_provider(&network, signer)?;
        let contract = ISaluData::new(contract_address, provider.clone());

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let poller = ConsentEventPoller::new(
            provider.clone(),
            contract_address,
            events.clone(),
            event_poll_interval,
        );
        let poller_start = poller.start_block();
        tokio::spawn(poller.run(shutdown.clone()));

        tracing::info!(
            network = %network.name,
            contract = %contract_address,
            signer = %signer_address,
            "Connected to SaluData contract"
        );

        Ok(Self {
            network,
            provider,
            contract,
            signer: signer_address,
            events,
            poller_start,
            shutdown,
        })
    }

    /// Wait until the event poller knows its start block.
    async fn wait_for_event_poller(&self) -> Result<(), RegistryError> {
        let mut start = self.poller_start.clone();
        let started = start.wait_for(Option::is_some).await.is_ok();
        if started {
            Ok(())
        } else {
            Err(RegistryError::Rpc("ConsentGranted poller stopped".to_string()))
        }
    }
}

impl Drop for ContractRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Prefix nodes put in front of a revert reason when they omit the data.
const REVERT_MESSAGE_PREFIX: &str = "execution reverted: ";

/// Map a contract call failure, keeping a revert reason verbatim.
fn contract_error(err: alloy::contract::Error) -> RegistryError {
    if let Some(revert) = err.as_decoded_error::<Revert>() {
        return RegistryError::Rejected(revert.reason);
    }

    if let alloy::contract::Error::TransportError(transport) = &err {
        let reason = transport
            .as_error_resp()
            .and_then(|resp| resp.message.strip_prefix(REVERT_MESSAGE_PREFIX));
        if let Some(reason) = reason {
            return RegistryError::Rejected(reason.to_string());
        }
    }

    RegistryError::Rpc(err.to_string())
}

fn pending(tx_hash: &TxHash) -> PendingTx {
    PendingTx {
        tx_hash: format!("{tx_hash:#x}"),
    }
}

#[async_trait]
impl ConsentRegistry for ContractRegistry {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn register_record(
        &self,
        record_id: RecordId,
        storage_ref: &str,
        display_name: &str,
    ) -> Result<PendingTx, RegistryError> {
        let tx = self
            .contract
            .registerRecord(
                record_id.as_b256(),
                storage_ref.to_string(),
                display_name.to_string(),
            )
            .send()
            .await
            .map_err(contract_error)?;

        tracing::info!(
            record_id = %record_id,
            tx_hash = %tx.tx_hash(),
            explorer = %self.network.tx_url(&format!("{:#x}", tx.tx_hash())),
            "registerRecord submitted"
        );
        Ok(pending(tx.tx_hash()))
    }

    async fn grant_consent(&self, request: &GrantRequest) -> Result<PendingTx, RegistryError> {
        self.wait_for_event_poller().await?;

        let tx = self
            .contract
            .grantConsent(
                request.record_id.as_b256(),
                request.grantee,
                request.wrapped_key.as_str().to_string(),
                U256::from(request.duration.as_secs()),
            )
            .send()
            .await
            .map_err(contract_error)?;

        tracing::info!(
            record_id = %request.record_id,
            grantee = %request.grantee,
            tx_hash = %tx.tx_hash(),
            "grantConsent submitted"
        );
        Ok(pending(tx.tx_hash()))
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<TxReceipt, RegistryError> {
        let hash = TxHash::from_str(&tx.tx_hash)
            .map_err(|e| RegistryError::Rpc(format!("Invalid tx hash: {e}")))?;

        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    return Ok(TxReceipt {
                        tx_hash: tx.tx_hash.clone(),
                        block_number: receipt.block_number.unwrap_or(0),
                        success: receipt.status(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(tx_hash = %tx.tx_hash, error = %e, "Receipt lookup failed, will retry");
                }
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn get_access_key(&self, token_id: &TokenId) -> Result<WrappedKey, RegistryError> {
        let id = U256::from_str(token_id.as_str())
            .map_err(|_| RegistryError::Rejected(format!("Invalid token id `{token_id}`")))?;

        let key = self
            .contract
            .getAccessKey(id)
            .from(self.signer)
            .call()
            .await
            .map_err(contract_error)?;

        Ok(WrappedKey::new(key))
    }

    fn subscribe_consent_granted(&self) -> broadcast::Receiver<ConsentGranted> {
        self.events.subscribe()
    }

    async fn block_number(&self) -> Result<u64, RegistryError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| RegistryError::Rpc(e.to_string()))
    }
}
