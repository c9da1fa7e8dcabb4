// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Patient and doctor flows over one signer's registry connection.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::ConsentError;
use super::grant::{run_grant, GrantState};
use super::keys::KeyWrapper;
use super::registry::ConsentRegistry;
use super::study::StudyStore;
use super::types::{
    DataKey, GrantRequest, IssuedToken, RecordId, RegisteredRecord, StudyContent, TokenId,
};

/// Upper bounds on the suspension points of the write flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTimeouts {
    /// How long a record registration may wait for its receipt.
    pub confirmation: Duration,
    /// How long a grant may wait for receipt *and* token notification.
    pub grant: Duration,
}

impl Default for FlowTimeouts {
    fn default() -> Self {
        Self {
            confirmation: Duration::from_secs(120),
            grant: Duration::from_secs(120),
        }
    }
}

/// Collaborators shared by every orchestrator, independent of the signer.
#[derive(Clone)]
pub struct OrchestratorServices {
    pub key_wrapper: Arc<dyn KeyWrapper>,
    pub studies: Arc<dyn StudyStore>,
    pub timeouts: FlowTimeouts,
}

/// What a doctor receives after redeeming a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyAccess {
    pub token_id: TokenId,
    pub data_key: DataKey,
    pub content: StudyContent,
}

pub struct ConsentOrchestrator {
    registry: Arc<dyn ConsentRegistry>,
    services: OrchestratorServices,
}

impl ConsentOrchestrator {
    pub fn new(registry: Arc<dyn ConsentRegistry>, services: OrchestratorServices) -> Self {
        Self { registry, services }
    }

    pub fn signer(&self) -> Address {
        self.registry.signer()
    }

    pub fn registry(&self) -> &Arc<dyn ConsentRegistry> {
        &self.registry
    }

    /// Register a study stamped with the current wall-clock millisecond.
    pub async fn register_record(
        &self,
        display_name: &str,
        content: &[u8],
    ) -> Result<RegisteredRecord, ConsentError> {
        self.register_record_at(display_name, content, Utc::now().timestamp_millis())
            .await
    }

    /// Register a study with an explicit disambiguating instant.
    pub async fn register_record_at(
        &self,
        display_name: &str,
        content: &[u8],
        instant_ms: i64,
    ) -> Result<RegisteredRecord, ConsentError> {
        let storage_ref = self.services.studies.put(display_name, content);
        let record_id = RecordId::derive(display_name, instant_ms);
        let failed = |reason: String| ConsentError::RegistrationFailed { reason };

        info!(
            record_id = %record_id,
            display_name = %display_name,
            signer = %self.signer(),
            "Registering record"
        );

        // One deadline covers submission and receipt.
        let timeout = self.services.timeouts.confirmation;
        let deadline = tokio::time::Instant::now() + timeout;

        let pending = tokio::time::timeout_at(
            deadline,
            self.registry
                .register_record(record_id, &storage_ref, display_name),
        )
        .await
        .map_err(|_| {
            failed(format!(
                "registration not submitted within {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| failed(e.reason()))?;

        let receipt = tokio::time::timeout_at(deadline, self.registry.wait_for_confirmation(&pending))
            .await
            .map_err(|_| {
                failed(format!(
                    "transaction {} not confirmed within {}s",
                    pending.tx_hash,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| failed(e.reason()))?;

        if !receipt.success {
            warn!(record_id = %record_id, tx_hash = %receipt.tx_hash, "Record registration reverted");
            return Err(failed(format!("transaction {} reverted", receipt.tx_hash)));
        }

        info!(
            record_id = %record_id,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            "Record registered"
        );

        Ok(RegisteredRecord {
            record_id,
            storage_ref,
            display_name: display_name.to_string(),
            tx_hash: receipt.tx_hash,
        })
    }

    /// Grant `grantee` access to `record_id` for `duration`.
    ///
    /// `state` receives every transition; cancelling `cancel` abandons the
    /// flow and releases its token listener.
    pub async fn grant_consent(
        &self,
        record_id: RecordId,
        grantee: Address,
        data_key: &DataKey,
        duration: Duration,
        state: &watch::Sender<GrantState>,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken, ConsentError> {
        let request = GrantRequest {
            record_id,
            grantee,
            wrapped_key: self.services.key_wrapper.wrap(data_key, grantee),
            duration,
        };

        info!(
            record_id = %record_id,
            grantee = %grantee,
            duration_secs = duration.as_secs(),
            "Granting consent"
        );

        run_grant(
            self.registry.as_ref(),
            &request,
            self.services.timeouts.grant,
            state,
            cancel,
        )
        .await
    }

    /// Exchange a token for the study it unlocks, as the active signer.
    pub async fn redeem(&self, token_id: &TokenId) -> Result<StudyAccess, ConsentError> {
        info!(token_id = %token_id, signer = %self.signer(), "Redeeming consent token");

        let wrapped = self
            .registry
            .get_access_key(token_id)
            .await
            .map_err(|e| ConsentError::AccessDenied { reason: e.reason() })?;

        let data_key = self
            .services
            .key_wrapper
            .unwrap(&wrapped)
            .map_err(|reason| ConsentError::KeyUnwrapFailed { reason })?;

        let content = self
            .services
            .studies
            .open(&data_key)
            .map_err(|reason| ConsentError::KeyUnwrapFailed { reason })?;

        Ok(StudyAccess {
            token_id: token_id.clone(),
            data_key,
            content,
        })
    }
}
