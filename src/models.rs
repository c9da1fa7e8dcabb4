// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize` and/or `Deserialize`, plus
//! `ToSchema` for OpenAPI documentation.
//!
//! Addresses, record ids and transaction hashes travel as 0x-prefixed hex
//! strings. Token ids travel as decimal strings.
//!
//! ## Model Categories
//!
//! - **Session**: The wallet identity the server acts as
//! - **Records**: Registered medical studies
//! - **Consents**: Grant flows and their progress
//! - **Access**: Token redemption

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::consent::{GrantState, StudyAccess};
use crate::store::{GrantHandle, RecordEntry};

// =============================================================================
// Session Models
// =============================================================================

/// Request to connect a wallet identity.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectSignerRequest {
    /// Hex private key (`0x` optional) or a PEM-encoded secp256k1 key.
    pub private_key: String,
}

/// The currently connected wallet identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SessionResponse {
    /// Whether a signer is connected.
    pub active: bool,
    /// Connected signer address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Registry backend (`contract` or `simulated`).
    pub backend: String,
}

// =============================================================================
// Record Models
// =============================================================================

/// Request to register a medical study.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRecordRequest {
    /// Display name of the study file.
    pub file_name: String,
    /// File contents. Only the name is used by the placeholder storage.
    #[serde(default)]
    pub content: Option<String>,
}

/// A medical study registered through this server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RecordResponse {
    /// bytes32 record identifier.
    pub record_id: String,
    /// Off-chain storage reference (placeholder CID).
    pub storage_ref: String,
    pub file_name: String,
    /// Registering patient.
    pub owner: String,
    /// Confirmed registration transaction.
    pub tx_hash: String,
    pub registered_at: DateTime<Utc>,
}

impl From<&RecordEntry> for RecordResponse {
    fn from(entry: &RecordEntry) -> Self {
        Self {
            record_id: entry.record.record_id.to_string(),
            storage_ref: entry.record.storage_ref.clone(),
            file_name: entry.record.display_name.clone(),
            owner: entry.owner.to_string(),
            tx_hash: entry.record.tx_hash.clone(),
            registered_at: entry.registered_at,
        }
    }
}

// =============================================================================
// Consent Models
// =============================================================================

/// Request to grant a doctor time-boxed access to a record.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GrantConsentRequest {
    /// bytes32 record identifier.
    pub record_id: String,
    /// Doctor's wallet address.
    pub doctor_address: String,
    /// Consent window in seconds (default 3600).
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// Data key to hand to the doctor (defaults to the demo key).
    #[serde(default)]
    pub data_key: Option<String>,
}

/// A grant flow accepted for background processing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GrantAcceptedResponse {
    /// Poll `GET /v1/consents/{grant_id}` for progress.
    pub grant_id: Uuid,
    pub state: String,
}

/// Progress of a grant flow.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GrantStatusResponse {
    pub grant_id: Uuid,
    pub record_id: String,
    pub doctor_address: String,
    pub patient_address: String,
    /// One of `idle`, `submitting`, `awaiting_confirmation`,
    /// `awaiting_token_notification`, `granted`, `failed`.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Issued token id, once granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    /// Failure code, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl From<&GrantHandle> for GrantStatusResponse {
    fn from(handle: &GrantHandle) -> Self {
        let state = handle.state();
        let mut response = Self {
            grant_id: handle.id,
            record_id: handle.record_id.to_string(),
            doctor_address: handle.grantee.to_string(),
            patient_address: handle.patient.to_string(),
            state: state.name().to_string(),
            tx_hash: None,
            token_id: None,
            error_code: None,
            error: None,
            started_at: handle.started_at,
        };

        match state {
            GrantState::Idle | GrantState::Submitting => {}
            GrantState::AwaitingConfirmation { tx_hash }
            | GrantState::AwaitingTokenNotification { tx_hash } => {
                response.tx_hash = Some(tx_hash);
            }
            GrantState::Granted { token_id, tx_hash } => {
                response.tx_hash = Some(tx_hash);
                response.token_id = Some(token_id.to_string());
            }
            GrantState::Failed { error } => {
                response.error_code = Some(error.code().to_string());
                response.error = Some(error.to_string());
            }
        }

        response
    }
}

// =============================================================================
// Access Models
// =============================================================================

/// Request to redeem a consent token as the connected signer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RedeemTokenRequest {
    pub token_id: String,
}

/// The study unlocked by a consent token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StudyAccessResponse {
    pub token_id: String,
    /// Unwrapped data key.
    pub data_key: String,
    /// Decrypted study content.
    pub content: String,
}

impl From<StudyAccess> for StudyAccessResponse {
    fn from(access: StudyAccess) -> Self {
        Self {
            token_id: access.token_id.to_string(),
            data_key: access.data_key.as_str().to_string(),
            content: access.content.0,
        }
    }
}
