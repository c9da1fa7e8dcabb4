// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Consent flow errors.

/// Errors raised by the registry boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry refused the call. Carries the registry's reason verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

impl RegistryError {
    /// Human-readable reason, without any prefix added by this crate for
    /// registry rejections.
    pub fn reason(&self) -> String {
        match self {
            RegistryError::Rejected(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors surfaced to whoever initiated a consent operation.
///
/// Nothing is retried automatically; re-submission is the caller's call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsentError {
    #[error("Record registration failed: {reason}")]
    RegistrationFailed { reason: String },

    #[error("Grant submission failed: {reason}")]
    GrantSubmissionFailed { reason: String },

    #[error("Grant confirmed but no token notification arrived: {reason}")]
    GrantTimedOut { reason: String },

    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Key unwrap failed: {reason}")]
    KeyUnwrapFailed { reason: String },

    #[error("Grant flow cancelled")]
    Cancelled,

    #[error("No wallet identity is connected")]
    NoActiveSigner,
}

impl ConsentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ConsentError::RegistrationFailed { .. } => "registration_failed",
            ConsentError::GrantSubmissionFailed { .. } => "grant_submission_failed",
            ConsentError::GrantTimedOut { .. } => "grant_timed_out",
            ConsentError::AccessDenied { .. } => "access_denied",
            ConsentError::KeyUnwrapFailed { .. } => "key_unwrap_failed",
            ConsentError::Cancelled => "cancelled",
            ConsentError::NoActiveSigner => "no_active_signer",
        }
    }
}
