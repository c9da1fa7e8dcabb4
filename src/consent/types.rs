// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Consent domain types.
//!
//! All entities are owned by the on-chain registry; the values here are
//! transient copies held for the duration of one user action.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, B256, U256};

/// Identifier of a registered medical study.
///
/// Derived off-chain as `keccak256(name || instant_ms)` where `instant_ms`
/// is rendered in decimal. Two registrations of the same name within the
/// same millisecond produce the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub B256);

impl RecordId {
    /// Derive a record id from a display name and a registration instant.
    pub fn derive(name: &str, instant_ms: i64) -> Self {
        let preimage = format!("{name}{instant_ms}");
        Self(keccak256(preimage.as_bytes()))
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", alloy::hex::encode_prefixed(self.0))
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<B256>()
            .map(Self)
            .map_err(|e| format!("Invalid record id: {e}"))
    }
}

/// Redeemable consent token identifier.
///
/// Opaque to the orchestrator. The contract issues `uint256` ids which are
/// carried here in decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<U256> for TokenId {
    fn from(value: U256) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key material prepared for one grantee. Never inspected by the orchestrator
/// outside of [`KeyWrapper::unwrap`](super::keys::KeyWrapper::unwrap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey(String);

impl WrappedKey {
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Plaintext data-encryption key; doubles as the content reference used to
/// open the study.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey(String);

impl DataKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep key material out of logs.
impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// A patient's request to let one doctor read one record.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub record_id: RecordId,
    pub grantee: Address,
    pub wrapped_key: WrappedKey,
    /// Access window. The clock starts when the grant is confirmed.
    pub duration: Duration,
}

/// `ConsentGranted(recordId, doctor, tokenId)` as observed from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentGranted {
    pub record_id: RecordId,
    pub grantee: Address,
    pub token_id: TokenId,
    /// Hash of the transaction that emitted the event, when known.
    pub tx_hash: Option<String>,
}

/// A state-changing request accepted by the registry but not yet final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub tx_hash: String,
}

/// Outcome of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
}

/// Record metadata returned to the caller after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRecord {
    pub record_id: RecordId,
    pub storage_ref: String,
    pub display_name: String,
    pub tx_hash: String,
}

/// Token issued by a completed grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token_id: TokenId,
    pub tx_hash: String,
}

/// Decrypted study returned to a doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyContent(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_keccak_of_name_and_instant() {
        let id = RecordId::derive("scan1.pdf", 1_700_000_000_000);
        assert_eq!(id.0, keccak256(b"scan1.pdf1700000000000"));
    }

    #[test]
    fn record_ids_differ_across_instants() {
        let a = RecordId::derive("scan1.pdf", 1_700_000_000_000);
        let b = RecordId::derive("scan1.pdf", 1_700_000_000_001);
        assert_ne!(a, b);
    }

    #[test]
    fn same_name_same_instant_collides() {
        let a = RecordId::derive("scan1.pdf", 42);
        let b = RecordId::derive("scan1.pdf", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn record_id_display_parses_back() {
        let id = RecordId::derive("mri.dcm", 7);
        let shown = id.to_string();
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.len(), 66);
        assert_eq!(shown.parse::<RecordId>().unwrap(), id);
    }

    #[test]
    fn record_id_rejects_garbage() {
        assert!("not-a-hash".parse::<RecordId>().is_err());
    }

    #[test]
    fn token_id_from_u256_is_decimal() {
        assert_eq!(TokenId::from(U256::from(17u64)).as_str(), "17");
        assert_eq!(TokenId::new(" 17 ").as_str(), "17");
    }

    #[test]
    fn data_key_debug_is_redacted() {
        let key = DataKey::new("super-secret");
        assert_eq!(format!("{key:?}"), "DataKey(..)");
    }
}
