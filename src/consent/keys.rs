// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key wrapping for consent grants.
//!
//! [`DemoKeyWrapper`] is **not cryptography**. It produces the placeholder
//! envelope `ENCRYPTED[<key>]_FOR_[<address>]` so that the grant and read
//! paths can be exercised end to end. A real deployment supplies a
//! [`KeyWrapper`] that encrypts to the grantee's public key.

use alloy::primitives::Address;

use super::types::{DataKey, WrappedKey};

const ENVELOPE_PREFIX: &str = "ENCRYPTED[";
const GRANTEE_SEPARATOR: &str = "]_FOR_[";
const ENVELOPE_SUFFIX: &str = "]";

/// Wraps a data key for one grantee and unwraps it again locally.
pub trait KeyWrapper: Send + Sync {
    fn wrap(&self, key: &DataKey, grantee: Address) -> WrappedKey;

    /// Recover the data key. Pure; never touches the network.
    fn unwrap(&self, wrapped: &WrappedKey) -> Result<DataKey, String>;
}

/// Placeholder string-envelope wrapper.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoKeyWrapper;

impl KeyWrapper for DemoKeyWrapper {
    fn wrap(&self, key: &DataKey, grantee: Address) -> WrappedKey {
        WrappedKey::new(format!(
            "{ENVELOPE_PREFIX}{}{GRANTEE_SEPARATOR}{grantee}{ENVELOPE_SUFFIX}",
            key.as_str()
        ))
    }

    fn unwrap(&self, wrapped: &WrappedKey) -> Result<DataKey, String> {
        let body = wrapped
            .as_str()
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or_else(|| format!("missing `{ENVELOPE_PREFIX}` prefix"))?;
        let body = body
            .strip_suffix(ENVELOPE_SUFFIX)
            .ok_or_else(|| "unterminated envelope".to_string())?;

        // The address part never contains the separator, so split from the right.
        let (key, grantee_hint) = body
            .rsplit_once(GRANTEE_SEPARATOR)
            .ok_or_else(|| "missing grantee section".to_string())?;

        if grantee_hint.is_empty() {
            return Err("empty grantee section".to_string());
        }

        Ok(DataKey::new(key))
    }
}
