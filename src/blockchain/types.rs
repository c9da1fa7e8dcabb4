// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use std::borrow::Cow;

/// Avalanche network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: Cow<'static, str>,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: Cow<'static, str>,
    /// Block explorer URL
    pub explorer_url: Cow<'static, str>,
}

impl NetworkConfig {
    /// Same network, different RPC endpoint (e.g. a private Fuji node).
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Cow::Owned(rpc_url.into());
        self
    }

    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

/// Avalanche Fuji Testnet configuration.
pub const AVAX_FUJI: NetworkConfig = NetworkConfig {
    name: Cow::Borrowed("Avalanche Fuji Testnet"),
    chain_id: 43113,
    rpc_url: Cow::Borrowed("https://api.avax-test.network/ext/bc/C/rpc"),
    explorer_url: Cow::Borrowed("https://testnet.snowtrace.io"),
};

/// Validate a configured chain id for the Fuji-only deployment.
pub fn ensure_fuji_chain(raw: Option<&str>) -> Result<(), String> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    match value.parse::<u64>() {
        Ok(id) if id == AVAX_FUJI.chain_id => Ok(()),
        _ => Err(format!(
            "Only chain id {} ({}) is supported in this deployment, got `{value}`.",
            AVAX_FUJI.chain_id, AVAX_FUJI.name
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuji_chain_is_accepted() {
        assert!(ensure_fuji_chain(None).is_ok());
        assert!(ensure_fuji_chain(Some("")).is_ok());
        assert!(ensure_fuji_chain(Some(" 43113 ")).is_ok());
    }

    #[test]
    fn other_chains_are_rejected() {
        assert!(ensure_fuji_chain(Some("43114")).is_err());
        assert!(ensure_fuji_chain(Some("fuji")).is_err());
    }

    #[test]
    fn rpc_override_keeps_chain() {
        let network = AVAX_FUJI.with_rpc_url("http://localhost:9650/ext/bc/C/rpc");
        assert_eq!(network.chain_id, 43113);
        assert_eq!(network.rpc_url, "http://localhost:9650/ext/bc/C/rpc");
    }

    #[test]
    fn tx_url_points_at_explorer() {
        assert_eq!(
            AVAX_FUJI.tx_url("0xabc"),
            "https://testnet.snowtrace.io/tx/0xabc"
        );
    }
}
