// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Avalanche C-Chain connection helpers.

use std::str::FromStr;

use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};

use super::types::NetworkConfig;

/// Create a signer from a private key (hex string, `0x` prefix optional).
pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, AvaxClientError> {
    let key_bytes = alloy::hex::decode(private_key_hex.trim())
        .map_err(|e| AvaxClientError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| AvaxClientError::InvalidPrivateKey(e.to_string()))
}

/// Parse a 0x-prefixed address.
pub fn parse_address(raw: &str) -> Result<Address, AvaxClientError> {
    Address::from_str(raw.trim()).map_err(|e| AvaxClientError::InvalidAddress(e.to_string()))
}

/// Build a wallet-filled HTTP provider for `network` signing as `signer`.
pub fn connect_provider(
    network: &NetworkConfig,
    signer: PrivateKeySigner,
) -> Result<DynProvider, AvaxClientError> {
    let url: url::Url = network
        .rpc_url
        .parse()
        .map_err(|e: url::ParseError| AvaxClientError::InvalidRpcUrl(e.to_string()))?;

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(url);

    Ok(provider.erased())
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, thiserror::Error)]
pub enum AvaxClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}
