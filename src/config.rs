// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! (and an optional `.env` file) once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `FUJI_RPC_URL` | Avalanche Fuji C-Chain RPC endpoint | public Fuji RPC |
//! | `CHAIN_ID` | Must be `43113` when set | - |
//! | `SALUDATA_CONTRACT_ADDRESS` | Deployed SaluData contract | Simulated registry |
//! | `PRIVATE_KEY` | Hex signer key activated at startup | - |
//! | `PRIVATE_KEY_PEM_FILE` | PEM signer key activated at startup | - |
//! | `GRANT_TIMEOUT_SECS` | Grant deadline (receipt + token notification) | `120` |
//! | `CONFIRMATION_TIMEOUT_SECS` | Record registration receipt deadline | `120` |
//! | `EVENT_POLL_INTERVAL_MS` | `ConsentGranted` log poll interval | `2000` |
//! | `DEMO_DATA_KEY` | Data key wrapped for doctors when none is given | `my-secret-key-for-this-file` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files for HTTPS serving | HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;

use crate::blockchain::{ensure_fuji_chain, parse_address, NetworkConfig, AVAX_FUJI};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const FUJI_RPC_URL_ENV: &str = "FUJI_RPC_URL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";

/// Environment variable name for the SaluData contract address.
///
/// When unset the server runs against the in-process simulated registry,
/// which is useful for local development and demos without Fuji funds.
pub const CONTRACT_ADDRESS_ENV: &str = "SALUDATA_CONTRACT_ADDRESS";

pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
pub const PRIVATE_KEY_PEM_FILE_ENV: &str = "PRIVATE_KEY_PEM_FILE";
pub const GRANT_TIMEOUT_ENV: &str = "GRANT_TIMEOUT_SECS";
pub const CONFIRMATION_TIMEOUT_ENV: &str = "CONFIRMATION_TIMEOUT_SECS";
pub const EVENT_POLL_INTERVAL_ENV: &str = "EVENT_POLL_INTERVAL_MS";
pub const DEMO_DATA_KEY_ENV: &str = "DEMO_DATA_KEY";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_GRANT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EVENT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_DATA_KEY: &str = "my-secret-key-for-this-file";

/// Default consent window when a request does not give one.
pub const DEFAULT_CONSENT_DURATION_SECS: u64 = 3600;

pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Where the startup signer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerSource {
    Hex(String),
    PemFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub network: NetworkConfig,
    pub contract_address: Option<Address>,
    pub signer: Option<SignerSource>,
    pub grant_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub event_poll_interval: Duration,
    pub default_data_key: String,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: `{value}`")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0}")]
    UnsupportedChain(String),

    #[error("Set only one of PRIVATE_KEY and PRIVATE_KEY_PEM_FILE")]
    ConflictingSigner,

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        ensure_fuji_chain(get(CHAIN_ID_ENV).as_deref()).map_err(ConfigError::UnsupportedChain)?;

        let network = match get(FUJI_RPC_URL_ENV) {
            Some(url) => AVAX_FUJI.with_rpc_url(url),
            None => AVAX_FUJI,
        };

        let contract_address = get(CONTRACT_ADDRESS_ENV)
            .map(|raw| {
                parse_address(&raw).map_err(|_| ConfigError::Invalid {
                    name: CONTRACT_ADDRESS_ENV,
                    expected: "address",
                    value: raw,
                })
            })
            .transpose()?;

        let signer = match (get(PRIVATE_KEY_ENV), get(PRIVATE_KEY_PEM_FILE_ENV)) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSigner),
            (Some(hex), None) => Some(SignerSource::Hex(hex)),
            (None, Some(path)) => Some(SignerSource::PemFile(PathBuf::from(path))),
            (None, None) => None,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_number(&get, PORT_ENV, DEFAULT_PORT)?,
            network,
            contract_address,
            signer,
            grant_timeout: Duration::from_secs(parse_number(
                &get,
                GRANT_TIMEOUT_ENV,
                DEFAULT_GRANT_TIMEOUT_SECS,
            )?),
            confirmation_timeout: Duration::from_secs(parse_number(
                &get,
                CONFIRMATION_TIMEOUT_ENV,
                DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            )?),
            event_poll_interval: Duration::from_millis(parse_number(
                &get,
                EVENT_POLL_INTERVAL_ENV,
                DEFAULT_EVENT_POLL_INTERVAL_MS,
            )?),
            default_data_key: get(DEMO_DATA_KEY_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_KEY.to_string()),
            tls,
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "number",
            value,
        }),
    }
}
