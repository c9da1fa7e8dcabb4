// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::{AppConfig, DEFAULT_CONSENT_DURATION_SECS, DEFAULT_DATA_KEY};
use crate::consent::{
    DemoKeyWrapper, FlowTimeouts, OrchestratorServices, PlaceholderStudyStore, SimulationBehavior,
};
use crate::session::{ContractConnector, InMemoryConnector, RegistryConnector, SignerContext};
use crate::store::InMemoryStore;

/// Values applied when a request leaves them out.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub data_key: String,
    pub consent_duration: Duration,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            data_key: DEFAULT_DATA_KEY.to_string(),
            consent_duration: Duration::from_secs(DEFAULT_CONSENT_DURATION_SECS),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SignerContext>,
    pub store: Arc<RwLock<InMemoryStore>>,
    pub defaults: Arc<RequestDefaults>,
}

impl AppState {
    pub fn new(session: SignerContext, defaults: RequestDefaults) -> Self {
        Self {
            session: Arc::new(session),
            store: Arc::new(RwLock::new(InMemoryStore::new())),
            defaults: Arc::new(defaults),
        }
    }

    /// State backed by the simulated registry.
    pub fn simulated(behavior: SimulationBehavior, timeouts: FlowTimeouts) -> Self {
        let connector = Arc::new(InMemoryConnector::new(behavior));
        Self::new(
            SignerContext::new(connector, services(timeouts)),
            RequestDefaults::default(),
        )
    }

    /// State for the configured backend: the SaluData contract when an
    /// address is set, otherwise the simulated registry.
    pub fn from_config(config: &AppConfig) -> Self {
        let connector: Arc<dyn RegistryConnector> = match config.contract_address {
            Some(contract) => Arc::new(ContractConnector {
                network: config.network.clone(),
                contract,
                event_poll_interval: config.event_poll_interval,
            }),
            None => Arc::new(InMemoryConnector::new(SimulationBehavior::default())),
        };

        let timeouts = FlowTimeouts {
            confirmation: config.confirmation_timeout,
            grant: config.grant_timeout,
        };

        Self::new(
            SignerContext::new(connector, services(timeouts)),
            RequestDefaults {
                data_key: config.default_data_key.clone(),
                ..RequestDefaults::default()
            },
        )
    }
}

fn services(timeouts: FlowTimeouts) -> OrchestratorServices {
    OrchestratorServices {
        key_wrapper: Arc::new(DemoKeyWrapper),
        studies: Arc::new(PlaceholderStudyStore),
        timeouts,
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::simulated(SimulationBehavior::default(), FlowTimeouts::default())
    }
}
