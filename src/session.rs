// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signer Context
//!
//! The process acts for exactly one wallet identity at a time. Activating a
//! signer opens a registry connection for it and wraps that connection in a
//! [`ConsentOrchestrator`]. Activating the same address again keeps the
//! live connection. Activating a different address replaces it.
//!
//! Flows already running keep the orchestrator they were started with.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::RwLock;

use crate::blockchain::{AvaxClientError, ContractRegistry, NetworkConfig};
use crate::consent::{
    ConsentError, ConsentOrchestrator, ConsentRegistry, InMemoryRegistry, OrchestratorServices,
    SimulationBehavior,
};

/// Opens a registry connection for a signer.
pub trait RegistryConnector: Send + Sync {
    fn connect(&self, signer: PrivateKeySigner)
        -> Result<Arc<dyn ConsentRegistry>, AvaxClientError>;

    /// Short backend label for logs and the session endpoint.
    fn backend(&self) -> &'static str;
}

/// Connects to a deployed SaluData contract.
pub struct ContractConnector {
    pub network: NetworkConfig,
    pub contract: Address,
    pub event_poll_interval: Duration,
}

impl RegistryConnector for ContractConnector {
    fn connect(
        &self,
        signer: PrivateKeySigner,
    ) -> Result<Arc<dyn ConsentRegistry>, AvaxClientError> {
        let registry = ContractRegistry::connect(
            self.network.clone(),
            self.contract,
            signer,
            self.event_poll_interval,
        )?;
        Ok(Arc::new(registry))
    }

    fn backend(&self) -> &'static str {
        "contract"
    }
}

/// Connects to a process-local simulated registry. Every signer shares the
/// same ledger.
pub struct InMemoryConnector {
    ledger: InMemoryRegistry,
}

impl InMemoryConnector {
    pub fn new(behavior: SimulationBehavior) -> Self {
        Self {
            ledger: InMemoryRegistry::new(Address::ZERO, behavior),
        }
    }

    /// The shared simulated ledger.
    pub fn ledger(&self) -> &InMemoryRegistry {
        &self.ledger
    }
}

impl RegistryConnector for InMemoryConnector {
    fn connect(
        &self,
        signer: PrivateKeySigner,
    ) -> Result<Arc<dyn ConsentRegistry>, AvaxClientError> {
        Ok(Arc::new(self.ledger.connect_as(signer.address())))
    }

    fn backend(&self) -> &'static str {
        "simulated"
    }
}

/// The active signer and its orchestrator.
pub struct ActiveSigner {
    pub address: Address,
    pub orchestrator: Arc<ConsentOrchestrator>,
}

pub struct SignerContext {
    connector: Arc<dyn RegistryConnector>,
    services: OrchestratorServices,
    active: RwLock<Option<Arc<ActiveSigner>>>,
}

impl SignerContext {
    pub fn new(connector: Arc<dyn RegistryConnector>, services: OrchestratorServices) -> Self {
        Self {
            connector,
            services,
            active: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.connector.backend()
    }

    /// Make `signer` the active identity.
    pub async fn activate(
        &self,
        signer: PrivateKeySigner,
    ) -> Result<Arc<ActiveSigner>, AvaxClientError> {
        let address = signer.address();
        let mut active = self.active.write().await;

        if let Some(current) = active.as_ref().filter(|a| a.address == address) {
            tracing::debug!(signer = %address, "Signer already active");
            return Ok(Arc::clone(current));
        }

        let registry = self.connector.connect(signer)?;
        let session = Arc::new(ActiveSigner {
            address,
            orchestrator: Arc::new(ConsentOrchestrator::new(registry, self.services.clone())),
        });

        if let Some(previous) = active.replace(Arc::clone(&session)) {
            tracing::info!(previous = %previous.address, signer = %address, "Signer replaced");
        } else {
            tracing::info!(signer = %address, backend = self.backend(), "Signer activated");
        }

        Ok(session)
    }

    /// Drop the active identity. Returns the address that was active.
    pub async fn deactivate(&self) -> Option<Address> {
        let previous = self.active.write().await.take();
        if let Some(previous) = &previous {
            tracing::info!(signer = %previous.address, "Signer deactivated");
        }
        previous.map(|p| p.address)
    }

    pub async fn current(&self) -> Option<Arc<ActiveSigner>> {
        self.active.read().await.clone()
    }

    /// The active orchestrator, or [`ConsentError::NoActiveSigner`].
    pub async fn orchestrator(&self) -> Result<Arc<ConsentOrchestrator>, ConsentError> {
        self.current()
            .await
            .map(|active| Arc::clone(&active.orchestrator))
            .ok_or(ConsentError::NoActiveSigner)
    }
}
