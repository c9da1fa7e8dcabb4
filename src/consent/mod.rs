// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Consent token lifecycle.
//!
//! - `types` - record ids, tokens, wrapped keys, notifications
//! - `registry` - the registry boundary trait
//! - `grant` - the grant state machine (confirmation + notification join)
//! - `orchestrator` - register / grant / redeem flows
//! - `keys`, `study` - placeholder key wrapping and study storage
//! - `memory` - simulated registry

pub mod error;
pub mod grant;
pub mod keys;
pub mod memory;
pub mod orchestrator;
pub mod registry;
pub mod study;
pub mod types;

pub use error::{ConsentError, RegistryError};
pub use grant::{GrantState, ListenerEvent, TokenListener};
pub use keys::{DemoKeyWrapper, KeyWrapper};
pub use memory::{InMemoryRegistry, NotificationTiming, SimulationBehavior};
pub use orchestrator::{ConsentOrchestrator, FlowTimeouts, OrchestratorServices, StudyAccess};
pub use registry::ConsentRegistry;
pub use study::{PlaceholderStudyStore, StudyStore};
pub use types::*;
