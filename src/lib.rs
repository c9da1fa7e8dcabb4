// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SaluData - Patient Consent Orchestration Service
//!
//! Registers medical studies, grants doctors time-boxed consent tokens and
//! redeems those tokens against the SaluData contract on Avalanche C-Chain
//! (or an in-process simulated registry).
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `consent` - Record, grant and redemption flows
//! - `blockchain` - Avalanche C-Chain integration and the SaluData binding
//! - `session` - The connected wallet identity

pub mod api;
pub mod blockchain;
pub mod config;
pub mod consent;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
