// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration module for Avalanche C-Chain.
//!
//! This module provides functionality for:
//! - Loading the signer from a hex key or a PEM file
//! - Submitting SaluData transactions and polling their receipts
//! - Watching `ConsentGranted` events

pub mod client;
pub mod events;
pub mod saludata;
pub mod signing;
pub mod types;

pub use client::{create_signer, parse_address, AvaxClientError};
pub use events::ConsentEventPoller;
pub use saludata::{ContractRegistry, ISaluData};
pub use signing::{signer_from_pem, signer_from_pem_file};
pub use types::*;
