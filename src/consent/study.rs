// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Off-chain study storage.
//!
//! [`PlaceholderStudyStore`] stands in for content-addressed storage. It
//! fabricates a locator from the file name and returns a canned plaintext
//! on read; no bytes are persisted.

use super::types::{DataKey, StudyContent};

/// Put/get of study content by reference.
pub trait StudyStore: Send + Sync {
    /// Store a study and return its storage reference.
    fn put(&self, display_name: &str, content: &[u8]) -> String;

    /// Fetch and decode a study using its data key.
    fn open(&self, key: &DataKey) -> Result<StudyContent, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderStudyStore;

impl StudyStore for PlaceholderStudyStore {
    fn put(&self, display_name: &str, content: &[u8]) -> String {
        tracing::debug!(
            display_name = %display_name,
            bytes = content.len(),
            "Placeholder store: fabricating storage reference"
        );
        format!("FAKE_IPFS_CID_FOR_{display_name}")
    }

    fn open(&self, key: &DataKey) -> Result<StudyContent, String> {
        Ok(StudyContent(format!(
            "DECRYPTED_STUDY_CONTENT (key used: {})",
            key.as_str()
        )))
    }
}
