// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tracks symbols that were satisfied by the fallback loader

use dashmap::DashSet;

use crate::naming::enclosing_names;

/// Set of symbol names satisfied via the fallback loader.
///
/// Nested names inherit the provenance of any enclosing name, so a nested
/// symbol is never defined from a registered origin while its enclosing
/// symbol came from the fallback loader.
#[derive(Debug, Default)]
pub struct ProvenanceTracker {
    fallback_sourced: DashSet<String>,
}

impl ProvenanceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name` was satisfied via the fallback loader
    pub fn mark_fallback_sourced(&self, name: &str) {
        self.fallback_sourced.insert(name.to_string());
    }

    /// Whether `name`, or any name enclosing it, is fallback-sourced
    pub fn is_fallback_sourced(&self, name: &str) -> bool {
        if self.fallback_sourced.is_empty() {
            return false;
        }
        self.fallback_sourced.contains(name)
            || enclosing_names(name).any(|outer| self.fallback_sourced.contains(outer))
    }

    /// Whether `name` itself was marked
    pub fn is_marked(&self, name: &str) -> bool {
        self.fallback_sourced.contains(name)
    }

    /// Number of marked names
    pub fn len(&self) -> usize {
        self.fallback_sourced.len()
    }

    /// Whether nothing is marked
    pub fn is_empty(&self) -> bool {
        self.fallback_sourced.is_empty()
    }
}
