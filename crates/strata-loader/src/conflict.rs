// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Origin-priority policy for module loaders that share the tag store

use std::sync::Arc;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::naming::resource_name;
use crate::origin::OriginTagStore;
use crate::symbol::Symbol;

/// A module loader's own search path, bypassing its parent
pub trait LocalLookup {
    /// Whether the local search path holds `resource`
    fn has_local_resource(&self, resource: &str) -> bool;

    /// Load `name` from the local search path only
    fn load_local(&self, name: &str) -> Option<Arc<Symbol>>;
}

/// Lets locally provided definitions win over ones that happened to load
/// first from an early auxiliary origin.
#[derive(Clone)]
pub struct ConflictResolver {
    tags: Arc<OriginTagStore>,
    config: LoaderConfig,
}

impl ConflictResolver {
    /// Create a resolver reading tags from `tags`
    pub fn new(tags: Arc<OriginTagStore>, config: &LoaderConfig) -> Self {
        Self {
            tags,
            config: config.clone(),
        }
    }

    /// Pick between `candidate` and a local definition of `name`.
    ///
    /// The local definition is used only when the local search path holds
    /// the symbol, the candidate's origin is tagged early, and the local load
    /// succeeds.
    pub fn prefer_local(
        &self,
        name: &str,
        candidate: Arc<Symbol>,
        local: &dyn LocalLookup,
    ) -> Arc<Symbol> {
        let resource = resource_name(name, &self.config.resource_suffix);
        if !local.has_local_resource(&resource) {
            return candidate;
        }

        let early = candidate
            .code_source()
            .and_then(|source| self.tags.get(source))
            .is_some_and(|tag| tag.is_early());
        if !early {
            return candidate;
        }

        match local.load_local(name) {
            Some(preferred) => {
                debug!("Preferring local definition of {} over early origin copy", name);
                preferred
            }
            None => candidate,
        }
    }

    /// Whether `resource` is reserved for self-description
    pub fn is_reserved(&self, resource: &str) -> bool {
        self.config.is_reserved_resource(resource)
    }

    /// Run a single-resource lookup unless the name is reserved
    pub fn filter_resource<T>(
        &self,
        resource: &str,
        lookup: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        if self.is_reserved(resource) {
            return None;
        }
        lookup(resource)
    }

    /// Run a multi-resource lookup unless the name is reserved
    pub fn filter_resources<T>(
        &self,
        resource: &str,
        lookup: impl FnOnce(&str) -> Vec<T>,
    ) -> Vec<T> {
        if self.is_reserved(resource) {
            return Vec::new();
        }
        lookup(resource)
    }
}
