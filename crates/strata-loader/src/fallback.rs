// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loaders the layered loader delegates to

use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::archive::ArchiveTable;
use crate::error::Result;
use crate::naming::resource_name;
use crate::origin::{OriginTag, OriginTagStore, Resource};
use crate::registry::CodeSourceRegistry;
use crate::symbol::{DefinedBy, Symbol};

/// The loader that owned the process namespace before the layered loader.
///
/// Also serves the loader's own support code.
pub trait FallbackLoader: Send + Sync {
    /// Find a resource and read it
    fn resolve_resource(&self, name: &str) -> Option<Resource>;

    /// Every copy of a resource this loader can see
    fn resolve_resources(&self, name: &str) -> Vec<Resource> {
        self.resolve_resource(name).into_iter().collect()
    }

    /// The loader's own definition of `name`, if it can provide one
    fn load_symbol_if_present(&self, name: &str) -> Option<Arc<Symbol>>;
}

/// Platform loader for frozen, low-level names
pub trait BootstrapLoader: Send + Sync {
    /// Definition of `name`, if the platform provides it
    fn load_symbol(&self, name: &str) -> Option<Arc<Symbol>>;
}

/// Bootstrap loader that provides nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBootstrap;

impl BootstrapLoader for NoBootstrap {
    fn load_symbol(&self, _name: &str) -> Option<Arc<Symbol>> {
        None
    }
}

/// Fallback loader over a fixed search path of directories and archives.
///
/// Defines symbols in its own namespace; nothing it loads is transformed.
pub struct SearchPathLoader {
    registry: CodeSourceRegistry,
    resource_suffix: String,
    symbols: DashMap<String, Arc<Symbol>>,
}

impl SearchPathLoader {
    /// Create a loader over `paths`, searched in order
    pub fn new<P: AsRef<Path>>(paths: &[P], resource_suffix: &str) -> Result<Self> {
        let registry =
            CodeSourceRegistry::new(Arc::new(OriginTagStore::new()), Arc::new(ArchiveTable::new()));
        for path in paths {
            registry.register(path, Some(OriginTag::Primary))?;
        }
        Ok(Self {
            registry,
            resource_suffix: resource_suffix.to_string(),
            symbols: DashMap::new(),
        })
    }

    /// Number of symbols this loader defined
    pub fn defined(&self) -> usize {
        self.symbols.len()
    }
}

impl FallbackLoader for SearchPathLoader {
    fn resolve_resource(&self, name: &str) -> Option<Resource> {
        match self.registry.resolve(name) {
            Ok(found) => found.map(|(_, resource)| resource),
            Err(e) => {
                debug!("Search path lookup of {} failed: {}", name, e);
                None
            }
        }
    }

    fn resolve_resources(&self, name: &str) -> Vec<Resource> {
        match self.registry.resolve_all(name) {
            Ok(found) => found.into_iter().map(|(_, resource)| resource).collect(),
            Err(e) => {
                debug!("Search path lookup of {} failed: {}", name, e);
                Vec::new()
            }
        }
    }

    fn load_symbol_if_present(&self, name: &str) -> Option<Arc<Symbol>> {
        if let Some(existing) = self.symbols.get(name) {
            return Some(existing.clone());
        }
        let resource = resource_name(name, &self.resource_suffix);
        let (origin, found) = self.registry.resolve(&resource).ok()??;
        let symbol = Arc::new(
            Symbol::new(name, found.bytes, DefinedBy::Fallback).with_code_source(origin.location()),
        );
        Some(self.symbols.entry(name.to_string()).or_insert(symbol).clone())
    }
}
