// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Secondary module loader
//!
//! A module loader owns its own origin list and delegates parent-first to
//! the layered pipeline. Every definition found through the parent is run
//! past the [`ConflictResolver`], so a module's own copy of a symbol wins
//! over one that came from an early auxiliary origin.

use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::archive::ArchiveTable;
use crate::conflict::{ConflictResolver, LocalLookup};
use crate::error::{LoaderError, Result};
use crate::naming::{resource_name, symbol_name};
use crate::origin::{OriginTag, ResourceLocation};
use crate::pipeline::SymbolLoadPipeline;
use crate::registry::CodeSourceRegistry;
use crate::symbol::{DefinedBy, Symbol};

/// Module loader layered on top of a [`SymbolLoadPipeline`]
pub struct ModuleLoader {
    name: String,
    parent: Arc<SymbolLoadPipeline>,
    registry: CodeSourceRegistry,
    resolver: ConflictResolver,
    resource_suffix: String,
    symbols: DashMap<String, Arc<Symbol>>,
}

impl ModuleLoader {
    /// Create a module loader sharing `parent`'s tag store
    pub fn new(name: impl Into<String>, parent: Arc<SymbolLoadPipeline>) -> Self {
        let tags = parent.tags().clone();
        let config = parent.config();
        Self {
            name: name.into(),
            registry: CodeSourceRegistry::new(tags.clone(), Arc::new(ArchiveTable::new())),
            resolver: ConflictResolver::new(tags, config),
            resource_suffix: config.resource_suffix.clone(),
            symbols: DashMap::new(),
            parent,
        }
    }

    /// Loader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an origin to the local search path, tagged `local`
    pub fn add_origin(&self, path: impl AsRef<Path>) -> Result<bool> {
        self.registry.register(path, Some(OriginTag::Local))
    }

    /// Load a symbol, parent first
    pub fn load(&self, name: &str) -> Result<Arc<Symbol>> {
        let name = symbol_name(name);
        if let Some(existing) = self.symbols.get(&name) {
            return Ok(existing.clone());
        }

        match self.parent.load(&name) {
            Ok(candidate) => Ok(self.resolver.prefer_local(&name, candidate, self)),
            Err(e) if e.is_not_found() => {
                debug!("{}: {} not found in parent, trying local origins", self.name, name);
                self.load_local(&name)
                    .ok_or_else(|| LoaderError::not_found(name))
            }
            Err(e) => Err(e),
        }
    }

    /// Location of a resource, parent first. Reserved names are never found.
    pub fn resource(&self, resource: &str) -> Option<ResourceLocation> {
        self.resolver.filter_resource(resource, |resource| {
            self.parent
                .resource(resource)
                .or_else(|| self.registry.find(resource))
        })
    }

    /// Every location of a resource, parent copies first. Reserved names
    /// are never found.
    pub fn resources(&self, resource: &str) -> Vec<ResourceLocation> {
        self.resolver.filter_resources(resource, |resource| {
            let mut found = self.parent.resources(resource);
            found.extend(self.registry.find_all(resource));
            found
        })
    }
}

impl LocalLookup for ModuleLoader {
    fn has_local_resource(&self, resource: &str) -> bool {
        self.registry.find(resource).is_some()
    }

    fn load_local(&self, name: &str) -> Option<Arc<Symbol>> {
        if let Some(existing) = self.symbols.get(name) {
            return Some(existing.clone());
        }

        let resource = resource_name(name, &self.resource_suffix);
        let (origin, found) = match self.registry.resolve(&resource) {
            Ok(found) => found?,
            Err(e) => {
                debug!("{}: reading {} failed: {}", self.name, resource, e);
                return None;
            }
        };

        let descriptor = self.parent.metadata().descriptor_for(origin.location());
        let symbol = Symbol::new(name, found.bytes, DefinedBy::Module(self.name.clone()))
            .with_code_source(origin.location())
            .with_descriptor(descriptor);
        Some(
            self.symbols
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(symbol))
                .clone(),
        )
    }
}
